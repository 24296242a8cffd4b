//! BlockedEvent persistence: insert + 1:1 message row, WAN-IP domain
//! attribution, and the rate-limited `blocked_count` bump.

use crate::config::{BLOCKED_MESSAGE_MAX_BYTES, INGESTOR_DEDUP_WINDOW_SECS};
use crate::db::Database;
use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct BlockedEventEntry {
    pub direction: &'static str,
    pub src_ip: String,
    pub dst_ip: String,
    pub wan_ip: String,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
    pub proto: Option<String>,
    pub iface_in: Option<String>,
    pub iface_out: Option<String>,
    pub message: String,
}

/// Domain attribution: the most-recently-seen `domain_id` for `wan_ip_id` in
/// `domain_ip_addresses`, or `None` if the IP has no observed domain yet.
pub async fn attribute_domain(db: &Database, wan_ip_id: i64) -> Result<Option<i64>> {
    let row = sqlx::query_as::<_, (i64,)>(
        "SELECT domain_id FROM domain_ip_addresses WHERE ip_address_id = ? \
         ORDER BY last_seen DESC LIMIT 1",
    )
    .bind(wan_ip_id)
    .fetch_optional(db.pool())
    .await?;
    Ok(row.map(|(id,)| id))
}

/// Inserts a BlockedEvent + BlockedEventMessage row (truncating the message
/// to `BLOCKED_MESSAGE_MAX_BYTES`), then rate-limit-bumps the
/// `domain_ip_addresses.blocked_count` pivot for (wan_ip_id, domain_id)
/// unless an identical src/dst pair was recorded within the dedup window.
pub async fn insert(
    db: &Database,
    entry: &BlockedEventEntry,
    src_ip_id: Option<i64>,
    dst_ip_id: Option<i64>,
    wan_ip_id: Option<i64>,
    domain_id: Option<i64>,
) -> Result<i64> {
    let mut tx = db.pool().begin().await?;

    let result = sqlx::query(
        "INSERT INTO blocked_events \
         (event_time, direction, src_ip_id, dst_ip_id, wan_ip_id, domain_id, src_port, dst_port, \
          proto, iface_in, iface_out) \
         VALUES (NOW(), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.direction)
    .bind(src_ip_id)
    .bind(dst_ip_id)
    .bind(wan_ip_id)
    .bind(domain_id)
    .bind(entry.src_port)
    .bind(entry.dst_port)
    .bind(&entry.proto)
    .bind(&entry.iface_in)
    .bind(&entry.iface_out)
    .execute(&mut *tx)
    .await?;

    let event_id = result.last_insert_id() as i64;
    let message = truncate_message(&entry.message);

    sqlx::query("INSERT INTO blocked_event_messages (event_id, message) VALUES (?, ?)")
        .bind(event_id)
        .bind(message)
        .execute(&mut *tx)
        .await?;

    if let (Some(wan_ip_id), Some(domain_id)) = (wan_ip_id, domain_id) {
        let recent = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM blocked_events \
             WHERE wan_ip_id = ? AND src_ip_id = ? AND dst_ip_id = ? \
             AND event_time >= NOW() - INTERVAL ? SECOND AND id < ?",
        )
        .bind(wan_ip_id)
        .bind(src_ip_id)
        .bind(dst_ip_id)
        .bind(INGESTOR_DEDUP_WINDOW_SECS)
        .bind(event_id)
        .fetch_one(&mut *tx)
        .await?;

        if recent.0 == 0 {
            sqlx::query(
                "UPDATE domain_ip_addresses SET blocked_count = blocked_count + 1, last_seen = NOW() \
                 WHERE domain_id = ? AND ip_address_id = ?",
            )
            .bind(domain_id)
            .bind(wan_ip_id)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(event_id)
}

/// Truncates `message` to at most `BLOCKED_MESSAGE_MAX_BYTES` bytes, never
/// splitting a UTF-8 code point.
fn truncate_message(message: &str) -> &str {
    if message.len() <= BLOCKED_MESSAGE_MAX_BYTES {
        return message;
    }
    let mut end = BLOCKED_MESSAGE_MAX_BYTES;
    while end > 0 && !message.is_char_boundary(end) {
        end -= 1;
    }
    &message[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_short_unchanged() {
        assert_eq!(truncate_message("hello"), "hello");
    }

    #[test]
    fn test_truncate_message_long_is_truncated() {
        let long = "a".repeat(BLOCKED_MESSAGE_MAX_BYTES + 100);
        let truncated = truncate_message(&long);
        assert_eq!(truncated.len(), BLOCKED_MESSAGE_MAX_BYTES);
    }

    #[test]
    fn test_truncate_message_respects_char_boundary() {
        // Each 'é' is 2 bytes; force the cut to land mid-character and verify
        // we back off to the previous boundary instead of panicking/slicing.
        let s: String = std::iter::repeat('é').take(BLOCKED_MESSAGE_MAX_BYTES).collect();
        let truncated = truncate_message(&s);
        assert!(truncated.len() <= BLOCKED_MESSAGE_MAX_BYTES);
        assert!(truncated.is_char_boundary(truncated.len()));
    }
}
