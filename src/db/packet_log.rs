//! PacketLog writes: intern every referenced string, insert one row, and
//! bump the `domain_ip_addresses` allowed-count pivot.
//!
//! Everything happens in one transaction; on a "server has gone away"-class
//! error the caller reconnects and retries once (`db::with_retry`).

use sqlx::Row;

use crate::db::Database;
use crate::error::Result;

/// Fixed set of recognized request methods. Anything else collapses to `N/A`.
const KNOWN_METHODS: &[&str] = &[
    "GET",
    "POST",
    "PUT",
    "DELETE",
    "HEAD",
    "OPTIONS",
    "PATCH",
    "CONNECT",
    "TRACE",
    "PROPFIND",
    "PROPPATCH",
    "MKCOL",
    "COPY",
    "MOVE",
    "LOCK",
    "UNLOCK",
    "N/A",
    "TLS_CLIENTHELLO",
    "QUIC",
];

/// Validates `method` against the closed verb set; anything unrecognized
/// becomes `"N/A"`.
pub fn validate_method(method: &str) -> &'static str {
    KNOWN_METHODS
        .iter()
        .find(|&&m| m == method)
        .copied()
        .unwrap_or("N/A")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    Http,
    Https,
}

impl LogType {
    fn as_str(&self) -> &'static str {
        match self {
            LogType::Http => "HTTP",
            LogType::Https => "HTTPS",
        }
    }
}

/// Everything needed to write one PacketLog row. String fields are raw
/// (not yet interned); `None`/empty means the column stays NULL.
#[derive(Debug, Clone, Default)]
pub struct PacketLogEntry {
    pub src_ip: String,
    pub src_port: Option<u16>,
    pub dst_ip: String,
    pub dst_port: Option<u16>,
    pub src_mac: Option<String>,
    pub dst_mac: Option<String>,
    pub method: String,
    pub domain: Option<String>,
    pub path: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub log_type: Option<LogType>,
}

/// Interns every referenced string and writes one PacketLog row, bumping the
/// domain/IP pivot's `allowed_count` when both a domain and destination IP
/// were resolved.
pub async fn insert(db: &Database, entry: &PacketLogEntry) -> Result<i64> {
    let pool = db.pool();
    let mut tx = pool.begin().await?;

    let src_ip_id = intern_in_tx(&mut tx, "ip_addresses", "ip_address", &entry.src_ip).await?;
    let dst_ip_id = intern_in_tx(&mut tx, "ip_addresses", "ip_address", &entry.dst_ip).await?;
    let src_mac_id = intern_opt_in_tx(&mut tx, "mac_addresses", "mac_address", &entry.src_mac).await?;
    let dst_mac_id = intern_opt_in_tx(&mut tx, "mac_addresses", "mac_address", &entry.dst_mac).await?;
    let path_id = intern_opt_in_tx(&mut tx, "paths", "path", &entry.path).await?;
    let user_agent_id = intern_opt_in_tx(&mut tx, "user_agents", "user_agent", &entry.user_agent).await?;
    let accept_language_id =
        intern_opt_in_tx(&mut tx, "accept_languages", "accept_language", &entry.accept_language).await?;

    let domain_id = match &entry.domain {
        Some(d) if !d.is_empty() => Some(intern_domain_with_ip(&mut tx, d, dst_ip_id).await?),
        _ => None,
    };

    let method = validate_method(&entry.method);
    let log_type = entry.log_type.map(|t| t.as_str());

    let result = sqlx::query(
        "INSERT INTO packet_logs \
         (packet_timestamp, src_ip_id, src_port, dst_ip_id, dst_port, src_mac_id, dst_mac_id, \
          method, domain_id, path_id, user_agent_id, accept_language_id, type) \
         VALUES (NOW(), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(src_ip_id)
    .bind(entry.src_port)
    .bind(dst_ip_id)
    .bind(entry.dst_port)
    .bind(src_mac_id)
    .bind(dst_mac_id)
    .bind(method)
    .bind(domain_id)
    .bind(path_id)
    .bind(user_agent_id)
    .bind(accept_language_id)
    .bind(log_type)
    .execute(&mut *tx)
    .await?;

    if let (Some(domain_id), Some(dst_ip_id)) = (domain_id, dst_ip_id) {
        sqlx::query(
            "UPDATE domain_ip_addresses SET allowed_count = allowed_count + 1, last_seen = NOW() \
             WHERE domain_id = ? AND ip_address_id = ?",
        )
        .bind(domain_id)
        .bind(dst_ip_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(result.last_insert_id() as i64)
}

async fn intern_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    table: &str,
    column: &str,
    value: &str,
) -> Result<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    let sql = format!(
        "INSERT INTO {table} ({column}) VALUES (?) ON DUPLICATE KEY UPDATE id=LAST_INSERT_ID(id)"
    );
    let result = sqlx::query(&sql).bind(value).execute(&mut **tx).await?;
    Ok(Some(result.last_insert_id() as i64))
}

async fn intern_opt_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    table: &str,
    column: &str,
    value: &Option<String>,
) -> Result<Option<i64>> {
    match value {
        Some(v) => intern_in_tx(tx, table, column, v).await,
        None => Ok(None),
    }
}

/// Fetches or inserts the domain, then ensures the (domain_id, ip_id) pivot
/// row exists when `ip_id` is set.
async fn intern_domain_with_ip(
    tx: &mut sqlx::Transaction<'_, sqlx::MySql>,
    domain: &str,
    ip_id: Option<i64>,
) -> Result<i64> {
    let domain_id = intern_in_tx(tx, "domains", "domain", domain)
        .await?
        .expect("non-empty domain always interns to Some");

    if let Some(ip_id) = ip_id {
        sqlx::query(
            "INSERT INTO domain_ip_addresses (domain_id, ip_address_id, allowed_count, blocked_count, last_seen) \
             VALUES (?, ?, 0, 0, NOW()) \
             ON DUPLICATE KEY UPDATE domain_id = domain_id",
        )
        .bind(domain_id)
        .bind(ip_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(domain_id)
}

/// Fetches the row count for a table; used by tests and the purger's
/// table-size diagnostics.
pub async fn row_count(db: &Database, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) AS c FROM {table}");
    let row = sqlx::query(&sql).fetch_one(db.pool()).await?;
    Ok(row.try_get::<i64, _>("c")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_method_known() {
        assert_eq!(validate_method("GET"), "GET");
        assert_eq!(validate_method("TLS_CLIENTHELLO"), "TLS_CLIENTHELLO");
        assert_eq!(validate_method("QUIC"), "QUIC");
    }

    #[test]
    fn test_validate_method_unknown_becomes_na() {
        assert_eq!(validate_method("FROB"), "N/A");
        assert_eq!(validate_method(""), "N/A");
        assert_eq!(validate_method("get"), "N/A");
    }

    #[test]
    fn test_log_type_strings() {
        assert_eq!(LogType::Http.as_str(), "HTTP");
        assert_eq!(LogType::Https.as_str(), "HTTPS");
    }
}
