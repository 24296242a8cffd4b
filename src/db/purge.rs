//! Disk-pressure purger queries: day-by-day deletion and the orphan sweep.
//!
//! The day-by-day loop and the disk-usage decision live in `core::purge`;
//! this module is just the SQL.

use chrono::NaiveDate;

use crate::db::Database;
use crate::error::Result;

/// Deletes `packet_logs` and `blocked_events` rows whose date equals `day`.
/// Returns the number of rows deleted from each table. In dry-run mode,
/// counts without deleting.
pub async fn purge_day(db: &Database, day: NaiveDate, dry_run: bool) -> Result<(u64, u64)> {
    let start = day.and_hms_opt(0, 0, 0).expect("midnight is always valid");
    let end = (day + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid");

    if dry_run {
        let packet_logs = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM packet_logs WHERE packet_timestamp >= ? AND packet_timestamp < ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(db.pool())
        .await?;

        let blocked_events = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM blocked_events WHERE event_time >= ? AND event_time < ?",
        )
        .bind(start)
        .bind(end)
        .fetch_one(db.pool())
        .await?;

        return Ok((packet_logs.0 as u64, blocked_events.0 as u64));
    }

    let mut tx = db.pool().begin().await?;

    let packet_logs = sqlx::query(
        "DELETE FROM packet_logs WHERE packet_timestamp >= ? AND packet_timestamp < ?",
    )
    .bind(start)
    .bind(end)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let blocked_events = sqlx::query(
        "DELETE FROM blocked_events WHERE event_time >= ? AND event_time < ?",
    )
    .bind(start)
    .bind(end)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;
    Ok((packet_logs, blocked_events))
}

/// Deletes `ip_addresses` rows referenced by neither `packet_logs` nor
/// `blocked_events`. Returns the number of rows deleted. In dry-run mode,
/// counts without deleting.
pub async fn sweep_orphaned_ips(db: &Database, dry_run: bool) -> Result<u64> {
    if dry_run {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM ip_addresses ia \
             WHERE NOT EXISTS (SELECT 1 FROM packet_logs pl WHERE pl.src_ip_id = ia.id OR pl.dst_ip_id = ia.id) \
             AND NOT EXISTS (SELECT 1 FROM blocked_events be WHERE be.src_ip_id = ia.id OR be.dst_ip_id = ia.id OR be.wan_ip_id = ia.id)",
        )
        .fetch_one(db.pool())
        .await?;
        return Ok(row.0 as u64);
    }

    let result = sqlx::query(
        "DELETE ia FROM ip_addresses ia \
         WHERE NOT EXISTS (SELECT 1 FROM packet_logs pl WHERE pl.src_ip_id = ia.id OR pl.dst_ip_id = ia.id) \
         AND NOT EXISTS (SELECT 1 FROM blocked_events be WHERE be.src_ip_id = ia.id OR be.dst_ip_id = ia.id OR be.wan_ip_id = ia.id)",
    )
    .execute(db.pool())
    .await?;

    Ok(result.rows_affected())
}

/// Tables eligible for `OPTIMIZE TABLE` after a purge run. Fixed, known set
/// so the SQL is never built from caller-supplied input.
const OPTIMIZABLE_TABLES: &[&str] = &[
    "packet_logs",
    "blocked_events",
    "blocked_event_messages",
    "ip_addresses",
    "domains",
    "domain_ip_addresses",
];

/// Runs `OPTIMIZE TABLE` on each table that accumulates rows over time,
/// reclaiming space after a purge. No-op in dry-run mode.
pub async fn optimize_tables(db: &Database, dry_run: bool) -> Result<Vec<String>> {
    if dry_run {
        return Ok(OPTIMIZABLE_TABLES.iter().map(|t| t.to_string()).collect());
    }

    let mut optimized = Vec::new();
    for table in OPTIMIZABLE_TABLES {
        sqlx::query(&format!("OPTIMIZE TABLE {table}"))
            .execute(db.pool())
            .await?;
        optimized.push(table.to_string());
    }
    Ok(optimized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizable_tables_nonempty() {
        assert!(!OPTIMIZABLE_TABLES.is_empty());
    }

    #[test]
    fn test_day_bounds_span_24_hours() {
        let day = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let start = day.and_hms_opt(0, 0, 0).unwrap();
        let end = (day + chrono::Duration::days(1)).and_hms_opt(0, 0, 0).unwrap();
        assert_eq!((end - start).num_hours(), 24);
    }
}
