//! MySQL/MariaDB persistence layer.
//!
//! Holds the connection pool and the generic identity-interning helper that
//! every lookup table (`ip_addresses`, `mac_addresses`, `domains`, `paths`,
//! `user_agents`, `accept_languages`) shares, using MySQL's `ON DUPLICATE KEY
//! UPDATE id=LAST_INSERT_ID(id)` trick to return the existing row's id
//! without a separate SELECT.

pub mod blocked_event;
pub mod lists;
pub mod packet_log;
pub mod purge;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;

use crate::error::{Result, ZopError};

/// Thin wrapper around the pool so call sites read `db.get_or_insert(...)`
/// rather than threading a bare `MySqlPool` everywhere.
#[derive(Clone)]
pub struct Database {
    pool: MySqlPool,
}

impl Database {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await?;
        Ok(Database { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    /// Reconnect, replacing the pool in place. Used by the
    /// reconnect-once-on-transient-error policy below.
    pub async fn reconnect(&mut self, url: &str) -> Result<()> {
        let pool = MySqlPoolOptions::new()
            .max_connections(8)
            .connect(url)
            .await?;
        self.pool = pool;
        Ok(())
    }

    /// `INSERT INTO {table} ({column}) VALUES (?) ON DUPLICATE KEY UPDATE
    /// id=LAST_INSERT_ID(id)`, returning the inserted or pre-existing id.
    /// Returns `Ok(None)` for empty input without touching the database.
    pub async fn get_or_insert(&self, table: &str, column: &str, value: &str) -> Result<Option<i64>> {
        if value.is_empty() {
            return Ok(None);
        }
        if !is_safe_identifier(table) || !is_safe_identifier(column) {
            return Err(ZopError::Config(format!(
                "refusing to intern into unrecognized table/column: {table}.{column}"
            )));
        }
        let sql = format!(
            "INSERT INTO {table} ({column}) VALUES (?) ON DUPLICATE KEY UPDATE id=LAST_INSERT_ID(id)"
        );
        let result = sqlx::query(&sql).bind(value).execute(&self.pool).await?;
        Ok(Some(result.last_insert_id() as i64))
    }

}

/// Runs `op` against `db` once; on a retriable (transient) database error
/// such as "server has gone away", reconnects and runs it exactly once more.
/// Further failures surface as error logs at the caller.
pub async fn with_retry<T, F, Fut>(db: &mut Database, url: &str, mut op: F) -> Result<T>
where
    F: FnMut(Database) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match op(db.clone()).await {
        Ok(v) => Ok(v),
        Err(e) if e.retriable() => {
            tracing::warn!("transient database error, reconnecting once: {e}");
            db.reconnect(url).await?;
            op(db.clone()).await
        }
        Err(e) => Err(e),
    }
}

/// Lookup tables are a fixed, known set; this guards the `format!`-built SQL
/// in `get_or_insert` against ever being fed an unexpected identifier.
fn is_safe_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && s.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false)
}

/// `NOW()`-equivalent timestamp for callers building SQL with a bound
/// parameter rather than relying on the server's clock.
pub fn chrono_timestamp() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_safe_identifier() {
        assert!(is_safe_identifier("ip_addresses"));
        assert!(is_safe_identifier("domain"));
        assert!(!is_safe_identifier("ip_addresses; DROP TABLE x"));
        assert!(!is_safe_identifier(""));
        assert!(!is_safe_identifier("1ip"));
    }

    #[test]
    fn test_chrono_timestamp_is_recent() {
        let ts = chrono_timestamp();
        let now = chrono::Utc::now().naive_utc();
        assert!((now - ts).num_seconds() < 5);
    }
}
