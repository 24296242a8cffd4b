//! Unified error type for the ZopLog pipelines.
//!
//! `ZopError` is the error type threaded through the capture, decision, and
//! ingestion paths. Each variant maps to one of the failure domains from the
//! error handling design: parse errors, transient/permanent database errors,
//! firewall effector errors, configuration errors, and capture errors. The
//! outer loop of each binary matches on `kind()`/`retriable()` to decide
//! whether to discard, reconnect-and-retry once, log and continue, or fall
//! back to documented defaults.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZopError {
    /// Malformed TLS/HTTP/DNS/log-line input. Always non-fatal: discard the
    /// unit of work and continue.
    #[error("parse error: {0}")]
    Parse(String),

    /// Database errors. `retriable()` distinguishes the "server has gone
    /// away"/"lost connection" class, which warrants one reconnect-and-retry,
    /// from permanent errors (bad SQL, constraint violation).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Firewall helper invocation failed or timed out.
    #[error("firewall effector error: {0}")]
    Effector(String),

    /// Missing or unreadable configuration; caller should fall back to
    /// documented defaults rather than propagate this.
    #[error("configuration error: {0}")]
    Config(String),

    /// Packet capture engine failure (device open, filter compile, …).
    #[error("capture error: {0}")]
    Capture(String),

    /// I/O error not covered by a more specific variant.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZopError {
    /// True for database errors the caller should reconnect-and-retry once
    /// before giving up.
    pub fn retriable(&self) -> bool {
        match self {
            ZopError::Database(sqlx::Error::Io(_)) => true,
            ZopError::Database(sqlx::Error::PoolClosed) => true,
            ZopError::Database(sqlx::Error::PoolTimedOut) => true,
            ZopError::Database(e) => {
                let msg = e.to_string();
                msg.contains("gone away") || msg.contains("Lost connection")
            }
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ZopError::Parse(_) => "Parse",
            ZopError::Database(_) => "Database",
            ZopError::Effector(_) => "Effector",
            ZopError::Config(_) => "Config",
            ZopError::Capture(_) => "Capture",
            ZopError::Io(_) => "Io",
        }
    }
}

pub type Result<T> = std::result::Result<T, ZopError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_variants() {
        assert_eq!(ZopError::Parse("x".into()).kind(), "Parse");
        assert_eq!(ZopError::Effector("x".into()).kind(), "Effector");
        assert_eq!(ZopError::Config("x".into()).kind(), "Config");
        assert_eq!(ZopError::Capture("x".into()).kind(), "Capture");
    }

    #[test]
    fn test_non_database_errors_are_not_retriable() {
        assert!(!ZopError::Parse("x".into()).retriable());
        assert!(!ZopError::Effector("x".into()).retriable());
        assert!(!ZopError::Config("x".into()).retriable());
    }
}
