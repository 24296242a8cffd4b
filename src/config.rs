//! Centralized runtime constants for ZopLog.
//!
//! All tunable intervals, thresholds, and counts are collected here so they
//! can be found and adjusted in a single place rather than scattered across
//! modules.

/// BPF filter applied to the capture device.
pub const CAPTURE_FILTER: &str = "tcp or udp port 53 or udp port 443";

/// Default monitored interface, used when no configured/available interface
/// can be resolved.
pub const DEFAULT_INTERFACE: &str = "eth0";

/// Preferred bridge interface name, tried before falling back to the first
/// non-loopback interface.
pub const PREFERRED_BRIDGE_INTERFACE: &str = "br-zoplog";

/// Maximum bytes retained per reassembly buffer entry (trailing window).
pub const REASSEMBLY_MAX_BYTES: usize = 8192;

/// Reassembly buffer entries older than this are evicted.
pub const REASSEMBLY_MAX_AGE_SECS: u64 = 3;

/// The reassembly sweep runs at most this often.
pub const REASSEMBLY_SWEEP_INTERVAL_SECS: u64 = 1;

/// TTL for DNS observation cache entries and the seen-QUIC-flow set.
pub const DNS_CACHE_TTL_SECS: u64 = 120;

/// The DNS cache sweep runs at most this often.
pub const DNS_CACHE_SWEEP_INTERVAL_SECS: u64 = 5;

/// Hard timeout for each firewall helper invocation (direct exec and the
/// `sudo -n` fallback each get their own budget of this size).
pub const EFFECTOR_TIMEOUT_SECS: u64 = 3;

/// Path to the firewall helper script, tried relative to `SCRIPTS_DIR` first.
pub const FIREWALL_HELPER_NAME: &str = "zoplog-firewall-ipset-add";

/// Fallback absolute path to the firewall helper if not found under the
/// configured scripts directory.
pub const FIREWALL_HELPER_FALLBACK: &str = "/opt/zoplog/zoplog/scripts/zoplog-firewall-ipset-add";

/// Maximum number of blocked-event log entries the ingestor processes per
/// wakeup, providing coarse backpressure against bursts.
pub const INGESTOR_MAX_ENTRIES_PER_WAKEUP: usize = 5;

/// Suppress a repeated blocked_count bump for the same (src, dst) pair
/// within this window.
pub const INGESTOR_DEDUP_WINDOW_SECS: i64 = 5;

/// Maximum bytes stored in a BlockedEventMessage row (truncated beyond this).
pub const BLOCKED_MESSAGE_MAX_BYTES: usize = 65535;

/// Default target free-space percentage for the disk-pressure purger.
pub const PURGE_TARGET_FREE_PERCENT: f64 = 8.0;

/// The purger only activates automatically once usage reaches this percent.
pub const PURGE_TRIGGER_USED_PERCENT: f64 = 95.0;

/// Purger never deletes more than this many calendar days in one run.
pub const PURGE_MAX_DAYS: u32 = 365;

/// Default path to the MySQL/MariaDB data directory, probed for disk usage.
pub const DEFAULT_DB_DATA_DIR: &str = "/var/lib/mysql";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassembly_bounds_positive() {
        assert!(REASSEMBLY_MAX_BYTES > 0);
        assert!(REASSEMBLY_MAX_AGE_SECS > 0);
        assert!(REASSEMBLY_SWEEP_INTERVAL_SECS > 0);
    }

    #[test]
    fn test_dns_cache_ttl_positive() {
        assert!(DNS_CACHE_TTL_SECS > 0);
        assert!(DNS_CACHE_SWEEP_INTERVAL_SECS > 0);
        assert!(DNS_CACHE_SWEEP_INTERVAL_SECS <= DNS_CACHE_TTL_SECS);
    }

    #[test]
    fn test_purge_targets_sane() {
        assert!(PURGE_TARGET_FREE_PERCENT > 0.0 && PURGE_TARGET_FREE_PERCENT < 100.0);
        assert!(PURGE_TRIGGER_USED_PERCENT > 0.0 && PURGE_TRIGGER_USED_PERCENT <= 100.0);
        assert!(PURGE_MAX_DAYS > 0);
    }
}
