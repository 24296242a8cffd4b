//! Disk-pressure purge orchestration: probes disk usage, then deletes one
//! calendar day at a time until usage falls below target or the 365-day cap
//! is reached. Logs the actual computed used-percentage at each step.

use chrono::{NaiveDate, Utc};

use crate::config::{PURGE_MAX_DAYS, PURGE_TARGET_FREE_PERCENT, PURGE_TRIGGER_USED_PERCENT};
use crate::db::{purge as purge_db, Database};
use crate::error::Result;

/// Disk usage of a filesystem, analogous to `os.statvfs` in the Python
/// original.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    pub used_percent: f64,
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// Abstracts the filesystem probe so the purge loop is testable without a
/// real disk.
pub trait DiskUsageProbe {
    fn probe(&self, path: &str) -> Result<DiskUsage>;
}

/// Production probe backed by `statvfs(2)` via raw `libc` bindings. Only
/// implemented for unix targets; exercised with `FixedUsageProbe` in tests.
pub struct StatvfsProbe;

impl DiskUsageProbe for StatvfsProbe {
    #[cfg(unix)]
    fn probe(&self, path: &str) -> Result<DiskUsage> {
        use std::ffi::CString;
        use std::mem::MaybeUninit;

        let c_path = CString::new(path)
            .map_err(|e| crate::error::ZopError::Config(format!("invalid path {path}: {e}")))?;

        // SAFETY: `c_path` is a valid NUL-terminated string for the duration
        // of the call, and `stat` is a single-write out-param fully
        // initialized by a successful call.
        let stat = unsafe {
            let mut stat = MaybeUninit::<libc::statvfs>::zeroed();
            let rc = libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr());
            if rc != 0 {
                return Err(crate::error::ZopError::Io(std::io::Error::last_os_error()));
            }
            stat.assume_init()
        };

        let block_size = stat.f_frsize as u64;
        let total_bytes = block_size * stat.f_blocks as u64;
        let free_bytes = block_size * stat.f_bavail as u64;
        let used_percent = if total_bytes == 0 {
            0.0
        } else {
            100.0 * (total_bytes - free_bytes) as f64 / total_bytes as f64
        };

        Ok(DiskUsage {
            used_percent,
            free_bytes,
            total_bytes,
        })
    }

    #[cfg(not(unix))]
    fn probe(&self, _path: &str) -> Result<DiskUsage> {
        Err(crate::error::ZopError::Config(
            "disk usage probing is only implemented for unix targets".to_string(),
        ))
    }
}

/// Fixed-answer probe for tests.
#[cfg(test)]
pub struct FixedUsageProbe(pub DiskUsage);

#[cfg(test)]
impl DiskUsageProbe for FixedUsageProbe {
    fn probe(&self, _path: &str) -> Result<DiskUsage> {
        Ok(self.0)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PurgeOutcome {
    pub days_deleted: u32,
    pub packet_logs_deleted: u64,
    pub blocked_events_deleted: u64,
    pub triggered: bool,
}

/// Runs the purge loop against `data_dir`. `force` bypasses the
/// `PURGE_TRIGGER_USED_PERCENT` gate (used by `--force-disk-cleanup`).
pub async fn run_purge<P: DiskUsageProbe>(
    db: &Database,
    probe: &P,
    data_dir: &str,
    target_free_percent: f64,
    force: bool,
    dry_run: bool,
) -> Result<PurgeOutcome> {
    let usage = probe.probe(data_dir)?;
    tracing::info!("disk usage at {data_dir}: {:.1}% used", usage.used_percent);

    if !force && usage.used_percent < PURGE_TRIGGER_USED_PERCENT {
        return Ok(PurgeOutcome {
            days_deleted: 0,
            packet_logs_deleted: 0,
            blocked_events_deleted: 0,
            triggered: false,
        });
    }

    let target_used_percent = 100.0 - target_free_percent;
    let mut days_deleted = 0u32;
    let mut packet_logs_deleted = 0u64;
    let mut blocked_events_deleted = 0u64;
    let mut current = usage.used_percent;
    let today = Utc::now().date_naive();

    while current >= target_used_percent && days_deleted < PURGE_MAX_DAYS {
        let day = oldest_retained_day(today, days_deleted) - chrono::Duration::days(1);
        let (pl, be) = purge_db::purge_day(db, day, dry_run).await?;
        packet_logs_deleted += pl;
        blocked_events_deleted += be;
        days_deleted += 1;

        let refreshed = probe.probe(data_dir)?;
        current = refreshed.used_percent;
        tracing::debug!(
            "purged day {day}: {pl} packet_logs, {be} blocked_events; usage now {:.1}%",
            current
        );
    }

    Ok(PurgeOutcome {
        days_deleted,
        packet_logs_deleted,
        blocked_events_deleted,
        triggered: true,
    })
}

/// Default data-dir-probe target used when no override is given.
pub fn default_target_free_percent() -> f64 {
    PURGE_TARGET_FREE_PERCENT
}

/// The oldest calendar day still retained after `days_deleted` days have
/// been purged back from `today`.
fn oldest_retained_day(today: NaiveDate, days_deleted: u32) -> NaiveDate {
    today - chrono::Duration::days(days_deleted as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(used_percent: f64) -> DiskUsage {
        DiskUsage {
            used_percent,
            free_bytes: 0,
            total_bytes: 100,
        }
    }

    #[test]
    fn test_default_target_free_percent() {
        assert_eq!(default_target_free_percent(), PURGE_TARGET_FREE_PERCENT);
    }

    #[test]
    fn test_oldest_retained_day_counts_back() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        assert_eq!(
            oldest_retained_day(today, 3),
            NaiveDate::from_ymd_opt(2026, 7, 25).unwrap()
        );
    }

    #[test]
    fn test_probe_reads_back_fixed_usage() {
        let probe = FixedUsageProbe(usage(96.0));
        let read = probe.probe("/var/lib/mysql").unwrap();
        assert_eq!(read.used_percent, 96.0);
    }
}
