//! Ties the host normalizer/matcher, the PacketLog writer, and the firewall
//! effector together: the per-frame pipeline that `capture` feeds into.

use crate::core::firewall;
use crate::core::host::{decide, normalize_hostname, Decision};
use crate::db::lists::{is_whitelisted, matching_blocklists};
use crate::db::packet_log::{insert as insert_packet_log, LogType, PacketLogEntry};
use crate::db::Database;
use crate::error::Result;

/// A decoded event ready to be logged and (if blocked) enforced.
#[derive(Debug, Clone)]
pub struct ObservedHost {
    pub hostname: String,
    pub src_ip: String,
    pub src_port: Option<u16>,
    pub dst_ip: String,
    pub dst_port: Option<u16>,
    pub src_mac: Option<String>,
    pub dst_mac: Option<String>,
    pub method: String,
    pub path: Option<String>,
    pub user_agent: Option<String>,
    pub accept_language: Option<String>,
    pub log_type: LogType,
}

/// Normalizes the hostname, checks whitelist/blocklist, writes the
/// PacketLog row (logging always happens, even when blocked), and — for a
/// block decision — fires the effector for each matching blocklist.
pub async fn process_observed_host(
    db: &Database,
    firewall_helper_path: &str,
    observed: ObservedHost,
) -> Result<Decision> {
    let normalized = normalize_hostname(&observed.hostname);

    let whitelisted = is_whitelisted(db, &normalized).await?;
    let matches = matching_blocklists(db, &normalized).await?;
    let decision = decide(whitelisted, matches);

    let entry = PacketLogEntry {
        src_ip: observed.src_ip.clone(),
        src_port: observed.src_port,
        dst_ip: observed.dst_ip.clone(),
        dst_port: observed.dst_port,
        src_mac: observed.src_mac,
        dst_mac: observed.dst_mac,
        method: observed.method,
        domain: Some(normalized),
        path: observed.path,
        user_agent: observed.user_agent,
        accept_language: observed.accept_language,
        log_type: Some(observed.log_type),
    };
    insert_packet_log(db, &entry).await?;

    if let Decision::Block(ref matches) = decision {
        for m in matches {
            firewall::apply_block(firewall_helper_path, m.blocklist_id, &observed.dst_ip).await;
        }
    }

    Ok(decision)
}
