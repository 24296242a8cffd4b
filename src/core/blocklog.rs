//! Blocked-event ingestor: tails the kernel log stream for
//! `ZOPLOG-BLOCKLIST-*` entries, parses them, attributes a WAN IP and
//! domain, and writes a BlockedEvent.
//!
//! The journal itself is behind `trait JournalSource` so the parsing and
//! attribution logic here is testable without a live journal.

use std::collections::HashMap;

use crate::config::INGESTOR_MAX_ENTRIES_PER_WAKEUP;
use crate::db::blocked_event::{attribute_domain, insert as insert_blocked_event, BlockedEventEntry};
use crate::db::Database;
use crate::error::Result;

const BASE_PREFIX: &str = "ZOPLOG-BLOCKLIST-";

/// The bare direction components a glued prefix is built from (e.g.
/// `OUTIN` = `OUT` + `IN`). Checked in this order since none is a prefix of
/// another (`F`/`O`/`I` are distinct leading letters).
const BARE_COMPONENTS: &[&str] = &["FWD", "OUT", "IN"];

const PREFIXES: &[(&str, &str)] = &[
    ("ZOPLOG-BLOCKLIST-ININ", "IN"),
    ("ZOPLOG-BLOCKLIST-INOUT", "IN"),
    ("ZOPLOG-BLOCKLIST-OUTIN", "IN"),
    ("ZOPLOG-BLOCKLIST-OUTOUT", "OUT"),
    ("ZOPLOG-BLOCKLIST-FWDIN", "FWD"),
    ("ZOPLOG-BLOCKLIST-FWDOUT", "FWD"),
    // Bare prefixes must be checked after the glued variants above, since
    // e.g. "ZOPLOG-BLOCKLIST-IN" is itself a prefix of "ZOPLOG-BLOCKLIST-ININ".
    ("ZOPLOG-BLOCKLIST-IN", "IN"),
    ("ZOPLOG-BLOCKLIST-OUT", "OUT"),
    ("ZOPLOG-BLOCKLIST-FWD", "FWD"),
];

/// Abstracts the kernel log source so `ingest_once`/the parsing logic can be
/// tested without a live systemd journal. Implemented in production by a
/// `systemd::journal::Journal`-backed reader (see `bin/zoplog_blocklogd.rs`),
/// and in tests by `VecJournalSource`.
pub trait JournalSource {
    /// Blocks until at least one new record is available (or the source is
    /// closed), then returns every record accumulated since the last call.
    fn wait_for_records(&mut self) -> Vec<String>;
}

/// Test double: yields one batch of canned lines per call, then empty.
pub struct VecJournalSource {
    batches: std::collections::VecDeque<Vec<String>>,
}

impl VecJournalSource {
    pub fn new(batches: Vec<Vec<String>>) -> Self {
        VecJournalSource {
            batches: batches.into(),
        }
    }
}

impl JournalSource for VecJournalSource {
    fn wait_for_records(&mut self) -> Vec<String> {
        self.batches.pop_front().unwrap_or_default()
    }
}

/// Finds the longest matching prefix token in `line` and returns its
/// direction, preferring glued variants (`ININ`, `OUTIN`, …) over the bare
/// prefix they themselves start with.
fn find_prefix(line: &str) -> Option<(&'static str, &'static str)> {
    PREFIXES.iter().find(|(p, _)| line.contains(p)).copied()
}

/// Inserts a space right after the *bare* direction component a glued
/// prefix begins with (e.g. `...-OUTIN=` -> `...-OUT IN=`, splitting after
/// `OUT` rather than after the whole matched `OUTIN` token), so the
/// following glued component re-tokenizes as its own `KEY=VALUE` field
/// instead of corrupting it into an empty key.
fn normalize_prefix_spacing(line: &str, prefix: &str) -> String {
    let Some(i) = line.find(prefix) else {
        return line.to_string();
    };

    let after_header = &prefix[BASE_PREFIX.len()..];
    let component_len = BARE_COMPONENTS
        .iter()
        .find(|c| after_header.starts_with(**c))
        .map(|c| c.len())
        .unwrap_or(after_header.len());
    let split_at = i + BASE_PREFIX.len() + component_len;

    if line.as_bytes().get(split_at).is_some_and(|&b| b != b' ') {
        let mut out = String::with_capacity(line.len() + 1);
        out.push_str(&line[..split_at]);
        out.push(' ');
        out.push_str(&line[split_at..]);
        out
    } else {
        line.to_string()
    }
}

/// `KEY=VALUE` pairs with an uppercase-token key and a whitespace-free value.
fn parse_kv(line: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for token in line.split_whitespace() {
        if let Some(eq) = token.find('=') {
            let (key, value) = (&token[..eq], &token[eq + 1..]);
            if !key.is_empty() && key.chars().all(|c| c.is_ascii_uppercase()) && !value.is_empty() {
                out.insert(key.to_string(), value.to_string());
            }
        }
    }
    out
}

/// A single parsed `ZOPLOG-BLOCKLIST-*` log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub direction: &'static str,
    pub fields: HashMap<String, String>,
}

/// Parses one kernel log message. Returns `None` if it doesn't contain a
/// recognized `ZOPLOG-BLOCKLIST-*` prefix.
pub fn parse_log_line(message: &str) -> Option<ParsedLine> {
    let (prefix, direction) = find_prefix(message)?;
    let normalized = normalize_prefix_spacing(message, prefix);
    let fields = parse_kv(&normalized);
    Some(ParsedLine { direction, fields })
}

/// Decides which side of a logged packet is the WAN IP: `true` means the
/// destination address is the remote (WAN) endpoint, `false` means the
/// source is.
pub fn wan_ip_is_dst(direction: &str, phys_iface_in: Option<&str>, monitoring_interface: &str) -> bool {
    match direction {
        "FWD" => match phys_iface_in {
            Some(iface) if iface != monitoring_interface => true,
            _ => false,
        },
        "IN" => false,
        "OUT" => true,
        _ => true,
    }
}

fn canonicalize_ip(raw: &str) -> String {
    match raw.parse::<std::net::IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Builds a `BlockedEventEntry` plus the raw src/dst IPs needed for
/// interning, from a parsed line and the configured monitoring interface.
pub fn build_entry(parsed: &ParsedLine, raw_message: &str, monitoring_interface: &str) -> (BlockedEventEntry, String, String) {
    let src_ip = parsed.fields.get("SRC").map(|s| canonicalize_ip(s)).unwrap_or_default();
    let dst_ip = parsed.fields.get("DST").map(|s| canonicalize_ip(s)).unwrap_or_default();
    let phys_in = parsed.fields.get("PHYSIN").or_else(|| parsed.fields.get("IN")).map(String::as_str);

    let wan_ip = if wan_ip_is_dst(parsed.direction, phys_in, monitoring_interface) {
        dst_ip.clone()
    } else {
        src_ip.clone()
    };

    let entry = BlockedEventEntry {
        direction: parsed.direction,
        src_ip: src_ip.clone(),
        dst_ip: dst_ip.clone(),
        wan_ip,
        src_port: parsed.fields.get("SPT").and_then(|s| s.parse().ok()),
        dst_port: parsed.fields.get("DPT").and_then(|s| s.parse().ok()),
        proto: parsed.fields.get("PROTO").cloned(),
        iface_in: parsed.fields.get("IN").cloned(),
        iface_out: parsed.fields.get("OUT").cloned(),
        message: raw_message.to_string(),
    };

    (entry, src_ip, dst_ip)
}

/// Processes up to `INGESTOR_MAX_ENTRIES_PER_WAKEUP` records from one wakeup
/// batch, logging any remainder as skipped — coarse backpressure against
/// bursts of blocked traffic.
pub async fn ingest_batch(db: &Database, monitoring_interface: &str, lines: Vec<String>) -> Result<usize> {
    let total = lines.len();
    let take = total.min(INGESTOR_MAX_ENTRIES_PER_WAKEUP);
    if total > take {
        tracing::warn!("blocklog ingestor: {} of {} records skipped this cycle", total - take, total);
    }

    let mut processed = 0;
    for line in lines.into_iter().take(take) {
        let Some(parsed) = parse_log_line(&line) else {
            continue;
        };
        let (entry, src_ip, dst_ip) = build_entry(&parsed, &line, monitoring_interface);

        let src_ip_id = db.get_or_insert("ip_addresses", "ip_address", &src_ip).await?;
        let dst_ip_id = db.get_or_insert("ip_addresses", "ip_address", &dst_ip).await?;
        let wan_ip_id = db.get_or_insert("ip_addresses", "ip_address", &entry.wan_ip).await?;

        let domain_id = match wan_ip_id {
            Some(id) => attribute_domain(db, id).await?,
            None => None,
        };

        insert_blocked_event(db, &entry, src_ip_id, dst_ip_id, wan_ip_id, domain_id).await?;
        processed += 1;
    }

    Ok(processed)
}
