//! Hostname normalization and whitelist/blocklist decision logic, kept as
//! pure functions over plain inputs so they're unit-testable without a
//! database connection.

use crate::db::lists::BlocklistMatch;

/// Trim, strip everything from the first colon (drops a port suffix),
/// lowercase, strip a trailing dot. Idempotent: normalizing twice yields the
/// same result as normalizing once.
pub fn normalize_hostname(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_port = match trimmed.find(':') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    let lowered = without_port.to_ascii_lowercase();
    lowered.strip_suffix('.').unwrap_or(&lowered).to_string()
}

/// True iff `domain` is lowercased, contains at least one dot, is ≤253
/// bytes, and carries no port suffix or trailing dot. Already-normalized
/// input is assumed; this only checks the shape.
pub fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty()
        && domain.len() <= 253
        && domain.contains('.')
        && !domain.ends_with('.')
        && domain.chars().all(|c| !c.is_ascii_uppercase())
}

/// What to do with a normalized host, given whitelist/blocklist query
/// results. Whitelist unconditionally suppresses enforcement, but logging
/// (the PacketLog write) still happens regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// No blocklist matched (or the host was whitelisted): log only.
    Allow,
    /// At least one active blocklist matched and the host was not
    /// whitelisted: log, and invoke the effector for each match.
    Block(Vec<BlocklistMatch>),
}

/// Pure decision function: given whether `domain` is whitelisted and which
/// blocklists matched, decide what enforcement (if any) to take.
pub fn decide(is_whitelisted: bool, matches: Vec<BlocklistMatch>) -> Decision {
    if is_whitelisted || matches.is_empty() {
        Decision::Allow
    } else {
        Decision::Block(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_port() {
        assert_eq!(normalize_hostname("Example.com:443"), "example.com");
    }

    #[test]
    fn test_normalize_strips_trailing_dot() {
        assert_eq!(normalize_hostname("example.com."), "example.com");
    }

    #[test]
    fn test_normalize_trims_whitespace() {
        assert_eq!(normalize_hostname("  example.com  "), "example.com");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_hostname("  Example.COM.:8443 ");
        let twice = normalize_hostname(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_is_valid_domain() {
        assert!(is_valid_domain("example.com"));
        assert!(!is_valid_domain("example"));
        assert!(!is_valid_domain("example.com."));
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain(&"a.".repeat(200)));
    }

    #[test]
    fn test_decide_whitelist_overrides_blocklist_match() {
        let matches = vec![BlocklistMatch {
            blocklist_id: 1,
            blocklist_domain_id: 2,
        }];
        assert_eq!(decide(true, matches), Decision::Allow);
    }

    #[test]
    fn test_decide_no_match_allows() {
        assert_eq!(decide(false, vec![]), Decision::Allow);
    }

    #[test]
    fn test_decide_match_blocks() {
        let matches = vec![BlocklistMatch {
            blocklist_id: 1,
            blocklist_domain_id: 2,
        }];
        assert_eq!(decide(false, matches.clone()), Decision::Block(matches));
    }
}
