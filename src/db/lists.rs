//! Whitelist and blocklist queries.
//!
//! Queries only; the decision of what to do with their results (suppress
//! enforcement, invoke the effector) is pure logic in `core::host`, kept
//! separate so it is unit-testable without a database.

use crate::db::Database;
use crate::error::Result;

/// `true` iff `domain` (already normalized) appears in an active whitelist.
pub async fn is_whitelisted(db: &Database, domain: &str) -> Result<bool> {
    let row = sqlx::query(
        "SELECT 1 FROM whitelist_domains wd \
         JOIN whitelists wl ON wl.id = wd.whitelist_id \
         WHERE wl.active = 'active' AND wd.domain = ? LIMIT 1",
    )
    .bind(domain)
    .fetch_optional(db.pool())
    .await?;
    Ok(row.is_some())
}

/// One matching blocklist entry for a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlocklistMatch {
    pub blocklist_id: i64,
    pub blocklist_domain_id: i64,
}

/// All active blocklists whose domain list contains the exact normalized
/// `domain`. Empty if none match. No suffix/subdomain matching.
pub async fn matching_blocklists(db: &Database, domain: &str) -> Result<Vec<BlocklistMatch>> {
    let rows = sqlx::query_as::<_, (i64, i64)>(
        "SELECT bd.blocklist_id, bd.id FROM blocklist_domains bd \
         JOIN blocklists bl ON bl.id = bd.blocklist_id \
         WHERE bl.active = 'active' AND bd.domain = ?",
    )
    .bind(domain)
    .fetch_all(db.pool())
    .await?;

    Ok(rows
        .into_iter()
        .map(|(blocklist_id, blocklist_domain_id)| BlocklistMatch {
            blocklist_id,
            blocklist_domain_id,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocklist_match_equality() {
        let a = BlocklistMatch {
            blocklist_id: 1,
            blocklist_domain_id: 2,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
