//! DNS observation cache + seen-QUIC-flows set.
//!
//! Every DNS response with an A/AAAA answer produces an entry keyed by
//! (client-IP of the request, IP from the answer's rdata). QUIC attribution
//! looks a server up by (client-IP, server-IP) and, on hit, marks the
//! 4-tuple "seen" so later packets of the same flow are silent. Both
//! structures are `DashMap`s, owned privately by the capture task rather
//! than exposed as globals.

use std::net::IpAddr;
use std::time::Instant;

use dashmap::DashMap;

use crate::capture::FourTuple;
use crate::config::DNS_CACHE_TTL_SECS;

#[derive(Debug, Clone)]
struct Observation {
    host: String,
    ts: Instant,
}

/// Keyed by (client_ip, server_ip); tie-break on repeated inserts is
/// last-write-wins.
pub struct DnsCache {
    observations: DashMap<(IpAddr, IpAddr), Observation>,
    seen_quic_flows: DashMap<FourTuple, Instant>,
}

impl DnsCache {
    pub fn new() -> Self {
        DnsCache {
            observations: DashMap::new(),
            seen_quic_flows: DashMap::new(),
        }
    }

    /// Records that `client_ip` resolved `host` to `server_ip`. Overwrites
    /// any prior entry for the same (client_ip, server_ip) pair.
    pub fn record(&self, client_ip: IpAddr, server_ip: IpAddr, host: &str) {
        self.observations.insert(
            (client_ip, server_ip),
            Observation {
                host: host.to_string(),
                ts: Instant::now(),
            },
        );
    }

    /// Looks up the cached hostname for (client_ip, server_ip), if present
    /// and not expired.
    pub fn lookup(&self, client_ip: IpAddr, server_ip: IpAddr) -> Option<String> {
        self.observations.get(&(client_ip, server_ip)).and_then(|obs| {
            if obs.ts.elapsed().as_secs() < DNS_CACHE_TTL_SECS {
                Some(obs.host.clone())
            } else {
                None
            }
        })
    }

    /// True if `flow` has already been attributed via QUIC and should be
    /// skipped.
    pub fn is_quic_flow_seen(&self, flow: &FourTuple) -> bool {
        self.seen_quic_flows
            .get(flow)
            .map(|ts| ts.elapsed().as_secs() < DNS_CACHE_TTL_SECS)
            .unwrap_or(false)
    }

    /// Marks `flow` as attributed so later packets are silent.
    pub fn mark_quic_flow_seen(&self, flow: FourTuple) {
        self.seen_quic_flows.insert(flow, Instant::now());
    }

    /// Evicts observations and seen-flow markers older than
    /// [`DNS_CACHE_TTL_SECS`]. Intended to run opportunistically at most
    /// once per [`crate::config::DNS_CACHE_SWEEP_INTERVAL_SECS`].
    pub fn sweep(&self) {
        let cutoff = std::time::Duration::from_secs(DNS_CACHE_TTL_SECS);
        self.observations.retain(|_, v| v.ts.elapsed() < cutoff);
        self.seen_quic_flows.retain(|_, ts| ts.elapsed() < cutoff);
    }
}

impl Default for DnsCache {
    fn default() -> Self {
        Self::new()
    }
}
