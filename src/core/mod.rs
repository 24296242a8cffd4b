//! Core decision logic: host normalization/matching, the firewall effector,
//! identity interning + packet writing, the blocked-log ingestor, and the
//! disk-pressure purge orchestration.

pub mod blocklog;
pub mod firewall;
pub mod host;
pub mod identity;
pub mod purge;
