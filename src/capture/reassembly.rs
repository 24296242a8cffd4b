//! Bounded per-4-tuple TCP reassembly buffer.
//!
//! A lock-free concurrent map keyed by 4-tuple. Appends arrive in packet
//! order (no sequence-number reordering); once a buffer exceeds
//! [`crate::config::REASSEMBLY_MAX_BYTES`], only the trailing window is
//! kept. Entries older than [`crate::config::REASSEMBLY_MAX_AGE_SECS`] are
//! evicted on a cooperative sweep.

use std::net::IpAddr;
use std::time::Instant;

use dashmap::DashMap;

use crate::config::{REASSEMBLY_MAX_AGE_SECS, REASSEMBLY_MAX_BYTES};

pub type FourTuple = (IpAddr, u16, IpAddr, u16);

struct Entry {
    bytes: Vec<u8>,
    last_append: Instant,
}

/// A bounded reassembly buffer keyed by 4-tuple.
pub struct ReassemblyBuffer {
    entries: DashMap<FourTuple, Entry>,
}

impl ReassemblyBuffer {
    pub fn new() -> Self {
        ReassemblyBuffer {
            entries: DashMap::new(),
        }
    }

    /// Appends `data` to the buffer for `key`, keeping only the trailing
    /// [`REASSEMBLY_MAX_BYTES`] bytes. Returns the buffer's contents after
    /// the append.
    pub fn append(&self, key: FourTuple, data: &[u8]) -> Vec<u8> {
        let mut entry = self.entries.entry(key).or_insert_with(|| Entry {
            bytes: Vec::new(),
            last_append: Instant::now(),
        });
        entry.bytes.extend_from_slice(data);
        if entry.bytes.len() > REASSEMBLY_MAX_BYTES {
            let start = entry.bytes.len() - REASSEMBLY_MAX_BYTES;
            entry.bytes.drain(..start);
        }
        entry.last_append = Instant::now();
        entry.bytes.clone()
    }

    /// Drops the entry for `key` — called once a reassembled ClientHello
    /// parses successfully.
    pub fn clear(&self, key: &FourTuple) {
        self.entries.remove(key);
    }

    /// Evicts entries whose last append is older than
    /// [`REASSEMBLY_MAX_AGE_SECS`]. Intended to run at most once per second
    /// (`crate::config::REASSEMBLY_SWEEP_INTERVAL_SECS`).
    pub fn sweep(&self) {
        let cutoff = std::time::Duration::from_secs(REASSEMBLY_MAX_AGE_SECS);
        self.entries.retain(|_, v| v.last_append.elapsed() < cutoff);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn key() -> FourTuple {
        (
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            12345,
            IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)),
            443,
        )
    }

    #[test]
    fn test_append_accumulates() {
        let buf = ReassemblyBuffer::new();
        buf.append(key(), b"hello");
        let result = buf.append(key(), b"world");
        assert_eq!(result, b"helloworld");
    }

    #[test]
    fn test_append_trims_to_trailing_window() {
        let buf = ReassemblyBuffer::new();
        let chunk = vec![b'a'; REASSEMBLY_MAX_BYTES];
        buf.append(key(), &chunk);
        let result = buf.append(key(), b"TAIL");
        assert_eq!(result.len(), REASSEMBLY_MAX_BYTES);
        assert!(result.ends_with(b"TAIL"));
    }

    #[test]
    fn test_clear_removes_entry() {
        let buf = ReassemblyBuffer::new();
        buf.append(key(), b"data");
        assert_eq!(buf.len(), 1);
        buf.clear(&key());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_sweep_does_not_remove_fresh_entries() {
        let buf = ReassemblyBuffer::new();
        buf.append(key(), b"data");
        buf.sweep();
        assert_eq!(buf.len(), 1);
    }

    /// A ClientHello whose SNI extension straddles two TCP segments is
    /// recovered once the buffer holds both.
    #[test]
    fn test_cross_segment_clienthello_is_recovered_on_reassembly() {
        use crate::capture::tls::extract_sni;

        let record = build_client_hello_with_sni("split.example.com");
        let split_at = 20.min(record.len() - 1);
        let (first, second) = record.split_at(split_at);

        let buf = ReassemblyBuffer::new();
        assert!(extract_sni(first).is_none());

        let after_first = buf.append(key(), first);
        assert!(extract_sni(&after_first).is_none());

        let after_second = buf.append(key(), second);
        assert_eq!(extract_sni(&after_second), Some("split.example.com".to_string()));

        buf.clear(&key());
        assert!(buf.is_empty());
    }

    fn build_client_hello_with_sni(hostname: &str) -> Vec<u8> {
        let name_bytes = hostname.as_bytes();

        let mut sni_ext_data = Vec::new();
        let server_name_list_len = (1 + 2 + name_bytes.len()) as u16;
        sni_ext_data.extend_from_slice(&server_name_list_len.to_be_bytes());
        sni_ext_data.push(0x00);
        sni_ext_data.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
        sni_ext_data.extend_from_slice(name_bytes);

        let mut extensions = Vec::new();
        extensions.extend_from_slice(&0x0000u16.to_be_bytes());
        extensions.extend_from_slice(&(sni_ext_data.len() as u16).to_be_bytes());
        extensions.extend_from_slice(&sni_ext_data);

        let mut hello = Vec::new();
        hello.extend_from_slice(&[0x03, 0x03]);
        hello.extend_from_slice(&[0u8; 32]);
        hello.push(0);
        hello.extend_from_slice(&0u16.to_be_bytes());
        hello.push(1);
        hello.push(0);
        hello.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        hello.extend_from_slice(&extensions);

        let mut handshake = Vec::new();
        handshake.push(0x01);
        let hello_len = hello.len() as u32;
        handshake.push((hello_len >> 16) as u8);
        handshake.push((hello_len >> 8) as u8);
        handshake.push(hello_len as u8);
        handshake.extend_from_slice(&hello);

        let mut record = Vec::new();
        record.push(0x16);
        record.extend_from_slice(&[0x03, 0x01]);
        record.extend_from_slice(&(handshake.len() as u16).to_be_bytes());
        record.extend_from_slice(&handshake);

        record
    }
}
