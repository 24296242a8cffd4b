//! Packet capture engine and frame decoding.
//!
//! `CaptureEngine` owns a dedicated blocking task running a `pcap` capture
//! loop: an `Arc<AtomicBool>` shutdown flag, with `Drop` releasing
//! resources. Decoded frames are handed to the async side over a bounded
//! channel; a full channel drops the frame rather than blocking the
//! capture thread.

pub mod dns_cache;
pub mod http;
pub mod reassembly;
pub mod tls;

pub use reassembly::FourTuple;

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Result, ZopError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

/// One decoded frame, stripped down to what the demux needs: addresses,
/// ports, and the transport-layer payload.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub src_mac: Option<String>,
    pub dst_mac: Option<String>,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub payload: Vec<u8>,
}

impl CapturedFrame {
    pub fn four_tuple(&self) -> (IpAddr, u16, IpAddr, u16) {
        (self.src_ip, self.src_port, self.dst_ip, self.dst_port)
    }
}

/// Decodes a DNS response payload (no 2-byte TCP length prefix — callers
/// skip that themselves) and returns every (owner name, IP) pair from its
/// A/AAAA answer records. Returns an empty vec for queries, non-DNS
/// payloads, or parse failures — never panics.
pub fn parse_dns_answers(payload: &[u8]) -> Vec<(String, IpAddr)> {
    let Ok(packet) = dns_parser::Packet::parse(payload) else {
        return Vec::new();
    };
    if packet.header.query {
        return Vec::new(); // only responses (qr=1) carry answers we care about
    }

    packet
        .answers
        .iter()
        .filter_map(|rr| {
            let ip = match rr.data {
                dns_parser::RData::A(addr) => Some(IpAddr::V4(addr.0)),
                dns_parser::RData::AAAA(addr) => Some(IpAddr::V6(addr.0)),
                _ => None,
            }?;
            Some((rr.name.to_string(), ip))
        })
        .collect()
}

fn mac_to_string(mac: [u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Decodes one captured Ethernet frame into a `CapturedFrame`, or `None` if
/// it isn't an Ethernet+IPv4/IPv6+TCP/UDP frame this pipeline cares about.
/// Never panics on truncated or malformed input.
pub fn decode_frame(data: &[u8]) -> Option<CapturedFrame> {
    let headers = etherparse::PacketHeaders::from_ethernet_slice(data).ok()?;

    let (src_mac, dst_mac) = match &headers.link {
        Some(etherparse::LinkHeader::Ethernet2(eth)) => (
            Some(mac_to_string(eth.source)),
            Some(mac_to_string(eth.destination)),
        ),
        _ => (None, None),
    };

    let (src_ip, dst_ip) = match &headers.net {
        Some(etherparse::NetHeaders::Ipv4(ipv4, _)) => (
            IpAddr::V4(ipv4.source.into()),
            IpAddr::V4(ipv4.destination.into()),
        ),
        Some(etherparse::NetHeaders::Ipv6(ipv6, _)) => (
            IpAddr::V6(ipv6.source.into()),
            IpAddr::V6(ipv6.destination.into()),
        ),
        _ => return None,
    };

    let (protocol, src_port, dst_port) = match &headers.transport {
        Some(etherparse::TransportHeader::Tcp(tcp)) => (Protocol::Tcp, tcp.source_port, tcp.destination_port),
        Some(etherparse::TransportHeader::Udp(udp)) => (Protocol::Udp, udp.source_port, udp.destination_port),
        _ => return None,
    };

    Some(CapturedFrame {
        src_mac,
        dst_mac,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
        payload: headers.payload.slice().to_vec(),
    })
}

/// Owns the background capture task. Dropping it sets the shutdown flag;
/// the capture loop observes it on its next iteration and exits.
pub struct CaptureEngine {
    shutdown: Arc<AtomicBool>,
    _task: Option<JoinHandle<()>>,
}

/// Resolves the interface to monitor: the configured name if it exists among
/// the host's devices, else a device named [`crate::config::PREFERRED_BRIDGE_INTERFACE`]
/// if present, else the first non-loopback device. Falls back to the
/// configured name unchanged if device enumeration itself fails (the
/// subsequent `pcap::Capture::from_device` call will surface that error).
pub fn resolve_interface(configured: &str) -> String {
    let devices = match pcap::Device::list() {
        Ok(devices) => devices,
        Err(e) => {
            tracing::warn!("could not enumerate capture devices: {e}; using {configured} as configured");
            return configured.to_string();
        }
    };

    if devices.iter().any(|d| d.name == configured) {
        return configured.to_string();
    }

    tracing::warn!("configured interface {configured:?} not found among capture devices");

    if let Some(bridge) = devices
        .iter()
        .find(|d| d.name == crate::config::PREFERRED_BRIDGE_INTERFACE)
    {
        tracing::info!("falling back to preferred bridge interface {}", bridge.name);
        return bridge.name.clone();
    }

    if let Some(first) = devices.iter().find(|d| !is_loopback_name(&d.name)) {
        tracing::info!("falling back to first non-loopback interface {}", first.name);
        return first.name.clone();
    }

    configured.to_string()
}

fn is_loopback_name(name: &str) -> bool {
    name == "lo" || name == "lo0"
}

/// Rejects empty, overlong, or shell-metacharacter-bearing interface names
/// before they reach libpcap.
fn validate_interface_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ZopError::Config("interface name must not be empty".to_string()));
    }
    if name.len() > 256 {
        return Err(ZopError::Config("interface name is too long".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':')
    {
        return Err(ZopError::Config(format!(
            "interface name {name:?} contains invalid characters"
        )));
    }
    Ok(())
}

impl CaptureEngine {
    /// Opens `interface` in promiscuous mode, applies `filter`, and starts
    /// pulling packets on a blocking task, decoding each with
    /// [`decode_frame`] and forwarding it over a bounded channel. A full
    /// channel drops the frame (logged at debug) rather than stalling the
    /// capture loop.
    pub fn start(interface: &str, filter: &str, channel_capacity: usize) -> Result<(Self, mpsc::Receiver<CapturedFrame>)> {
        validate_interface_name(interface)?;

        let mut cap = pcap::Capture::from_device(interface)
            .map_err(|e| ZopError::Capture(format!("opening device {interface}: {e}")))?
            .promisc(true)
            .snaplen(65535)
            .timeout(1000)
            .open()
            .map_err(|e| ZopError::Capture(format!("activating capture on {interface}: {e}")))?;

        cap.filter(filter, true)
            .map_err(|e| ZopError::Capture(format!("compiling filter {filter:?}: {e}")))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let (tx, rx) = mpsc::channel(channel_capacity);

        let task = tokio::task::spawn_blocking(move || {
            loop {
                if shutdown_clone.load(Ordering::Relaxed) {
                    break;
                }
                match cap.next_packet() {
                    Ok(packet) => {
                        if let Some(frame) = decode_frame(packet.data) {
                            if tx.try_send(frame).is_err() {
                                tracing::debug!("capture channel full, dropping frame");
                            }
                        }
                    }
                    Err(pcap::Error::TimeoutExpired) => continue,
                    Err(e) => {
                        tracing::error!("capture loop on {interface} exiting: {e}");
                        break;
                    }
                }
            }
        });

        tracing::info!("CaptureEngine started on {interface} with filter {filter:?}");
        Ok((
            CaptureEngine {
                shutdown,
                _task: Some(task),
            },
            rx,
        ))
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for CaptureEngine {
    fn drop(&mut self) {
        tracing::warn!("CaptureEngine dropped — releasing capture resources");
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ipv4_udp_ethernet_frame(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        use etherparse::PacketBuilder;
        let builder = PacketBuilder::ethernet2([0, 1, 2, 3, 4, 5], [6, 7, 8, 9, 10, 11])
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(src_port, dst_port);
        let mut out = Vec::new();
        builder.write(&mut out, payload).unwrap();
        out
    }

    #[test]
    fn test_decode_frame_empty_is_none() {
        assert!(decode_frame(&[]).is_none());
    }

    #[test]
    fn test_decode_frame_garbage_does_not_panic() {
        let garbage = vec![0xffu8; 7];
        assert!(decode_frame(&garbage).is_none());
    }

    #[test]
    fn test_decode_frame_valid_udp() {
        let frame_bytes = build_ipv4_udp_ethernet_frame(5353, 53, b"hello");
        let frame = decode_frame(&frame_bytes).expect("should decode");
        assert_eq!(frame.protocol, Protocol::Udp);
        assert_eq!(frame.src_port, 5353);
        assert_eq!(frame.dst_port, 53);
        assert_eq!(frame.payload, b"hello");
        assert_eq!(frame.src_ip, IpAddr::from([10, 0, 0, 1]));
    }

    #[test]
    fn test_validate_interface_name_valid() {
        assert!(validate_interface_name("eth0").is_ok());
        assert!(validate_interface_name("br-zoplog").is_ok());
    }

    #[test]
    fn test_validate_interface_name_rejects_shell_metacharacters() {
        assert!(validate_interface_name("eth0; rm -rf /").is_err());
        assert!(validate_interface_name("").is_err());
    }

    #[test]
    fn test_is_loopback_name() {
        assert!(is_loopback_name("lo"));
        assert!(is_loopback_name("lo0"));
        assert!(!is_loopback_name("eth0"));
        assert!(!is_loopback_name("br-zoplog"));
    }

    #[test]
    fn test_resolve_interface_falls_back_to_configured_on_enumeration_failure() {
        // In a sandboxed test environment `pcap::Device::list()` may fail
        // (no capture permissions); resolving must still return a usable
        // value rather than panicking.
        let resolved = resolve_interface("eth0");
        assert!(!resolved.is_empty());
    }

    #[test]
    fn test_parse_dns_answers_garbage_does_not_panic() {
        assert!(parse_dns_answers(&[0xff; 10]).is_empty());
        assert!(parse_dns_answers(&[]).is_empty());
    }

    #[test]
    fn test_four_tuple() {
        let frame_bytes = build_ipv4_udp_ethernet_frame(1, 2, b"");
        let frame = decode_frame(&frame_bytes).unwrap();
        let (src_ip, src_port, dst_ip, dst_port) = frame.four_tuple();
        assert_eq!(src_port, 1);
        assert_eq!(dst_port, 2);
        assert_eq!(src_ip, IpAddr::from([10, 0, 0, 1]));
        assert_eq!(dst_ip, IpAddr::from([10, 0, 0, 2]));
    }
}
