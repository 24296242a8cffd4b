//! Capture demux daemon.
//!
//! Owns the `CaptureEngine`, the reassembly buffer, and the DNS
//! observation/seen-QUIC-flow caches, and dispatches each decoded frame to
//! at most one of the TLS, HTTP, DNS, or QUIC paths. TCP frames are
//! classified by content (TLS ClientHello, then HTTP request line), not by
//! port, since the capture filter's bare `tcp` term admits every TCP port.

use std::sync::Arc;
use std::time::Duration;

use zoplog::capture::dns_cache::DnsCache;
use zoplog::capture::reassembly::ReassemblyBuffer;
use zoplog::capture::{self, http, tls, CaptureEngine, CapturedFrame, Protocol};
use zoplog::config::{
    CAPTURE_FILTER, DNS_CACHE_SWEEP_INTERVAL_SECS, REASSEMBLY_SWEEP_INTERVAL_SECS,
};
use zoplog::core::identity::{process_observed_host, ObservedHost};
use zoplog::db::packet_log::LogType;
use zoplog::db::Database;
use zoplog::settings::{load_db_config, load_settings, DEFAULT_DB_CONFIG_PATH, DEFAULT_SETTINGS_PATH};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zoplog::install_panic_hook();
    zoplog::init_tracing("zoplogd=info");

    let settings = load_settings(DEFAULT_SETTINGS_PATH);
    let db_config = load_db_config(DEFAULT_DB_CONFIG_PATH);
    let db_url = db_config.connection_url();
    let mut db = Database::connect(&db_url).await?;

    let firewall_helper_path = resolve_firewall_helper_path();

    let interface = capture::resolve_interface(&settings.monitor_interface);
    let (_engine, mut rx) = CaptureEngine::start(&interface, CAPTURE_FILTER, 4096)?;

    let reassembly = Arc::new(ReassemblyBuffer::new());
    let dns_cache = Arc::new(DnsCache::new());

    {
        let reassembly = Arc::clone(&reassembly);
        let dns_cache = Arc::clone(&dns_cache);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(REASSEMBLY_SWEEP_INTERVAL_SECS));
            let mut dns_tick = tokio::time::interval(Duration::from_secs(DNS_CACHE_SWEEP_INTERVAL_SECS));
            loop {
                tokio::select! {
                    _ = tick.tick() => reassembly.sweep(),
                    _ = dns_tick.tick() => dns_cache.sweep(),
                }
            }
        });
    }

    tracing::info!("zoplogd started on {interface}");

    while let Some(frame) = rx.recv().await {
        let result = zoplog::db::with_retry(&mut db, &db_url, |db| {
            let reassembly = Arc::clone(&reassembly);
            let dns_cache = Arc::clone(&dns_cache);
            let firewall_helper_path = firewall_helper_path.clone();
            let frame = frame.clone();
            async move { handle_frame(&db, &firewall_helper_path, &reassembly, &dns_cache, frame).await }
        })
        .await;
        if let Err(e) = result {
            tracing::debug!("dropping frame: {e}");
        }
    }

    Ok(())
}

fn resolve_firewall_helper_path() -> String {
    let relative = format!("scripts/{}", zoplog::config::FIREWALL_HELPER_NAME);
    if std::path::Path::new(&relative).exists() {
        relative
    } else {
        zoplog::config::FIREWALL_HELPER_FALLBACK.to_string()
    }
}

async fn handle_frame(
    db: &Database,
    firewall_helper_path: &str,
    reassembly: &ReassemblyBuffer,
    dns_cache: &DnsCache,
    frame: CapturedFrame,
) -> zoplog::error::Result<()> {
    match frame.protocol {
        // Classification is content-based, not port-based: the capture
        // filter's bare `tcp` term admits every TCP port (a TLS service on
        // 8443, a proxy on 8080, …), so every TCP frame gets a shot at both
        // the TLS and HTTP parsers rather than only 443/80.
        Protocol::Tcp => {
            let matched = handle_tls_candidate(db, firewall_helper_path, reassembly, &frame).await?;
            if !matched {
                handle_http_candidate(db, firewall_helper_path, &frame).await?;
            }
            Ok(())
        }
        Protocol::Udp if frame.src_port == 53 => {
            handle_dns_response(dns_cache, frame);
            Ok(())
        }
        Protocol::Udp if frame.dst_port == 443 || frame.src_port == 443 => {
            handle_quic_candidate(db, firewall_helper_path, dns_cache, frame).await
        }
        _ => Ok(()),
    }
}

/// Attempts TLS ClientHello/SNI extraction (with cross-segment reassembly)
/// on `frame`. Returns whether a hostname was found and logged, so the
/// caller can skip the HTTP attempt when it was.
async fn handle_tls_candidate(
    db: &Database,
    firewall_helper_path: &str,
    reassembly: &ReassemblyBuffer,
    frame: &CapturedFrame,
) -> zoplog::error::Result<bool> {
    if frame.payload.is_empty() {
        return Ok(false);
    }

    let key = frame.four_tuple();
    let hostname = match tls::extract_sni(&frame.payload) {
        Some(h) => {
            reassembly.clear(&key);
            Some(h)
        }
        None => {
            let buffered = reassembly.append(key, &frame.payload);
            match tls::extract_sni(&buffered) {
                Some(h) => {
                    reassembly.clear(&key);
                    Some(h)
                }
                None => None,
            }
        }
    };

    let Some(hostname) = hostname else {
        return Ok(false);
    };

    let observed = ObservedHost {
        hostname,
        src_ip: frame.src_ip.to_string(),
        src_port: Some(frame.src_port),
        dst_ip: frame.dst_ip.to_string(),
        dst_port: Some(frame.dst_port),
        src_mac: frame.src_mac.clone(),
        dst_mac: frame.dst_mac.clone(),
        method: "TLS_CLIENTHELLO".to_string(),
        path: None,
        user_agent: None,
        accept_language: None,
        log_type: LogType::Https,
    };
    process_observed_host(db, firewall_helper_path, observed).await?;
    Ok(true)
}

async fn handle_http_candidate(
    db: &Database,
    firewall_helper_path: &str,
    frame: &CapturedFrame,
) -> zoplog::error::Result<()> {
    let Some(request) = http::parse_request(&frame.payload) else {
        return Ok(());
    };
    let Some(host) = request.host else {
        return Ok(());
    };

    let observed = ObservedHost {
        hostname: host,
        src_ip: frame.src_ip.to_string(),
        src_port: Some(frame.src_port),
        dst_ip: frame.dst_ip.to_string(),
        dst_port: Some(frame.dst_port),
        src_mac: frame.src_mac.clone(),
        dst_mac: frame.dst_mac.clone(),
        method: request.method,
        path: Some(request.path),
        user_agent: request.user_agent,
        accept_language: request.accept_language,
        log_type: LogType::Http,
    };
    process_observed_host(db, firewall_helper_path, observed).await?;
    Ok(())
}

fn handle_dns_response(dns_cache: &DnsCache, frame: CapturedFrame) {
    let client_ip = frame.dst_ip; // the response flows back to the original requester
    for (host, ip) in capture::parse_dns_answers(&frame.payload) {
        dns_cache.record(client_ip, ip, &host);
    }
}

async fn handle_quic_candidate(
    db: &Database,
    firewall_helper_path: &str,
    dns_cache: &DnsCache,
    frame: CapturedFrame,
) -> zoplog::error::Result<()> {
    let flow = frame.four_tuple();
    if dns_cache.is_quic_flow_seen(&flow) {
        return Ok(());
    }

    let (client_ip, server_ip) = if frame.dst_port == 443 {
        (frame.src_ip, frame.dst_ip)
    } else {
        (frame.dst_ip, frame.src_ip)
    };

    let Some(hostname) = dns_cache.lookup(client_ip, server_ip) else {
        return Ok(());
    };

    dns_cache.mark_quic_flow_seen(flow);

    let observed = ObservedHost {
        hostname,
        src_ip: frame.src_ip.to_string(),
        src_port: Some(frame.src_port),
        dst_ip: frame.dst_ip.to_string(),
        dst_port: Some(frame.dst_port),
        src_mac: frame.src_mac,
        dst_mac: frame.dst_mac,
        method: "QUIC".to_string(),
        path: None,
        user_agent: None,
        accept_language: None,
        log_type: LogType::Https,
    };
    process_observed_host(db, firewall_helper_path, observed).await?;
    Ok(())
}
