//! ZopLog: passive inline network observability and enforcement for a
//! home/edge gateway.
//!
//! The library exposes the building blocks shared by the three binaries
//! (`zoplogd`, `zoplog-blocklogd`, `zoplog-cleanup`): packet capture and
//! decoding, the persistence layer, and the decision/effector logic.

pub mod capture;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod settings;

/// Installs a panic hook that logs via `tracing::error!` before the default
/// hook runs, so a single bad handler panic is observed before the process
/// exits. The capture loop itself must never let a panic reach here
/// uncaught; this is a last line of defense.
pub fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic in zoplog: {info}");
        default_hook(info);
    }));
}

/// Initializes `tracing_subscriber` from `RUST_LOG`, falling back to the
/// given default filter directive.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}
