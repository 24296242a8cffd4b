//! Blocked-event ingestion daemon.
//!
//! Tails the kernel log stream starting at the tail of the current boot,
//! waits for new records, and hands each wakeup's batch to
//! `core::blocklog::ingest_batch`.

use systemd::journal::OpenOptions;

use zoplog::core::blocklog::JournalSource;
use zoplog::db::Database;
use zoplog::settings::{load_db_config, load_settings, DEFAULT_DB_CONFIG_PATH, DEFAULT_SETTINGS_PATH};

/// Wraps a live `systemd::journal::Journal`, seeked to the tail of the
/// current boot, as a `JournalSource`.
struct SystemdJournalSource {
    journal: systemd::journal::Journal,
}

impl SystemdJournalSource {
    fn open() -> anyhow::Result<Self> {
        let mut journal = OpenOptions::default().open()?;
        journal.this_boot()?;
        journal.seek_tail()?;
        Ok(SystemdJournalSource { journal })
    }
}

impl JournalSource for SystemdJournalSource {
    fn wait_for_records(&mut self) -> Vec<String> {
        // Block until at least one entry is available, then drain whatever
        // arrived without blocking further — mirrors nft_blocklog_reader.py's
        // `reader.wait(None)` followed by draining `get_next()`.
        if self.journal.wait(None).is_err() {
            return Vec::new();
        }

        let mut lines = Vec::new();
        loop {
            match self.journal.next_entry() {
                Ok(Some(entry)) => {
                    if let Some(message) = entry.get("MESSAGE") {
                        lines.push(message.clone());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("journal read error: {e}");
                    break;
                }
            }
        }
        lines
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zoplog::install_panic_hook();
    zoplog::init_tracing("zoplog_blocklogd=info");

    let settings = load_settings(DEFAULT_SETTINGS_PATH);
    let db_config = load_db_config(DEFAULT_DB_CONFIG_PATH);
    let mut db = Database::connect(&db_config.connection_url()).await?;

    let mut source = SystemdJournalSource::open()?;

    tracing::info!("zoplog-blocklogd started, monitoring interface {}", settings.monitor_interface);

    loop {
        let batch = source.wait_for_records();
        if batch.is_empty() {
            continue;
        }

        let monitor_interface = settings.monitor_interface.clone();
        let db_url = db_config.connection_url();
        let result = zoplog::db::with_retry(&mut db, &db_url, |db| {
            let monitor_interface = monitor_interface.clone();
            let batch = batch.clone();
            async move { zoplog::core::blocklog::ingest_batch(&db, &monitor_interface, batch).await }
        })
        .await;

        match result {
            Ok(n) => tracing::debug!("ingested {n} blocked events"),
            Err(e) => tracing::error!("failed to ingest blocked events, skipping batch: {e}"),
        }
    }
}
