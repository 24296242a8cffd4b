//! Disk-pressure purger CLI.

use clap::Parser;

use zoplog::core::purge::{run_purge, StatvfsProbe};
use zoplog::db::purge::{optimize_tables, sweep_orphaned_ips};
use zoplog::db::Database;
use zoplog::settings::{load_db_config, DEFAULT_DB_CONFIG_PATH};

/// Disk-pressure purger and maintenance tool for the ZopLog database.
#[derive(Parser, Debug)]
#[command(name = "zoplog-cleanup")]
struct Args {
    /// Show what would be done without making changes.
    #[arg(long)]
    dry_run: bool,

    /// Force disk space cleanup regardless of current usage (normally only
    /// runs when usage is at or above the configured trigger threshold).
    #[arg(long)]
    force_disk_cleanup: bool,

    /// Clean up orphaned records in lookup tables.
    #[arg(long)]
    cleanup_orphaned: bool,

    /// Optimize tables after cleanup.
    #[arg(long)]
    optimize: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    zoplog::install_panic_hook();
    zoplog::init_tracing("zoplog_cleanup=info");

    let args = Args::parse();
    let db_config = load_db_config(DEFAULT_DB_CONFIG_PATH);
    let db = Database::connect(&db_config.connection_url()).await?;

    let probe = StatvfsProbe;
    let outcome = run_purge(
        &db,
        &probe,
        zoplog::config::DEFAULT_DB_DATA_DIR,
        zoplog::config::PURGE_TARGET_FREE_PERCENT,
        args.force_disk_cleanup,
        args.dry_run,
    )
    .await?;

    if outcome.triggered {
        tracing::info!(
            "purge complete: {} day(s), {} packet_logs, {} blocked_events{}",
            outcome.days_deleted,
            outcome.packet_logs_deleted,
            outcome.blocked_events_deleted,
            if args.dry_run { " (dry run)" } else { "" }
        );
    } else {
        tracing::info!("disk usage below trigger threshold; no purge run");
    }

    if args.cleanup_orphaned {
        let deleted = sweep_orphaned_ips(&db, args.dry_run).await?;
        tracing::info!(
            "orphan sweep: {} ip_addresses row(s){}",
            deleted,
            if args.dry_run { " would be deleted" } else { " deleted" }
        );
    }

    if args.optimize {
        let tables = optimize_tables(&db, args.dry_run).await?;
        tracing::info!("optimized tables: {}", tables.join(", "));
    }

    Ok(())
}
