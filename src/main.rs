use anyhow::{Context, Result};
use churnstore::{ingest::run_ingestion, init_logging, Config};
use tracing::info;

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    init_logging("info,churnstore=info");
    info!("startup");

    // ─── 2) resolve config ───────────────────────────────────────────
    let config = Config::from_env().context("loading configuration")?;
    info!(
        source = %config.source_csv.display(),
        db = %config.db_path.display(),
        table = %config.table,
        on_existing = ?config.on_existing,
        "config"
    );

    // ─── 3) read → normalize → write ─────────────────────────────────
    let outcome = run_ingestion(&config).with_context(|| {
        format!(
            "ingesting {} into {}",
            config.source_csv.display(),
            config.db_path.display()
        )
    })?;

    info!(rows = outcome.rows, created = outcome.created, "all done");
    Ok(())
}
