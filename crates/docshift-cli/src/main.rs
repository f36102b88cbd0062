//! docshift — migrate a document-store export into a SQLite database.
//!
//! This binary wires the docshift-core engine to an export directory and
//! a target database, and reports the outcome of the run.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use docshift_core::{
    source, ExportDirSource, MigrationConfig, Migrator, ModelCatalog, SqliteSink,
};

#[derive(Parser, Debug)]
#[command(name = "docshift")]
#[command(about = "Migrate a document-store export into a SQLite database")]
struct Args {
    /// Directory containing the exported collections (one JSON/JSONL file each)
    #[arg(long)]
    export_dir: PathBuf,

    /// Target SQLite database path
    #[arg(long)]
    database: PathBuf,

    /// Name of the identifier-map audit table
    #[arg(long, default_value = MigrationConfig::DEFAULT_ID_MAP_TABLE)]
    id_map_table: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    if !args.export_dir.is_dir() {
        bail!("export directory {} does not exist", args.export_dir.display());
    }

    let mut config = MigrationConfig::new(&args.export_dir, &args.database);
    config.id_map_table = args.id_map_table;

    info!(export_dir = %config.export_dir.display(), "loading model definitions");
    let src = ExportDirSource::new(&config.export_dir);
    let blobs = source::read_model_defs(
        &src,
        MigrationConfig::MODEL_DEF_COLLECTION,
        MigrationConfig::MODEL_DEF_PREFIX,
    )
    .context("reading model definitions")?;
    if blobs.is_empty() {
        bail!(
            "no model definitions found in {}/{}",
            config.export_dir.display(),
            MigrationConfig::MODEL_DEF_COLLECTION
        );
    }

    let catalog = ModelCatalog::load_all(blobs).context("loading model definitions")?;
    info!(models = catalog.models().len(), "model catalog loaded");

    let mut sink =
        SqliteSink::open(&config.database).context("opening the target database")?;
    let report = Migrator::new(&catalog, &config)
        .run(&src, &mut sink)
        .context("migration failed")?;

    info!(
        rows = report.rows_created,
        links = report.links_created,
        "migration finished"
    );
    for collection in &report.collections_skipped {
        warn!(collection = %collection, "collection skipped: target table missing");
    }
    if report.documents_without_id > 0 {
        warn!(count = report.documents_without_id, "documents dropped for missing ids");
    }
    if report.dangling_refs > 0 {
        warn!(count = report.dangling_refs, "dangling references skipped");
    }
    for (reason, count) in &report.skips {
        info!(reason, count, "emission skips");
    }

    Ok(())
}
