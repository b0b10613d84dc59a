use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use quake_ingest::{init_logging, open_feed, IngestConfig, IngestEngine, SqliteStore};

/// Import earthquake feeds into SQLite and inspect the result
#[derive(Debug, Parser)]
#[command(name = "quakes", version)]
struct Cli {
    /// SQLite database file (overrides QUAKES_DATABASE)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Records per committed batch (overrides QUAKES_BATCH_SIZE)
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import a .geojson/.json/.csv feed file
    Import {
        /// Feed file to import
        feed: PathBuf,
    },
    /// Print stored quakes, newest first
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = IngestConfig::from_env()?;
    if let Some(db) = cli.db {
        config.database_path = db;
    }
    if let Some(size) = cli.batch_size {
        config.batch_size = size;
    }
    init_logging(&config.log)?;

    match cli.command {
        Command::Import { feed } => run_import(&config, feed),
        Command::List { limit } => run_list(&config, limit),
    }
}

fn open_engine(config: &IngestConfig) -> Result<IngestEngine<SqliteStore>> {
    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!("Failed to open database {}", config.database_path.display())
    })?;
    let engine = IngestEngine::new(store, config.validated_batch_size()?)?;
    Ok(engine)
}

fn run_import(config: &IngestConfig, feed: PathBuf) -> Result<()> {
    println!("🌍 Quake import: {} → {}", feed.display(), config.database_path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut engine = open_engine(config)?;
    let before = engine.live_view().len();

    let summary = engine.ingest_source(|| open_feed(&feed))?;

    println!("✓ Records read:      {}", summary.records_seen);
    println!("✓ Batches committed: {}", summary.batches_committed);
    println!("✓ Inserted:          {}", summary.inserted);
    println!("✓ Replaced:          {}", summary.replaced);
    println!("✓ Rejected:          {}", summary.rejected);
    println!(
        "✓ Stored quakes:     {} (was {})",
        engine.live_view().len(),
        before
    );

    Ok(())
}

fn run_list(config: &IngestConfig, limit: usize) -> Result<()> {
    let engine = open_engine(config)?;
    let snapshot = engine.live_view().snapshot();

    println!("📊 {} quakes stored, showing {}", snapshot.len(), limit.min(snapshot.len()));
    for quake in snapshot.quakes().iter().take(limit) {
        println!(
            "{}  M{:<4.1} {:<12} {}",
            quake.time.format("%Y-%m-%d %H:%M:%S"),
            quake.magnitude,
            quake.code,
            quake.place
        );
    }

    Ok(())
}
