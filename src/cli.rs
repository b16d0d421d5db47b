//! Command line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::infrastructure::AppConfig;

/// Incremental sports-card sales and population sync
#[derive(Parser, Debug)]
#[command(name = "card-sales-sync", version)]
#[command(about = "Pull sports-card sales and grading populations into a local SQLite store")]
pub struct Cli {
    /// Configuration file (TOML/JSON/YAML); defaults to config/default.* if present
    #[arg(short, long, global = true, env = "CARDSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override database.url, e.g. sqlite://data/card_sales.db
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Override logging.level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Full reconciliation: fetch every page the count gate lets through
    Sync(SyncArgs),

    /// Daily update: stop each query at the first already-stored sale
    Daily(SyncArgs),

    /// Compare remote totals with stored counts and list queries to re-run
    Audit(AuditArgs),

    /// Fetch grading population reports for cards referenced by stored sales
    Population(PopulationArgs),
}

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Query file (CSV/TSV with a Queries column, or one query per line)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Concurrent queries per batch
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Queries per outer batch
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Write queries that failed to this file
    #[arg(long)]
    pub failed_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Query file to audit
    #[arg(short, long)]
    pub input: PathBuf,

    /// Write mismatched and errored queries to this file
    #[arg(short, long)]
    pub reprocess_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PopulationArgs {
    /// Re-fetch ids that already have population rows
    #[arg(long)]
    pub refresh: bool,
}

impl Cli {
    /// Apply flag overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(url) = &self.database_url {
            config.database.url.clone_from(url);
        }
        if let Some(level) = &self.log_level {
            config.logging.level.clone_from(level);
        }
        match &self.command {
            Commands::Sync(args) => {
                let profile = &mut config.sync.full;
                profile.workers = args.workers.unwrap_or(profile.workers);
                profile.batch_size = args.batch_size.unwrap_or(profile.batch_size);
            }
            Commands::Daily(args) => {
                let profile = &mut config.sync.daily;
                profile.workers = args.workers.unwrap_or(profile.workers);
                profile.batch_size = args.batch_size.unwrap_or(profile.batch_size);
            }
            Commands::Population(args) => {
                if args.refresh {
                    config.population.skip_existing = false;
                }
            }
            Commands::Audit(_) => {}
        }
    }
}
