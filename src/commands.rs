//! Command handlers wiring configuration, storage, transport and use cases
//!
//! Each subcommand opens the store, builds its collaborators from
//! [`AppConfig`] and prints a plain-text report to stdout. Logs go to
//! stderr and the optional log file.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::{
    BatchCoordinator, CoordinatorSettings, FetchSettings, IncrementalFetcher, IntegrityAudit, PopulationSettings,
    PopulationSync,
};
use crate::cli::{AuditArgs, Cli, Commands, PopulationArgs, SyncArgs};
use crate::domain::{SearchQuery, SyncMode};
use crate::infrastructure::logging::{init_logging_with_config, log_system_info};
use crate::infrastructure::{
    ApiClient, AppConfig, DatabaseConnection, PopulationRepository, SalesRepository, read_queries, write_queries,
};

/// Entry point used by the binary.
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_logging_with_config(&config.logging)?;
    log_system_info();

    let database = DatabaseConnection::with_config(&config.database).await?;
    database.migrate().await?;

    let result = match &cli.command {
        Commands::Sync(args) => run_sync(&config, &database, SyncMode::Full, args).await,
        Commands::Daily(args) => run_sync(&config, &database, SyncMode::Daily, args).await,
        Commands::Audit(args) => run_audit(&config, &database, args).await,
        Commands::Population(args) => run_population(&config, &database, args).await,
    };

    database.close().await;
    result
}

async fn load_queries(path: &Path) -> Result<Vec<SearchQuery>> {
    let queries = read_queries(path).await?;
    info!("📄 Loaded {} unique queries from {}", queries.len(), path.display());
    Ok(queries)
}

async fn run_sync(config: &AppConfig, database: &DatabaseConnection, mode: SyncMode, args: &SyncArgs) -> Result<()> {
    let queries = load_queries(&args.input).await?;

    let client = Arc::new(ApiClient::new(&config.api)?);
    let sales = Arc::new(SalesRepository::new(database.pool().clone()));
    let fetcher = IncrementalFetcher::new(
        client,
        sales.clone(),
        FetchSettings {
            page_size: config.sync.page_size,
            page_delay: config.sync.page_delay(),
        },
    );

    let profile = config.sync.profile(mode);
    let settings = CoordinatorSettings {
        mode,
        batch_size: profile.batch_size,
        workers: profile.workers,
        batch_delay: profile.batch_delay(),
    };
    let coordinator = BatchCoordinator::new(Arc::new(fetcher), sales.clone(), settings);
    let stats = coordinator.run(&queries).await?;

    println!("{stats}");
    match sales.total_records().await {
        Ok(total) => println!("Total records in store:  {total}"),
        Err(e) => warn!("Could not count stored records: {}", e),
    }

    if let Some(path) = &args.failed_out {
        if stats.failed_queries.is_empty() {
            info!("No failed queries to write");
        } else {
            write_queries(path, &stats.failed_queries).await?;
            println!("Failed queries written to {}", path.display());
        }
    }
    Ok(())
}

async fn run_audit(config: &AppConfig, database: &DatabaseConnection, args: &AuditArgs) -> Result<()> {
    let queries = load_queries(&args.input).await?;

    let client = Arc::new(ApiClient::new(&config.api)?);
    let sales = Arc::new(SalesRepository::new(database.pool().clone()));
    let audit = IntegrityAudit::new(client, sales, config.sync.audit_delay());
    let report = audit.run(&queries).await;

    println!("{report}");
    if let Some(path) = &args.reprocess_out {
        let pending = report.needs_reprocessing();
        write_queries(path, &pending).await?;
        println!("{} queries to reprocess written to {}", pending.len(), path.display());
    }
    Ok(())
}

async fn run_population(config: &AppConfig, database: &DatabaseConnection, args: &PopulationArgs) -> Result<()> {
    let client = Arc::new(ApiClient::new(&config.api)?);
    let store = Arc::new(PopulationRepository::new(database.pool().clone()));
    let settings = PopulationSettings {
        request_delay: config.population.request_delay(),
        skip_existing: !args.refresh && config.population.skip_existing,
    };

    let stats = PopulationSync::new(client, store, settings).run().await?;
    println!("{stats}");
    Ok(())
}
