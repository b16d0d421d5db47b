// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::infrastructure::config::DatabaseConfig;

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS sales (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        item_id TEXT NOT NULL UNIQUE CHECK (length(item_id) > 0),
        search_query TEXT NOT NULL,
        tier TEXT,
        search_url TEXT NOT NULL,
        verified BOOLEAN NOT NULL DEFAULT 0,
        card_id TEXT,
        sale_date TEXT,
        date_normal TEXT,
        title TEXT,
        price REAL,
        platform TEXT,
        grader TEXT,
        grade TEXT,
        universal_gem_rate_id TEXT,
        document TEXT NOT NULL,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_sales_search_query ON sales (search_query)",
    "CREATE INDEX IF NOT EXISTS idx_sales_date_normal ON sales (date_normal)",
    "CREATE INDEX IF NOT EXISTS idx_sales_gem_rate_id ON sales (universal_gem_rate_id)",
    r"
    CREATE TABLE IF NOT EXISTS population (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        gemrate_id TEXT NOT NULL,
        search_query TEXT,
        grading_company TEXT NOT NULL,
        grade_type TEXT NOT NULL,
        grade_value REAL NOT NULL,
        grade_count INTEGER NOT NULL,
        card_description TEXT,
        card_name TEXT,
        card_number TEXT,
        card_year TEXT,
        set_name TEXT,
        parallel TEXT,
        category TEXT,
        card_gem_rate REAL,
        card_gems INTEGER,
        card_total_grades INTEGER,
        last_population_change TEXT,
        date_fetched DATE NOT NULL DEFAULT (date('now')),
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (gemrate_id, grading_company, grade_type, grade_value)
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_population_gemrate_id ON population (gemrate_id)",
    "CREATE INDEX IF NOT EXISTS idx_population_card_name ON population (card_name)",
];

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_config(&DatabaseConfig {
            url: database_url.to_string(),
            ..DatabaseConfig::default()
        })
        .await
    }

    pub async fn with_config(config: &DatabaseConfig) -> Result<Self> {
        let database_url = config.url.as_str();
        let db_path = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if !db_path.starts_with(":memory:") {
            if let Some(parent) = Path::new(db_path).parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        // WAL lets the sync workers read while another connection writes
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        info!("🗄️ Connected to {} (pool size {})", database_url, config.max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
