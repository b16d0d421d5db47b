//! Infrastructure layer: configuration, logging, HTTP and SQLite adapters
//!
//! Implements the domain ports against the real endpoints and database.

pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod population_repository;
pub mod query_input;
pub mod sales_repository;

pub use config::{AppConfig, ConfigError, SecretString};
pub use database_connection::DatabaseConnection;
pub use http_client::{ApiClient, RetryPolicy};
pub use population_repository::PopulationRepository;
pub use query_input::{InputError, read_queries, write_queries};
pub use sales_repository::SalesRepository;
