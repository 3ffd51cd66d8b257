// ABOUTME: Library root for pg-cdc-manager
// ABOUTME: Config validation, DDL generation and idempotent profile execution

pub mod config;
pub mod error;
pub mod executor;
pub mod postgres;
pub mod replication;
pub mod secrets;
pub mod utils;

pub use config::Config;
pub use error::ConfigError;
pub use executor::ProfileExecutor;
