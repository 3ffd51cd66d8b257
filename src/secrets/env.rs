// ABOUTME: ENV_SECRETS connection profiles
// ABOUTME: The variable holds a PostgreSQL URL or keyword/value string

use anyhow::{anyhow, Context, Result};
use std::str::FromStr;

pub fn from_env(var: &str) -> Result<tokio_postgres::Config> {
    let value = std::env::var(var)
        .with_context(|| format!("Environment variable '{}' not set", var))?;
    if value.trim().is_empty() {
        return Err(anyhow!("Environment variable '{}' is empty", var));
    }

    // The parse error never echoes the input, so the password stays out of it.
    let config = tokio_postgres::Config::from_str(value.trim()).with_context(|| {
        format!(
            "Environment variable '{}' does not hold a valid PostgreSQL connection string",
            var
        )
    })?;

    if config.get_hosts().is_empty() {
        return Err(anyhow!(
            "Connection string in '{}' does not name a host",
            var
        ));
    }
    Ok(config)
}
