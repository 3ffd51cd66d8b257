// ABOUTME: Resolves connection profiles into live PostgreSQL connection settings
// ABOUTME: Credentials come from environment variables or AWS Secrets Manager

pub mod aws;
pub mod env;

use anyhow::Result;
use serde::{Deserialize, Deserializer};
use std::fmt;

use crate::config::{ConnectionProfile, SecretSource};

pub const DEFAULT_PORT: u16 = 5432;
const APPLICATION_NAME: &str = "pg-cdc-manager";

/// Database credentials stored as a JSON secret.
#[derive(Clone, Deserialize)]
pub struct DbCredential {
    #[serde(alias = "dbname")]
    pub database: String,
    pub username: String,
    pub password: String,
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "port_from_number_or_string")]
    pub port: u16,
}

// Keeps the password out of logs.
impl fmt::Debug for DbCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbCredential")
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"********")
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl DbCredential {
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .user(&self.username)
            .password(&self.password)
            .dbname(&self.database);
        config
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Number(port) => Ok(port),
        Port::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Looks up the credentials of `connection` and turns them into connection
/// settings.
pub async fn resolve(connection: &ConnectionProfile) -> Result<tokio_postgres::Config> {
    let mut config = match connection.source {
        SecretSource::Env => env::from_env(&connection.credential_id)?,
        SecretSource::AwsSecretsManager => {
            let client = aws::AwsSecretsClient::new().await;
            client.get_credential(&connection.credential_id).await?.to_pg_config()
        }
    };

    if config.get_application_name().is_none() {
        config.application_name(APPLICATION_NAME);
    }
    Ok(config)
}
