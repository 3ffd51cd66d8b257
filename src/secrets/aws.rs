// ABOUTME: AWS_SECRETS connection profiles, fetched from Secrets Manager
// ABOUTME: The secret string must be a JSON object with database credentials

use anyhow::{anyhow, Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::error::DisplayErrorContext;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueOutput;
use aws_sdk_secretsmanager::Client;
use tracing::debug;

use super::DbCredential;

/// Secrets Manager client using the default AWS credential and region chain
/// (environment, shared config files, instance or task role).
pub struct AwsSecretsClient {
    client: Client,
}

impl AwsSecretsClient {
    pub async fn new() -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self {
            client: Client::new(&sdk_config),
        }
    }

    pub async fn get_secret_string(&self, secret_id: &str) -> Result<String> {
        debug!("Fetching secret {} from Secrets Manager", secret_id);

        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to fetch secret '{}': {}",
                    secret_id,
                    DisplayErrorContext(&e)
                )
            })?;

        secret_string(secret_id, &output).map(str::to_string)
    }

    pub async fn get_credential(&self, secret_id: &str) -> Result<DbCredential> {
        let secret = self.get_secret_string(secret_id).await?;
        parse_secret(secret_id, &secret)
    }
}

/// Binary secrets carry no string and cannot hold credentials.
fn secret_string<'a>(secret_id: &str, output: &'a GetSecretValueOutput) -> Result<&'a str> {
    match output.secret_string() {
        Some(secret) if !secret.trim().is_empty() => Ok(secret),
        _ => Err(anyhow!("Secret '{}' has no SecretString", secret_id)),
    }
}

/// Parses a Secrets Manager secret string into credentials.
pub fn parse_secret(secret_id: &str, secret: &str) -> Result<DbCredential> {
    serde_json::from_str(secret).with_context(|| {
        format!(
            "Secret '{}' must be a JSON object with database, username, password, host and optional port",
            secret_id
        )
    })
}
