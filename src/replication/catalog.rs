// ABOUTME: The database operations the profile executor depends on
// ABOUTME: PgCatalog backs them with a tokio-postgres client

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_postgres::Client;
use tracing::debug;

use super::{publication, slot, CreatedSlot, PublicationInfo, SlotInfo};
use crate::config::ReplicationProfile;

/// Publication and slot operations against one database.
///
/// Creation returns `false`/`None` when the object already exists and drops
/// return `false` when it is already gone, so callers can stay idempotent
/// even when another session races them.
#[async_trait]
pub trait ReplicationCatalog: Send + Sync {
    async fn publication(&self, name: &str) -> Result<Option<PublicationInfo>>;

    async fn create_publication(&self, profile: &ReplicationProfile) -> Result<bool>;

    async fn add_publication_table(&self, publication: &str, table: &str) -> Result<bool>;

    async fn drop_publication(&self, name: &str) -> Result<bool>;

    async fn slot(&self, name: &str) -> Result<Option<SlotInfo>>;

    async fn create_slot(&self, name: &str) -> Result<Option<CreatedSlot>>;

    async fn drop_slot(&self, name: &str) -> Result<bool>;

    /// Runs a statement that returns no rows.
    async fn execute(&self, statement: &str) -> Result<()>;
}

pub struct PgCatalog {
    client: Client,
}

impl PgCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ReplicationCatalog for PgCatalog {
    async fn publication(&self, name: &str) -> Result<Option<PublicationInfo>> {
        publication::get_publication(&self.client, name).await
    }

    async fn create_publication(&self, profile: &ReplicationProfile) -> Result<bool> {
        publication::create_publication(&self.client, profile).await
    }

    async fn add_publication_table(&self, publication: &str, table: &str) -> Result<bool> {
        publication::add_table(&self.client, publication, table).await
    }

    async fn drop_publication(&self, name: &str) -> Result<bool> {
        publication::drop_publication(&self.client, name).await
    }

    async fn slot(&self, name: &str) -> Result<Option<SlotInfo>> {
        slot::get_slot(&self.client, name).await
    }

    async fn create_slot(&self, name: &str) -> Result<Option<CreatedSlot>> {
        slot::create_slot(&self.client, name).await
    }

    async fn drop_slot(&self, name: &str) -> Result<bool> {
        slot::drop_slot(&self.client, name).await
    }

    async fn execute(&self, statement: &str) -> Result<()> {
        debug!("{}", statement);
        self.client
            .batch_execute(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", statement))
    }
}
