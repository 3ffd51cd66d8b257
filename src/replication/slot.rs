// ABOUTME: Logical replication slot inspection, creation and removal
// ABOUTME: Uses the SQL slot functions over a regular connection

use anyhow::{Context, Result};
use tokio_postgres::error::SqlState;
use tokio_postgres::Client;
use tracing::{debug, info};

use super::{ddl, has_sqlstate};

/// A slot as recorded in `pg_replication_slots`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub name: String,
    pub plugin: Option<String>,
    pub slot_type: String,
    pub active: bool,
    pub database: Option<String>,
}

impl SlotInfo {
    pub fn is_logical(&self) -> bool {
        self.slot_type == "logical"
    }
}

/// What the server returns for a freshly created slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSlot {
    pub name: String,
    pub consistent_point: String,
}

pub async fn get_slot(client: &Client, name: &str) -> Result<Option<SlotInfo>> {
    let row = client
        .query_opt(
            "SELECT slot_name::text, plugin::text, slot_type, active, database::text
             FROM pg_replication_slots
             WHERE slot_name = $1",
            &[&name],
        )
        .await
        .with_context(|| format!("Failed to look up replication slot {}", name))?;

    Ok(row.map(|row| SlotInfo {
        name: row.get(0),
        plugin: row.get(1),
        slot_type: row.get(2),
        active: row.get(3),
        database: row.get(4),
    }))
}

/// Creates a logical slot with the fixed output plugin. Returns `None` if a
/// slot with this name already exists.
pub async fn create_slot(client: &Client, name: &str) -> Result<Option<CreatedSlot>> {
    debug!("{} [$1 = {}]", ddl::CREATE_SLOT, name);

    match client.query_one(ddl::CREATE_SLOT, &[&name]).await {
        Ok(row) => {
            let created = CreatedSlot {
                name: row.get(0),
                consistent_point: row.get(1),
            };
            info!(
                "Created replication slot {} (plugin {}, consistent point {})",
                created.name,
                ddl::OUTPUT_PLUGIN,
                created.consistent_point
            );
            Ok(Some(created))
        }
        Err(e) if has_sqlstate(&e, &SqlState::DUPLICATE_OBJECT) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Failed to create replication slot {}", name)),
    }
}

/// Drops a slot. Returns `false` if it did not exist. Dropping a slot that a
/// consumer is still attached to fails.
pub async fn drop_slot(client: &Client, name: &str) -> Result<bool> {
    debug!("{} [$1 = {}]", ddl::DROP_SLOT, name);

    match client.execute(ddl::DROP_SLOT, &[&name]).await {
        Ok(_) => Ok(true),
        Err(e) if has_sqlstate(&e, &SqlState::UNDEFINED_OBJECT) => Ok(false),
        Err(e) if has_sqlstate(&e, &SqlState::OBJECT_IN_USE) => Err(e).with_context(|| {
            format!(
                "Replication slot {} is in use; stop its consumer before dropping it",
                name
            )
        }),
        Err(e) => Err(e).with_context(|| format!("Failed to drop replication slot {}", name)),
    }
}
