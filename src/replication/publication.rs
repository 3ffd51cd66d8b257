// ABOUTME: Publication inspection and DDL against a live PostgreSQL client
// ABOUTME: Duplicate and missing objects are reported as booleans, not errors

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use tokio_postgres::error::SqlState;
use tokio_postgres::Client;
use tracing::{debug, info};

use super::{ddl, has_sqlstate};
use crate::config::{Operation, ReplicationProfile};
use crate::utils;

/// A publication as recorded in `pg_publication` and `pg_publication_tables`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationInfo {
    pub name: String,
    pub all_tables: bool,
    pub operations: BTreeSet<Operation>,
    pub truncate: bool,
    /// Published tables as `schema.table`, sorted.
    pub tables: Vec<String>,
}

impl PublicationInfo {
    /// Tables from `wanted` that this publication does not cover yet.
    pub fn missing_tables<'a>(&self, wanted: &'a [String]) -> Vec<&'a str> {
        if self.all_tables {
            return Vec::new();
        }
        wanted
            .iter()
            .filter(|t| !self.tables.contains(&utils::normalize_table_name(t)))
            .map(String::as_str)
            .collect()
    }

    /// Published tables that `wanted` does not list.
    pub fn extra_tables(&self, wanted: &[String]) -> Vec<&str> {
        let wanted: HashSet<String> = wanted
            .iter()
            .map(|t| utils::normalize_table_name(t))
            .collect();
        self.tables
            .iter()
            .filter(|t| !wanted.contains(*t))
            .map(String::as_str)
            .collect()
    }

    /// Published tables that live outside `schema`.
    pub fn tables_outside_schema(&self, schema: &str) -> Vec<&str> {
        let schema = utils::normalize_identifier(schema);
        self.tables
            .iter()
            .filter(|t| utils::normalize_identifier(utils::table_schema(t)) != schema)
            .map(String::as_str)
            .collect()
    }
}

pub async fn get_publication(client: &Client, name: &str) -> Result<Option<PublicationInfo>> {
    let key = utils::normalize_identifier(name);

    let row = client
        .query_opt(
            "SELECT puballtables, pubinsert, pubupdate, pubdelete, pubtruncate
             FROM pg_publication
             WHERE pubname = $1",
            &[&key],
        )
        .await
        .with_context(|| format!("Failed to look up publication {}", name))?;

    let Some(row) = row else {
        return Ok(None);
    };

    let mut operations = BTreeSet::new();
    for (idx, op) in [(1usize, Operation::Insert), (2, Operation::Update), (3, Operation::Delete)] {
        if row.get::<_, bool>(idx) {
            operations.insert(op);
        }
    }

    let tables = client
        .query(
            "SELECT schemaname::text || '.' || tablename::text
             FROM pg_publication_tables
             WHERE pubname = $1
             ORDER BY 1",
            &[&key],
        )
        .await
        .with_context(|| format!("Failed to list tables of publication {}", name))?
        .iter()
        .map(|r| r.get::<_, String>(0))
        .collect();

    Ok(Some(PublicationInfo {
        name: key,
        all_tables: row.get(0),
        operations,
        truncate: row.get(4),
        tables,
    }))
}

/// Creates the publication for `profile`. Returns `false` if it already
/// existed.
pub async fn create_publication(client: &Client, profile: &ReplicationProfile) -> Result<bool> {
    let statement = ddl::create_publication(profile);
    debug!("{}", statement);

    match client.batch_execute(&statement).await {
        Ok(()) => {
            info!(
                "Created publication {} ({}, publish = '{}')",
                profile.publication_name,
                profile.scope.kind(),
                profile.publish_param()
            );
            Ok(true)
        }
        Err(e) if has_sqlstate(&e, &SqlState::DUPLICATE_OBJECT) => Ok(false),
        Err(e) => Err(e)
            .with_context(|| format!("Failed to create publication {}", profile.publication_name)),
    }
}

/// Adds one table to an existing publication. Returns `false` if the table
/// was already a member.
pub async fn add_table(client: &Client, publication: &str, table: &str) -> Result<bool> {
    let statement = ddl::add_publication_table(publication, table);
    debug!("{}", statement);

    match client.batch_execute(&statement).await {
        Ok(()) => Ok(true),
        Err(e) if has_sqlstate(&e, &SqlState::DUPLICATE_OBJECT) => Ok(false),
        Err(e) => Err(e)
            .with_context(|| format!("Failed to add {} to publication {}", table, publication)),
    }
}

/// Drops a publication. Returns `false` if it did not exist.
pub async fn drop_publication(client: &Client, name: &str) -> Result<bool> {
    let statement = ddl::drop_publication(name);
    debug!("{}", statement);

    match client.batch_execute(&statement).await {
        Ok(()) => Ok(true),
        Err(e) if has_sqlstate(&e, &SqlState::UNDEFINED_OBJECT) => Ok(false),
        Err(e) => Err(e).with_context(|| format!("Failed to drop publication {}", name)),
    }
}
