// ABOUTME: Replication config loading and lookup
// ABOUTME: A Config only exists once the whole document has been validated

pub mod models;
mod validate;

pub use models::{
    ConnectionProfile, Operation, PublicationScope, ReplicationProfile, ScopeKind, SecretSource,
};
pub use validate::{CONNECTION_SECTION, REPLICATION_SECTION};

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::ConfigError;

/// Validated connection and replication profiles, in document order.
#[derive(Debug, Clone)]
pub struct Config {
    connections: Vec<ConnectionProfile>,
    replications: Vec<ReplicationProfile>,
}

impl Config {
    /// Reads, parses and validates the YAML config at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate::validate_document(doc)
    }

    pub fn connections(&self) -> &[ConnectionProfile] {
        &self.connections
    }

    pub fn replication_profiles(&self) -> &[ReplicationProfile] {
        &self.replications
    }

    pub fn connection(&self, name: &str) -> Option<&ConnectionProfile> {
        self.connections.iter().find(|c| c.name == name)
    }

    pub fn replication_profile(&self, name: &str) -> Option<&ReplicationProfile> {
        self.replications.iter().find(|p| p.name == name)
    }

    pub fn replication_profile_by_publication(&self, publication: &str) -> Option<&ReplicationProfile> {
        self.replications
            .iter()
            .find(|p| p.publication_name == publication)
    }

    /// Distinct schemas read by the replication profiles, optionally limited
    /// to the profiles of one connection.
    pub fn replication_schemas(&self, connection: Option<&str>) -> BTreeSet<String> {
        self.replications
            .iter()
            .filter(|p| connection.map_or(true, |c| p.connection == c))
            .flat_map(|p| p.schemas())
            .collect()
    }
}
