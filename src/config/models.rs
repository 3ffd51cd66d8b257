// ABOUTME: Data structures for connection and replication profiles
// ABOUTME: Raw shapes mirror the YAML document, typed shapes are validated

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::utils;

/// A connection profile entry exactly as it appears in the YAML document.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawConnectionProfile {
    pub name: Option<String>,
    pub kind: Option<String>,
    pub credential_id: Option<String>,
}

impl RawConnectionProfile {
    pub const FIELDS: &'static [&'static str] = &["name", "type", "credential_id"];
}

/// A replication profile entry exactly as it appears in the YAML document.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawReplicationProfile {
    pub replication_profile_name: Option<String>,
    pub connection_profile: Option<String>,
    pub publication_name: Option<String>,
    pub slot_name: Option<String>,
    pub publication_ops: Option<Vec<String>>,
    pub publication_type: Option<String>,
    pub publication_schema: Option<String>,
    pub publication_tables: Option<Vec<String>>,
}

impl RawReplicationProfile {
    pub const FIELDS: &'static [&'static str] = &[
        "replication_profile_name",
        "connection_profile",
        "publication_name",
        "slot_name",
        "publication_ops",
        "publication_type",
        "publication_schema",
        "publication_tables",
    ];
}

/// Where the credentials of a connection profile come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// `ENV_SECRETS`: an environment variable holding a PostgreSQL URL
    Env,
    /// `AWS_SECRETS`: a Secrets Manager entry holding a JSON credential
    AwsSecretsManager,
}

impl FromStr for SecretSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ENV_SECRETS" => Ok(SecretSource::Env),
            "AWS_SECRETS" => Ok(SecretSource::AwsSecretsManager),
            other => Err(format!(
                "unsupported type '{}', expected one of ENV_SECRETS, AWS_SECRETS",
                other
            )),
        }
    }
}

impl fmt::Display for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretSource::Env => write!(f, "ENV_SECRETS"),
            SecretSource::AwsSecretsManager => write!(f, "AWS_SECRETS"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    pub name: String,
    pub source: SecretSource,
    pub credential_id: String,
}

/// Row operation a publication can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            _ => Err(format!(
                "unsupported operation '{}', expected one of INSERT, UPDATE, DELETE",
                s
            )),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "insert"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// The `publication_type` keyword, before its payload is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    All,
    Schema,
    Filtered,
}

impl FromStr for ScopeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(ScopeKind::All),
            "schema" => Ok(ScopeKind::Schema),
            "filtered" => Ok(ScopeKind::Filtered),
            other => Err(format!(
                "unsupported publication_type '{}', expected one of all, schema, filtered",
                other
            )),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::All => write!(f, "all"),
            ScopeKind::Schema => write!(f, "schema"),
            ScopeKind::Filtered => write!(f, "filtered"),
        }
    }
}

/// Which tables a publication covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationScope {
    AllTables,
    Schema(String),
    Tables(Vec<String>),
}

impl PublicationScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            PublicationScope::AllTables => ScopeKind::All,
            PublicationScope::Schema(_) => ScopeKind::Schema,
            PublicationScope::Tables(_) => ScopeKind::Filtered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationProfile {
    pub name: String,
    pub connection: String,
    pub publication_name: String,
    pub slot_name: String,
    pub operations: BTreeSet<Operation>,
    pub scope: PublicationScope,
}

impl ReplicationProfile {
    /// The value of the `publish` publication parameter, e.g. `insert, update`.
    pub fn publish_param(&self) -> String {
        self.operations
            .iter()
            .map(Operation::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Schemas this profile reads from, as written in the config.
    ///
    /// Empty for `all` publications.
    pub fn schemas(&self) -> BTreeSet<String> {
        match &self.scope {
            PublicationScope::AllTables => BTreeSet::new(),
            PublicationScope::Schema(schema) => BTreeSet::from([schema.clone()]),
            PublicationScope::Tables(tables) => tables
                .iter()
                .map(|t| utils::table_schema(t).to_string())
                .collect(),
        }
    }

    pub fn tables(&self) -> &[String] {
        match &self.scope {
            PublicationScope::Tables(tables) => tables,
            _ => &[],
        }
    }
}
