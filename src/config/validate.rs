// ABOUTME: Turns a parsed YAML document into validated profiles
// ABOUTME: Pure checks; the only side effect is a warning for shared tables

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::warn;

use super::models::{
    ConnectionProfile, Operation, PublicationScope, RawConnectionProfile, RawReplicationProfile,
    ReplicationProfile, ScopeKind, SecretSource,
};
use super::Config;
use crate::error::ConfigError;
use crate::utils;

pub const CONNECTION_SECTION: &str = "CONNECTION_PROFILES";
pub const REPLICATION_SECTION: &str = "REPLICATION_PROFILES";

pub(crate) fn validate_document(doc: Value) -> Result<Config, ConfigError> {
    let root = match doc {
        Value::Mapping(root) => root,
        _ => {
            return Err(ConfigError::Structure(
                "expected a mapping at the document root".to_string(),
            ))
        }
    };

    let raw_connections = section(&root, CONNECTION_SECTION)?
        .iter()
        .enumerate()
        .map(|(idx, entry)| raw_connection(idx, entry))
        .collect::<Result<Vec<_>, _>>()?;
    let raw_replications = section(&root, REPLICATION_SECTION)?
        .iter()
        .enumerate()
        .map(|(idx, entry)| raw_replication(idx, entry))
        .collect::<Result<Vec<_>, _>>()?;

    let mut connections = Vec::with_capacity(raw_connections.len());
    for (idx, raw) in raw_connections.into_iter().enumerate() {
        let connection = connection_profile(idx, raw)?;
        if connections
            .iter()
            .any(|c: &ConnectionProfile| c.name == connection.name)
        {
            return Err(ConfigError::Duplicate {
                what: "connection profile name",
                name: connection.name,
            });
        }
        connections.push(connection);
    }

    let mut replications: Vec<ReplicationProfile> = Vec::with_capacity(raw_replications.len());
    // publication and slot names only need to be unique per target database
    let mut publication_names = HashSet::new();
    let mut slot_names = HashSet::new();

    for (idx, raw) in raw_replications.into_iter().enumerate() {
        let profile = replication_profile(idx, raw)?;

        if !connections.iter().any(|c| c.name == profile.connection) {
            return Err(ConfigError::UnknownConnection {
                profile: profile.name,
                connection: profile.connection,
            });
        }
        if replications.iter().any(|p| p.name == profile.name) {
            return Err(ConfigError::Duplicate {
                what: "replication profile name",
                name: profile.name,
            });
        }
        if !publication_names.insert((
            profile.connection.clone(),
            utils::normalize_identifier(&profile.publication_name),
        )) {
            return Err(ConfigError::Duplicate {
                what: "publication name",
                name: profile.publication_name,
            });
        }
        if !slot_names.insert((profile.connection.clone(), profile.slot_name.clone())) {
            return Err(ConfigError::Duplicate {
                what: "replication slot",
                name: profile.slot_name,
            });
        }

        replications.push(profile);
    }

    for shared in shared_tables(&replications) {
        warn!(
            "Table '{}.{}' appears in replication profiles '{}' and '{}'",
            shared.connection, shared.table, shared.first, shared.second
        );
    }

    Ok(Config {
        connections,
        replications,
    })
}

/// A table listed by two replication profiles on the same connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SharedTable {
    pub connection: String,
    pub table: String,
    pub first: String,
    pub second: String,
}

/// Tables that more than one profile publishes from the same database. Not
/// an error, both publications simply carry the table.
pub(crate) fn shared_tables(profiles: &[ReplicationProfile]) -> Vec<SharedTable> {
    let mut owners: HashMap<(String, String), &str> = HashMap::new();
    let mut shared = Vec::new();

    for profile in profiles {
        for table in profile.tables() {
            let key = (profile.connection.clone(), utils::normalize_table_name(table));
            match owners.get(&key) {
                Some(first) => shared.push(SharedTable {
                    connection: profile.connection.clone(),
                    table: table.clone(),
                    first: first.to_string(),
                    second: profile.name.clone(),
                }),
                None => {
                    owners.insert(key, profile.name.as_str());
                }
            }
        }
    }
    shared
}

fn section<'a>(root: &'a Mapping, name: &'static str) -> Result<&'a [Value], ConfigError> {
    match root.get(name) {
        Some(Value::Sequence(entries)) => Ok(entries.as_slice()),
        _ => Err(ConfigError::Structure(format!(
            "missing or invalid {} section",
            name
        ))),
    }
}

/// Checks that `entry` is a mapping with only known keys and returns it with
/// the label used to refer to it in errors.
fn entry_fields<'a>(
    entry: &'a Value,
    idx: usize,
    section: &'static str,
    name_key: &str,
    known: &[&str],
) -> Result<(&'a Mapping, String), ConfigError> {
    let Value::Mapping(fields) = entry else {
        return Err(ConfigError::Structure(format!(
            "{} entry #{} is not a mapping",
            section,
            idx + 1
        )));
    };

    let name = fields.get(name_key).and_then(Value::as_str).map(str::to_string);
    let label = profile_label(name.as_ref(), idx);

    for key in fields.keys() {
        let key = match key {
            Value::String(key) => key.clone(),
            other => serde_yaml::to_string(other)
                .map(|k| k.trim().to_string())
                .unwrap_or_default(),
        };
        if !known.contains(&key.as_str()) {
            return Err(ConfigError::UnknownField {
                section,
                profile: label,
                field: key,
            });
        }
    }
    Ok((fields, label))
}

/// Decodes one field; a null value counts as absent.
fn field<T: DeserializeOwned>(
    fields: &Mapping,
    section: &'static str,
    label: &str,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match fields.get(name) {
        None => Ok(None),
        Some(value) => serde_yaml::from_value::<Option<T>>(value.clone())
            .map_err(|e| invalid(section, label, name, e)),
    }
}

fn raw_connection(idx: usize, entry: &Value) -> Result<RawConnectionProfile, ConfigError> {
    let section = CONNECTION_SECTION;
    let (fields, label) =
        entry_fields(entry, idx, section, "name", RawConnectionProfile::FIELDS)?;

    Ok(RawConnectionProfile {
        name: field(fields, section, &label, "name")?,
        kind: field(fields, section, &label, "type")?,
        credential_id: field(fields, section, &label, "credential_id")?,
    })
}

fn raw_replication(idx: usize, entry: &Value) -> Result<RawReplicationProfile, ConfigError> {
    let section = REPLICATION_SECTION;
    let (fields, label) = entry_fields(
        entry,
        idx,
        section,
        "replication_profile_name",
        RawReplicationProfile::FIELDS,
    )?;

    Ok(RawReplicationProfile {
        replication_profile_name: field(fields, section, &label, "replication_profile_name")?,
        connection_profile: field(fields, section, &label, "connection_profile")?,
        publication_name: field(fields, section, &label, "publication_name")?,
        slot_name: field(fields, section, &label, "slot_name")?,
        publication_ops: field(fields, section, &label, "publication_ops")?,
        publication_type: field(fields, section, &label, "publication_type")?,
        publication_schema: field(fields, section, &label, "publication_schema")?,
        publication_tables: field(fields, section, &label, "publication_tables")?,
    })
}

/// Profiles without a usable name are referred to by their 1-based position.
fn profile_label(name: Option<&String>, idx: usize) -> String {
    match name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => format!("#{}", idx + 1),
    }
}

fn required(
    value: Option<String>,
    section: &'static str,
    profile: &str,
    field: &'static str,
) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        Some(_) => Err(ConfigError::InvalidField {
            section,
            profile: profile.to_string(),
            field,
            message: "must not be empty".to_string(),
        }),
        None => Err(ConfigError::MissingField {
            section,
            profile: profile.to_string(),
            field,
        }),
    }
}

fn invalid(section: &'static str, profile: &str, field: &'static str, message: impl ToString) -> ConfigError {
    ConfigError::InvalidField {
        section,
        profile: profile.to_string(),
        field,
        message: message.to_string(),
    }
}

fn connection_profile(idx: usize, raw: RawConnectionProfile) -> Result<ConnectionProfile, ConfigError> {
    let label = profile_label(raw.name.as_ref(), idx);
    let section = CONNECTION_SECTION;

    let name = required(raw.name, section, &label, "name")?;
    let kind = required(raw.kind, section, &label, "type")?;
    let credential_id = required(raw.credential_id, section, &label, "credential_id")?;

    let source: SecretSource = kind
        .parse()
        .map_err(|e: String| invalid(section, &label, "type", e))?;

    Ok(ConnectionProfile {
        name,
        source,
        credential_id,
    })
}

fn replication_profile(
    idx: usize,
    raw: RawReplicationProfile,
) -> Result<ReplicationProfile, ConfigError> {
    let label = profile_label(raw.replication_profile_name.as_ref(), idx);
    let section = REPLICATION_SECTION;

    let name = required(raw.replication_profile_name, section, &label, "replication_profile_name")?;
    let connection = required(raw.connection_profile, section, &label, "connection_profile")?;
    let publication_name = required(raw.publication_name, section, &label, "publication_name")?;
    let slot_name = required(raw.slot_name, section, &label, "slot_name")?;
    let ops = raw.publication_ops.ok_or_else(|| ConfigError::MissingField {
        section,
        profile: label.clone(),
        field: "publication_ops",
    })?;
    let kind = required(raw.publication_type, section, &label, "publication_type")?;

    let kind: ScopeKind = kind
        .parse()
        .map_err(|e: String| invalid(section, &label, "publication_type", e))?;

    let operations = ops
        .iter()
        .map(|op| op.trim().parse::<Operation>())
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(|e| invalid(section, &label, "publication_ops", e))?;
    if operations.is_empty() {
        return Err(invalid(
            section,
            &label,
            "publication_ops",
            "at least one of INSERT, UPDATE, DELETE is required",
        ));
    }

    let scope = publication_scope(kind, raw.publication_schema, raw.publication_tables, &label)?;

    utils::validate_sql_identifier(&publication_name)
        .map_err(|e| invalid(section, &label, "publication_name", e))?;
    utils::validate_slot_name(&slot_name).map_err(|e| invalid(section, &label, "slot_name", e))?;

    Ok(ReplicationProfile {
        name,
        connection,
        publication_name,
        slot_name,
        operations,
        scope,
    })
}

fn publication_scope(
    kind: ScopeKind,
    schema: Option<String>,
    tables: Option<Vec<String>>,
    label: &str,
) -> Result<PublicationScope, ConfigError> {
    let section = REPLICATION_SECTION;

    match kind {
        ScopeKind::All => {
            if schema.is_some() {
                return Err(invalid(
                    section,
                    label,
                    "publication_schema",
                    "not allowed when publication_type is 'all'",
                ));
            }
            if tables.is_some() {
                return Err(invalid(
                    section,
                    label,
                    "publication_tables",
                    "not allowed when publication_type is 'all'",
                ));
            }
            Ok(PublicationScope::AllTables)
        }
        ScopeKind::Schema => {
            if tables.is_some() {
                return Err(invalid(
                    section,
                    label,
                    "publication_tables",
                    "cannot be combined with publication_type 'schema'; use publication_schema",
                ));
            }
            let schema = required(schema, section, label, "publication_schema")?;
            utils::validate_sql_identifier(&schema)
                .map_err(|e| invalid(section, label, "publication_schema", e))?;
            Ok(PublicationScope::Schema(schema))
        }
        ScopeKind::Filtered => {
            if schema.is_some() {
                return Err(invalid(
                    section,
                    label,
                    "publication_schema",
                    "cannot be combined with publication_type 'filtered'; use publication_tables",
                ));
            }
            let tables = tables.ok_or_else(|| ConfigError::MissingField {
                section,
                profile: label.to_string(),
                field: "publication_tables",
            })?;
            if tables.is_empty() {
                return Err(invalid(
                    section,
                    label,
                    "publication_tables",
                    "filtered publications need at least one table",
                ));
            }

            let mut seen = HashSet::new();
            let mut unique = Vec::with_capacity(tables.len());
            for table in tables {
                let table = table.trim().to_string();
                utils::validate_table_name(&table)
                    .map_err(|e| invalid(section, label, "publication_tables", e))?;
                if seen.insert(utils::normalize_table_name(&table)) {
                    unique.push(table);
                }
            }
            Ok(PublicationScope::Tables(unique))
        }
    }
}
