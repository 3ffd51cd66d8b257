// ABOUTME: Typed errors for loading and validating the replication config
// ABOUTME: Every variant names the section, profile and field at fault

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(String),
    Structure(String),
    MissingField {
        section: &'static str,
        profile: String,
        field: &'static str,
    },
    InvalidField {
        section: &'static str,
        profile: String,
        field: &'static str,
        message: String,
    },
    UnknownField {
        section: &'static str,
        profile: String,
        field: String,
    },
    UnknownConnection {
        profile: String,
        connection: String,
    },
    Duplicate {
        what: &'static str,
        name: String,
    },
}

impl ConfigError {
    /// The field the error is about, if it concerns a single field.
    pub fn field(&self) -> Option<&str> {
        match self {
            ConfigError::MissingField { field, .. } | ConfigError::InvalidField { field, .. } => {
                Some(*field)
            }
            ConfigError::UnknownField { field, .. } => Some(field.as_str()),
            ConfigError::UnknownConnection { .. } => Some("connection_profile"),
            _ => None,
        }
    }

    /// The profile the error is about, if any.
    pub fn profile(&self) -> Option<&str> {
        match self {
            ConfigError::MissingField { profile, .. }
            | ConfigError::InvalidField { profile, .. }
            | ConfigError::UnknownField { profile, .. }
            | ConfigError::UnknownConnection { profile, .. } => Some(profile.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Cannot read config file {}: {}", path.display(), source)
            }
            ConfigError::Parse(msg) => write!(f, "Error parsing YAML: {}", msg),
            ConfigError::Structure(msg) => write!(f, "Invalid config structure: {}", msg),
            ConfigError::MissingField {
                section,
                profile,
                field,
            } => write!(
                f,
                "Missing field '{}' in {} profile '{}'",
                field, section, profile
            ),
            ConfigError::InvalidField {
                section,
                profile,
                field,
                message,
            } => write!(
                f,
                "Invalid field '{}' in {} profile '{}': {}",
                field, section, profile, message
            ),
            ConfigError::UnknownField {
                section,
                profile,
                field,
            } => write!(
                f,
                "Unknown field '{}' in {} profile '{}'",
                field, section, profile
            ),
            ConfigError::UnknownConnection {
                profile,
                connection,
            } => write!(
                f,
                "Replication profile '{}' references unknown connection_profile '{}'",
                profile, connection
            ),
            ConfigError::Duplicate { what, name } => write!(f, "Duplicate {} found: {}", what, name),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}
