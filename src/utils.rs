// ABOUTME: SQL identifier checks used before any name is spliced into DDL
// ABOUTME: Also normalizes qualified table names for catalog comparisons

use anyhow::{anyhow, Result};

/// PostgreSQL truncates identifiers longer than NAMEDATALEN - 1 bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

pub const DEFAULT_SCHEMA: &str = "public";

/// Splits `schema.table` on dots that are not inside double quotes.
///
/// Returns `None` when the quotes are unbalanced.
pub fn split_qualified(name: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;

    for (i, c) in name.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => {
                parts.push(&name[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    if in_quotes {
        return None;
    }
    parts.push(&name[start..]);
    Some(parts)
}

fn is_valid_part(part: &str) -> bool {
    if let Some(inner) = part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        return !inner.is_empty()
            && inner.len() <= MAX_IDENTIFIER_LEN
            && !inner.contains('"')
            && !inner.chars().any(char::is_control);
    }

    let mut chars = part.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    part.len() <= MAX_IDENTIFIER_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// Validates a single, unqualified SQL identifier such as a publication,
/// schema or role name.
///
/// Accepts plain identifiers (`orders_pub`) and double-quoted identifiers
/// (`"Orders Pub"`). Anything that could terminate the statement or open a
/// comment is rejected.
pub fn validate_sql_identifier(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(anyhow!("SQL identifier cannot be empty"));
    }
    if !is_valid_part(name) {
        return Err(anyhow!(
            "Invalid SQL identifier '{}': expected letters, digits, '_' or '$' \
             starting with a letter or '_', or a double-quoted name",
            name
        ));
    }
    Ok(name)
}

/// Validates a table reference, optionally schema-qualified.
pub fn validate_table_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(anyhow!("Table name cannot be empty"));
    }
    let parts = split_qualified(name)
        .ok_or_else(|| anyhow!("Invalid table name '{}': unbalanced quotes", name))?;
    if parts.len() > 2 {
        return Err(anyhow!(
            "Invalid table name '{}': expected 'table' or 'schema.table'",
            name
        ));
    }
    for part in parts {
        validate_sql_identifier(part)
            .map_err(|e| anyhow!("Invalid table name '{}': {}", name, e))?;
    }
    Ok(name)
}

/// Validates a replication slot name.
///
/// PostgreSQL only allows lower case letters, numbers and underscores here,
/// with no quoting.
pub fn validate_slot_name(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(anyhow!("Replication slot name cannot be empty"));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(anyhow!(
            "Replication slot name '{}' is longer than {} bytes",
            name,
            MAX_IDENTIFIER_LEN
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(anyhow!(
            "Invalid replication slot name '{}': only lower case letters, numbers and '_' are allowed",
            name
        ));
    }
    Ok(name)
}

/// Folds an identifier the way the server does: quoted names keep their
/// case, bare names are lower-cased.
pub fn normalize_identifier(part: &str) -> String {
    match part.strip_prefix('"').and_then(|p| p.strip_suffix('"')) {
        Some(inner) => inner.to_string(),
        None => part.to_lowercase(),
    }
}

/// Returns the schema a table reference lives in, as written.
pub fn table_schema(name: &str) -> &str {
    match split_qualified(name) {
        Some(parts) if parts.len() == 2 => parts[0],
        _ => DEFAULT_SCHEMA,
    }
}

/// Normalizes a table reference to `schema.table` as reported by
/// `pg_publication_tables`.
pub fn normalize_table_name(name: &str) -> String {
    match split_qualified(name).as_deref() {
        Some([schema, table]) => format!(
            "{}.{}",
            normalize_identifier(schema),
            normalize_identifier(table)
        ),
        Some([table]) => format!("{}.{}", DEFAULT_SCHEMA, normalize_identifier(table)),
        _ => name.to_string(),
    }
}
