// ABOUTME: Statement text for publications, slots and replication grants
// ABOUTME: Names are validated at config load, so they are spliced as written

use crate::config::{PublicationScope, ReplicationProfile};

/// Logical decoding plugin used for every slot this tool creates.
pub const OUTPUT_PLUGIN: &str = "pgoutput";

pub fn create_publication(profile: &ReplicationProfile) -> String {
    let target = match &profile.scope {
        PublicationScope::AllTables => "ALL TABLES".to_string(),
        PublicationScope::Schema(schema) => format!("TABLES IN SCHEMA {}", schema),
        PublicationScope::Tables(tables) => format!("TABLE {}", tables.join(", ")),
    };
    format!(
        "CREATE PUBLICATION {} FOR {} WITH (publish = '{}')",
        profile.publication_name,
        target,
        profile.publish_param()
    )
}

pub fn add_publication_table(publication: &str, table: &str) -> String {
    format!("ALTER PUBLICATION {} ADD TABLE {}", publication, table)
}

pub fn drop_publication(publication: &str) -> String {
    format!("DROP PUBLICATION {}", publication)
}

/// Parameterized slot creation; `$1` is the slot name.
pub const CREATE_SLOT: &str =
    "SELECT slot_name::text, lsn::text FROM pg_create_logical_replication_slot($1, 'pgoutput')";

/// Parameterized slot drop; `$1` is the slot name.
pub const DROP_SLOT: &str = "SELECT pg_drop_replication_slot($1)";

/// Slot creation with the name inlined, for display only.
pub fn create_slot_literal(slot: &str) -> String {
    format!(
        "SELECT * FROM pg_create_logical_replication_slot('{}', '{}')",
        slot, OUTPUT_PLUGIN
    )
}

/// Every statement `create_profile` would issue against an empty database.
pub fn create_statements(profile: &ReplicationProfile) -> Vec<String> {
    vec![
        create_publication(profile),
        create_slot_literal(&profile.slot_name),
    ]
}

/// Grants a replication role read access to one schema, including tables
/// created later.
pub fn grant_schema_privileges(schema: &str, role: &str) -> Vec<String> {
    vec![
        format!("GRANT USAGE ON SCHEMA {} TO {}", schema, role),
        format!(
            "GRANT SELECT, REFERENCES ON ALL TABLES IN SCHEMA {} TO {}",
            schema, role
        ),
        format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA {} GRANT SELECT, REFERENCES ON TABLES TO {}",
            schema, role
        ),
    ]
}
