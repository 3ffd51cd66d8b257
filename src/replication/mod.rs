// ABOUTME: Replication utilities module
// ABOUTME: Handles PostgreSQL publications and logical replication slots

pub mod catalog;
pub mod ddl;
pub mod publication;
pub mod slot;

pub use catalog::{PgCatalog, ReplicationCatalog};
pub use publication::{create_publication, drop_publication, get_publication, PublicationInfo};
pub use slot::{create_slot, drop_slot, get_slot, CreatedSlot, SlotInfo};

use tokio_postgres::error::SqlState;

pub(crate) fn has_sqlstate(err: &tokio_postgres::Error, state: &SqlState) -> bool {
    err.code() == Some(state)
}
