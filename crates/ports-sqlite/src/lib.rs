//! Embedded SQLite store holding one run's port snapshot.
//!
//! The store is rebuilt from scratch on every run ([`Db::open_fresh`]); each
//! write phase commits exactly once.

mod batch;
mod insert;
mod models;
mod open;
mod query;
mod reconcile;
mod schema;

pub use batch::{ContainerPortWriter, WriteStats};
pub use insert::InsertOutcome;
pub use models::*;
pub use open::{remove_store_files, Db};
pub use reconcile::ReconcileOutcome;
pub use schema::{NOT_APPLICABLE, TABLES};

use portdump_core::PortdumpError;
use rusqlite::ErrorCode;

/// Classify a SQLite failure: constraint violations are recoverable, the rest are not.
pub(crate) fn sql_error(table: &'static str, err: rusqlite::Error) -> PortdumpError {
    match &err {
        rusqlite::Error::SqliteFailure(code, msg) if code.code == ErrorCode::ConstraintViolation => {
            PortdumpError::StorageIntegrityViolation {
                table,
                detail: msg.clone().unwrap_or_else(|| err.to_string()),
            }
        }
        _ => PortdumpError::Storage(format!("{table}: {err}")),
    }
}
