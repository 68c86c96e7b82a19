pub mod queue;
pub mod sqlite;

pub use queue::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Snapshot payload corrupt for collection {collection}: {source}")]
    CorruptSnapshot {
        collection: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Patient not found: {key}")]
    PatientNotFound { key: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },
}
