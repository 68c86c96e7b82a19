//! Queue store and reconciler.
//!
//! The patient queue is persisted as one named snapshot, loaded and saved
//! as a unit. Every mutating operation reloads the latest snapshot first,
//! applies a pure transformation on the records, and saves the result —
//! last-writer-wins at save granularity, no cross-session locking.

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use crate::models::{patient_key, ObservedRow, PatientRecord};

use super::DatabaseError;

/// Name of the persisted queue collection.
pub const QUEUE_COLLECTION: &str = "export-queue";

/// Result of reconciling one extraction into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Merged { added_tests: usize },
}

/// Load the full queue snapshot. A missing collection is an empty queue.
pub fn load_queue(conn: &Connection) -> Result<Vec<PatientRecord>, DatabaseError> {
    let payload: Option<String> = conn
        .query_row(
            "SELECT payload FROM snapshots WHERE collection = ?1",
            [QUEUE_COLLECTION],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;

    match payload {
        Some(json) => serde_json::from_str(&json).map_err(|source| DatabaseError::CorruptSnapshot {
            collection: QUEUE_COLLECTION.to_string(),
            source,
        }),
        None => Ok(Vec::new()),
    }
}

/// Save the full queue snapshot, replacing the previous one.
pub fn save_queue(conn: &Connection, queue: &[PatientRecord]) -> Result<(), DatabaseError> {
    let payload = serde_json::to_string(queue).map_err(|source| DatabaseError::CorruptSnapshot {
        collection: QUEUE_COLLECTION.to_string(),
        source,
    })?;
    conn.execute(
        "INSERT INTO snapshots (collection, payload, saved_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(collection) DO UPDATE SET payload = ?2, saved_at = ?3",
        rusqlite::params![QUEUE_COLLECTION, payload, Utc::now().to_rfc3339()],
    )?;
    tracing::debug!(patients = queue.len(), "queue snapshot saved");
    Ok(())
}

/// Remove the queue collection entirely (operator reset).
pub fn clear_queue(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM snapshots WHERE collection = ?1", [QUEUE_COLLECTION])?;
    tracing::info!("queue cleared");
    Ok(())
}

/// Look up one record by identity key.
pub fn get_patient(conn: &Connection, key: &str) -> Result<Option<PatientRecord>, DatabaseError> {
    let queue = load_queue(conn)?;
    Ok(queue.into_iter().find(|r| r.identity_key() == key))
}

/// Reconcile one extraction into the store.
///
/// Absent key: inserted as-is, with an empty export ledger. Present key:
/// merged — new test keys are added, previously captured readings are never
/// revised, the status label is refreshed and the pending-change latch is
/// cleared. Re-running the same extraction is idempotent.
pub fn upsert(
    conn: &Connection,
    record: PatientRecord,
    observed_at: DateTime<Utc>,
) -> Result<UpsertOutcome, DatabaseError> {
    let mut queue = load_queue(conn)?;
    let key = record.identity_key();

    let outcome = match queue.iter_mut().find(|r| r.identity_key() == key) {
        Some(existing) => {
            let added = existing.merge_from(&record, observed_at);
            tracing::info!(patient = %existing.patient_info.name, added_tests = added, "merged extraction into existing record");
            UpsertOutcome::Merged { added_tests: added }
        }
        None => {
            tracing::info!(
                patient = %record.patient_info.name,
                tests = record.structured_data.test_results.len(),
                "inserted new patient record"
            );
            queue.push(record);
            UpsertOutcome::Inserted
        }
    };

    save_queue(conn, &queue)?;
    Ok(outcome)
}

/// Run the status-change latch over a fresh observation of the listing.
/// Returns the number of records newly flagged.
pub fn sync_observed_statuses(
    conn: &Connection,
    observed: &[ObservedRow],
    id_prefix: &str,
) -> Result<usize, DatabaseError> {
    let mut queue = load_queue(conn)?;
    let mut flagged = 0;

    for row in observed {
        let key = patient_key(id_prefix, &row.name);
        if let Some(record) = queue.iter_mut().find(|r| r.identity_key() == key) {
            if record.detect_status_change(&row.status_label) {
                tracing::info!(
                    patient = %record.patient_info.name,
                    from = %record.imported_status,
                    to = %row.status_label,
                    "status changed since import"
                );
                flagged += 1;
            }
        }
    }

    if flagged > 0 {
        save_queue(conn, &queue)?;
    }
    Ok(flagged)
}

/// Mark every currently held test of the given patients as exported.
/// Per-test and monotonic; excluded records are skipped. Returns the number
/// of test keys marked.
pub fn mark_exported(
    conn: &Connection,
    identity_keys: &[String],
    timestamp: DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let mut queue = load_queue(conn)?;
    let mut marked = 0;

    for record in queue.iter_mut() {
        if record.excluded || !identity_keys.contains(&record.identity_key()) {
            continue;
        }
        marked += record.mark_exported(timestamp);
    }

    save_queue(conn, &queue)?;
    tracing::info!(tests = marked, patients = identity_keys.len(), "marked tests exported");
    Ok(marked)
}

/// All non-excluded records with at least one unexported test key: the sole
/// basis for what should be exported next.
pub fn pending_export_set(conn: &Connection) -> Result<Vec<PatientRecord>, DatabaseError> {
    let queue = load_queue(conn)?;
    Ok(queue
        .into_iter()
        .filter(|r| !r.excluded && r.has_unexported_tests())
        .collect())
}

/// Toggle the export filter for one record. Does not touch the ledger.
pub fn set_excluded(conn: &Connection, key: &str, excluded: bool) -> Result<(), DatabaseError> {
    let mut queue = load_queue(conn)?;
    let record = queue
        .iter_mut()
        .find(|r| r.identity_key() == key)
        .ok_or_else(|| DatabaseError::PatientNotFound { key: key.to_string() })?;

    record.excluded = excluded;
    tracing::info!(patient = %record.patient_info.name, excluded, "exclusion toggled");
    save_queue(conn, &queue)
}

/// Operator-initiated bulk reset of the export ledger: every patient becomes
/// exportable again. Returns the number of patients reset.
pub fn reset_exported(conn: &Connection) -> Result<usize, DatabaseError> {
    let mut queue = load_queue(conn)?;
    let mut reset = 0;

    for record in queue.iter_mut() {
        if record.exported || !record.exported_tests.is_empty() {
            record.exported = false;
            record.exported_at = None;
            record.exported_tests.clear();
            record.needs_reexport = false;
            reset += 1;
        }
    }

    if reset > 0 {
        save_queue(conn, &queue)?;
    }
    tracing::info!(patients = reset, "export ledger reset");
    Ok(reset)
}
