//! Batch runner: strict one-item-at-a-time processing with an enforced
//! inter-item delay. Sequential discipline is the substitute for locking —
//! the persistent store never sees two concurrent writers.

use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use rusqlite::Connection;

use crate::config;
use crate::db;
use crate::models::{patient_key, ObservedRow, PatientInfo, PatientRecord, StructuredData};
use crate::pipeline::extraction::{extract, parse_report_info, sanitize_report_text, CompiledRule};

use super::types::*;
use super::BatchError;

/// Build a processing queue from freshly observed listing rows.
///
/// Rows with a disallowed status are excluded entirely; rows without an
/// identifier suffix are not ready; identity keys already present in the
/// store carry data and are skipped rather than re-fetched.
pub fn build_queue(
    conn: &Connection,
    observed: &[ObservedRow],
    id_prefix: &str,
) -> Result<Vec<QueueItem>, BatchError> {
    let queue = db::load_queue(conn)?;
    let existing: Vec<String> = queue.iter().map(|r| r.identity_key()).collect();

    let mut items = Vec::new();
    for row in observed {
        if !config::is_processable_status(&row.status_label) {
            tracing::debug!(patient = %row.name, status = %row.status_label, "status not processable, skipping");
            continue;
        }
        let Some(suffix) = row.suffix.as_deref().filter(|s| !s.trim().is_empty()) else {
            tracing::debug!(patient = %row.name, "no identifier suffix yet, skipping");
            continue;
        };
        if existing.contains(&patient_key(id_prefix, &row.name)) {
            tracing::debug!(patient = %row.name, "already in store, skipping");
            continue;
        }

        items.push(QueueItem {
            id: new_batch_id(),
            patient: PatientInfo {
                id_prefix: id_prefix.to_string(),
                name: row.name.clone(),
                patient_suffix: Some(suffix.trim().to_string()),
            },
            row_ref: row.row_ref,
            imported_status: row.status_label.clone(),
        });
    }

    tracing::info!(queued = items.len(), observed = observed.len(), "processing queue built");
    Ok(items)
}

/// Process the queue sequentially. Per-item failures are captured as
/// error-tagged outcomes and never abort the remaining items; retrying a
/// failed item later merges instead of duplicating.
pub fn run_batch(
    conn: &Connection,
    items: &[QueueItem],
    source: Arc<dyn ReportSource>,
    rules: &[CompiledRule],
    batch_config: &BatchConfig,
    progress: Option<&dyn Fn(BatchEvent)>,
) -> Result<BatchResult, BatchError> {
    if items.is_empty() {
        return Err(BatchError::EmptyQueue);
    }

    let start = Instant::now();
    let mut result = BatchResult {
        batch_id: new_batch_id(),
        ..BatchResult::default()
    };

    if let Some(progress) = progress {
        progress(BatchEvent::Started { total: items.len() });
    }

    for (index, item) in items.iter().enumerate() {
        if let Some(progress) = progress {
            progress(BatchEvent::Progress {
                completed: index,
                total: items.len(),
                current: item.patient.name.clone(),
            });
        }

        match process_item(conn, item, source.clone(), rules, batch_config.fetch_timeout) {
            Ok((success, _)) => {
                tracing::info!(
                    patient = %success.patient_name,
                    tests = success.tests_found,
                    "item processed"
                );
                result.successes.push(success);
            }
            Err(e) => {
                tracing::error!(patient = %item.patient.name, error = %e, "item failed, continuing");
                result.failures.push(ItemFailure {
                    item_id: item.id.clone(),
                    patient_name: item.patient.name.clone(),
                    row_ref: item.row_ref,
                    error: e.to_string(),
                });
            }
        }

        if index < items.len() - 1 {
            thread::sleep(batch_config.inter_item_delay);
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;

    if let Some(progress) = progress {
        progress(BatchEvent::Completed {
            processed: result.successes.len(),
            failed: result.failures.len(),
            duration_ms: result.duration_ms,
        });
    }

    tracing::info!(
        processed = result.successes.len(),
        failed = result.failures.len(),
        duration_ms = result.duration_ms,
        "batch complete"
    );
    Ok(result)
}

/// Re-acquire one already-stored patient and merge the new extraction.
pub fn refetch_patient(
    conn: &Connection,
    key: &str,
    item: &QueueItem,
    source: Arc<dyn ReportSource>,
    rules: &[CompiledRule],
    batch_config: &BatchConfig,
) -> Result<RefetchOutcome, BatchError> {
    if db::get_patient(conn, key)?.is_none() {
        return Err(BatchError::PatientNotFound { key: key.to_string() });
    }

    let (_, outcome) = process_item(conn, item, source, rules, batch_config.fetch_timeout)?;

    let new_tests = match outcome {
        db::UpsertOutcome::Merged { added_tests } => added_tests,
        db::UpsertOutcome::Inserted => 0,
    };
    let total_tests = db::get_patient(conn, key)?
        .map(|r| r.structured_data.test_results.len())
        .unwrap_or(0);

    tracing::info!(patient = %item.patient.name, new_tests, total_tests, "refetch complete");
    Ok(RefetchOutcome { new_tests, total_tests })
}

/// One item through the pipeline: acquire text → sanitize → extract →
/// reload-and-merge. A single structured failure path per item.
fn process_item(
    conn: &Connection,
    item: &QueueItem,
    source: Arc<dyn ReportSource>,
    rules: &[CompiledRule],
    fetch_timeout: Duration,
) -> Result<(ItemSuccess, db::UpsertOutcome), BatchError> {
    let raw = fetch_with_timeout(source, item.clone(), fetch_timeout)?;
    let text = sanitize_report_text(&raw);

    let test_results = extract(&text, rules)?;
    let tests_found = test_results.len();
    let report_info = parse_report_info(&text);

    let record = PatientRecord::new(
        item.patient.clone(),
        StructuredData { report_info, test_results },
        item.imported_status.clone(),
    );

    // The store snapshot is reloaded inside upsert, immediately before the
    // merge, so a concurrent session's save is not clobbered wholesale.
    let outcome = db::upsert(conn, record, Utc::now())?;

    let success = ItemSuccess {
        item_id: item.id.clone(),
        patient_name: item.patient.name.clone(),
        tests_found,
    };
    Ok((success, outcome))
}

/// Run one acquisition on a worker thread and give up after the timeout.
/// An abandoned worker finishes in the background; its result is discarded.
fn fetch_with_timeout(
    source: Arc<dyn ReportSource>,
    item: QueueItem,
    timeout: Duration,
) -> Result<String, BatchError> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(source.fetch_report_text(&item));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(BatchError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(BatchError::Source("report source worker terminated".to_string()))
        }
    }
}
