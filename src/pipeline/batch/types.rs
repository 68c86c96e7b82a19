use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config;
use crate::models::PatientInfo;

use super::BatchError;

/// Supplies the raw text of one patient's report. The transport behind it
/// (download, decode, file read) is a collaborator outside this crate.
pub trait ReportSource: Send + Sync {
    fn fetch_report_text(&self, item: &QueueItem) -> Result<String, BatchError>;
}

/// One queued acquisition: the patient identity as observed in the listing
/// plus the caller's row reference for reporting back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub patient: PatientInfo,
    pub row_ref: usize,
    pub imported_status: String,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub fetch_timeout: Duration,
    pub inter_item_delay: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: config::FETCH_TIMEOUT,
            inter_item_delay: config::INTER_ITEM_DELAY,
        }
    }
}

/// Progress events for whatever surface is watching the run.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started { total: usize },
    Progress { completed: usize, total: usize, current: String },
    Completed { processed: usize, failed: usize, duration_ms: u64 },
}

/// A processed item that made it into the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSuccess {
    pub item_id: String,
    pub patient_name: String,
    pub tests_found: usize,
}

/// An item that failed; carries the original identifying information so the
/// operator always learns which patient was affected.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFailure {
    pub item_id: String,
    pub patient_name: String,
    pub row_ref: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub batch_id: String,
    pub successes: Vec<ItemSuccess>,
    pub failures: Vec<ItemFailure>,
    pub duration_ms: u64,
}

/// Outcome of re-acquiring an already-stored patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefetchOutcome {
    pub new_tests: usize,
    pub total_tests: usize,
}

pub fn new_batch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
