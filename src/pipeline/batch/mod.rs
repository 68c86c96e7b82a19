//! Sequential queue processing: acquire text → extract → merge, one item at
//! a time, with per-item timeout and error isolation.

pub mod runner;
pub mod types;

use std::time::Duration;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::extraction::ExtractionError;

pub use runner::{build_queue, refetch_patient, run_batch};
pub use types::*;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("processing queue is empty")]
    EmptyQueue,

    #[error("report acquisition failed: {0}")]
    Source(String),

    #[error("report acquisition timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("patient not found: {key}")]
    PatientNotFound { key: String },
}
