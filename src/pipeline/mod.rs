//! Processing pipeline: report text in, reconciled export ledger out.
//!
//! Stages are pure where possible; the persistence boundary is the explicit
//! load/save pair in `crate::db`.

pub mod batch;
pub mod export;
pub mod extraction;
pub mod matching;
pub mod roster;
