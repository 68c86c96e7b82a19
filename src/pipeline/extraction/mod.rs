//! Pattern extraction: free-form report text → typed test results.
//!
//! The engine is data-driven: detection rules are compiled once from the
//! test definition table, and a generic positional fallback covers reports
//! whose labels are outside the declared vocabulary.

pub mod engine;
pub mod fallback;
pub mod report;
pub mod sanitize;

use thiserror::Error;

pub use engine::{compile_rules, extract, CompiledRule};
pub use report::parse_report_info;
pub use sanitize::sanitize_report_text;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("report text is empty")]
    EmptyReport,

    #[error("detection pattern for {key} does not compile: {source}")]
    Pattern {
        key: &'static str,
        #[source]
        source: regex::Error,
    },
}
