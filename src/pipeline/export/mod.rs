//! Export ledger generation: one `RequestID,ProcDate,AnCode,StringValue`
//! line per not-yet-exported test key per patient.

use chrono::{DateTime, Datelike, Local};
use thiserror::Error;

use crate::config;
use crate::models::{definition_rank, PatientRecord};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("nothing to export: every test is already exported or every patient is excluded")]
    NothingToExport,

    #[error("{count} patient(s) are missing identifier suffixes: {names}")]
    MissingSuffixes { count: usize, names: String },
}

pub const LEDGER_HEADER: &str = "RequestID,ProcDate,AnCode,StringValue";

const MONTH_ABBREV: [&str; 12] = [
    "ian", "feb", "mar", "apr", "mai", "iun", "iul", "aug", "sep", "oct", "nov", "dec",
];

/// A generated export file plus the identity keys it covers, so the caller
/// can mark the ledger only after the file is actually written.
#[derive(Debug, Clone)]
pub struct LedgerFile {
    pub filename: String,
    pub content: String,
    pub line_count: usize,
    pub identity_keys: Vec<String>,
}

/// A patient whose extracted tests produced no export rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessIssue {
    pub patient: String,
    pub extracted_tests: usize,
}

/// Build the export file for the pending set.
///
/// All-or-nothing at this level: any patient missing an identifier suffix
/// blocks the whole export, with the affected patients named.
pub fn build_ledger(
    pending: &[PatientRecord],
    session_prefix: &str,
    at: DateTime<Local>,
) -> Result<LedgerFile, ExportError> {
    let exportable: Vec<&PatientRecord> =
        pending.iter().filter(|p| p.has_unexported_tests()).collect();
    if exportable.is_empty() {
        return Err(ExportError::NothingToExport);
    }

    let missing: Vec<&str> = exportable
        .iter()
        .filter(|p| p.patient_info.patient_suffix.as_deref().unwrap_or("").is_empty())
        .map(|p| p.patient_info.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(ExportError::MissingSuffixes {
            count: missing.len(),
            names: missing.join(", "),
        });
    }

    let proc_date = format_proc_date(at);
    let mut rows = vec![LEDGER_HEADER.to_string()];
    let mut identity_keys = Vec::new();

    for patient in &exportable {
        let suffix = patient.patient_info.patient_suffix.as_deref().unwrap_or("");
        let request_id = format!(
            "{}{}-{}",
            patient.patient_info.id_prefix,
            suffix,
            patient.display_name()
        );

        let mut keys = patient.unexported_keys();
        keys.sort_by_key(|k| (definition_rank(k).unwrap_or(usize::MAX), k.to_string()));

        for key in keys {
            let value = &patient.structured_data.test_results[key].value;
            rows.push(
                [
                    escape_field(&request_id),
                    escape_field(&proc_date),
                    escape_field(key),
                    escape_field(value),
                ]
                .join(","),
            );
        }
        identity_keys.push(patient.identity_key());
    }

    let line_count = rows.len() - 1;
    tracing::info!(patients = identity_keys.len(), lines = line_count, "export ledger built");

    Ok(LedgerFile {
        filename: export_filename(session_prefix, at),
        content: rows.join("\n"),
        line_count,
        identity_keys,
    })
}

/// Patients holding extracted tests that contributed no rows to the file.
/// Reported as warnings, never silently swallowed.
pub fn validate_completeness(
    pending: &[PatientRecord],
    ledger_content: &str,
) -> Vec<CompletenessIssue> {
    let mut issues = Vec::new();

    for patient in pending {
        let test_count = patient.structured_data.test_results.len();
        if test_count == 0 {
            continue;
        }
        let name = patient.display_name();
        let exported_rows = ledger_content.lines().filter(|l| l.contains(name)).count();
        if exported_rows == 0 {
            issues.push(CompletenessIssue {
                patient: name.to_string(),
                extracted_tests: test_count,
            });
        }
    }

    issues
}

/// Export moment formatted `M/D/YYYY HH:mm:ss` — month and day unpadded,
/// time zero-padded.
pub fn format_proc_date(at: DateTime<Local>) -> String {
    at.format("%-m/%-d/%Y %H:%M:%S").to_string()
}

/// `{prefix}_{day}_{month}_{app}.txt`, with Romanian month abbreviations.
pub fn export_filename(prefix: &str, at: DateTime<Local>) -> String {
    let month = MONTH_ABBREV[at.month0() as usize];
    format!("{}_{}_{}_{}.txt", prefix, at.day(), month, config::APP_NAME)
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
