//! Report-header parsing: bulletin number, dates and patient identity
//! fields printed above the results table.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::ReportInfo;

static BULLETIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Buletin de analize medicale nr\.\s*(\d+)").unwrap());
static REPORT_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Data raportului:\s*([0-9.]+\s+[0-9:]+)").unwrap());
// The name block runs until the "Data cerere" label; layout line breaks may
// fall inside it. Reports without that label fall back to the single-line rule.
static PATIENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Nume/Prenume:\s*(.*?)Data cerere").unwrap());
static PATIENT_NAME_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Nume/Prenume:\s*([^\n\r]+)").unwrap());
static CNP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"CNP:\s*(\d+)").unwrap());
static REFERRING_DOCTOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Medic trimitator:\s*([^\n\r]+)").unwrap());
static COLLECTION_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Data si ora recoltare:\s*([0-9.\s:]+)").unwrap());

/// Parse the header fields of a report. Every field is optional; reports
/// from other laboratories simply yield an empty `ReportInfo`.
pub fn parse_report_info(text: &str) -> ReportInfo {
    let mut info = ReportInfo::default();

    if let Some(caps) = BULLETIN.captures(text) {
        info.bulletin_number = Some(caps[1].to_string());
    }
    if let Some(caps) = REPORT_DATE.captures(text) {
        info.report_date = Some(caps[1].trim().to_string());
    }

    info.patient_name = match PATIENT_NAME.captures(text) {
        Some(caps) => {
            let name = collapse_whitespace(&caps[1]);
            (!name.is_empty()).then_some(name)
        }
        None => PATIENT_NAME_LINE
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|name| !name.is_empty()),
    };
    if let Some(name) = &info.patient_name {
        tracing::debug!(patient = %name, "extracted patient name from report header");
    }

    if let Some(caps) = CNP.captures(text) {
        info.cnp = Some(caps[1].to_string());
    }
    if let Some(caps) = REFERRING_DOCTOR.captures(text) {
        info.referring_doctor = Some(caps[1].trim().to_string());
    }
    if let Some(caps) = COLLECTION_DATE.captures(text) {
        let value = caps[1].trim().to_string();
        if !value.is_empty() {
            info.collection_date = Some(value);
        }
    }

    info
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
