use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config;
use crate::pipeline::matching::normalize_name;

/// Comparison marker seen on a reading (`< 3` style bounded values).
/// Preserved as a typed fact; the stored value itself is marker-stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Below,
    Above,
}

/// One extracted reading, keyed by test key in `StructuredData::test_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedTestResult {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison: Option<Comparison>,
}

/// Identity fields for a patient as observed in the source listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientInfo {
    pub id_prefix: String,
    pub name: String,
    /// Per-patient identifier tail assigned by roster matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_suffix: Option<String>,
}

/// Report-header fields parsed out of the raw report text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulletin_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cnp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referring_doctor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredData {
    #[serde(default)]
    pub report_info: ReportInfo,
    #[serde(default)]
    pub test_results: BTreeMap<String, ExtractedTestResult>,
}

/// The unit of persistence. At most one record exists per identity key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_info: PatientInfo,
    pub structured_data: StructuredData,
    /// Per-test export ledger: key → moment it was first exported.
    #[serde(default)]
    pub exported_tests: BTreeMap<String, DateTime<Utc>>,
    #[serde(default)]
    pub excluded: bool,
    /// Source-system status label at the time of the last import/merge.
    pub imported_status: String,
    #[serde(default)]
    pub status_changed_since_import: bool,
    #[serde(default)]
    pub needs_reexport: bool,
    #[serde(default)]
    pub last_refetch_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
}

/// The sole primary key for persisted patient records: lowercased session
/// prefix joined with the normalized patient name.
pub fn patient_key(id_prefix: &str, name: &str) -> String {
    let prefix = id_prefix.trim().to_lowercase();
    format!("{}_{}", prefix, normalize_name(name))
}

impl PatientRecord {
    /// A fresh record as created on first successful extraction.
    pub fn new(patient_info: PatientInfo, structured_data: StructuredData, imported_status: String) -> Self {
        Self {
            patient_info,
            structured_data,
            exported_tests: BTreeMap::new(),
            excluded: false,
            imported_status,
            status_changed_since_import: false,
            needs_reexport: false,
            last_refetch_at: None,
            exported: false,
            exported_at: None,
        }
    }

    pub fn identity_key(&self) -> String {
        patient_key(&self.patient_info.id_prefix, &self.patient_info.name)
    }

    /// Name used on export lines: the report-header name when the report
    /// carried one, otherwise the listing name.
    pub fn display_name(&self) -> &str {
        self.structured_data
            .report_info
            .patient_name
            .as_deref()
            .unwrap_or(&self.patient_info.name)
    }

    /// Merge a re-extraction into this record. New test keys are added;
    /// previously captured readings are never revised. Returns the number of
    /// newly added test keys.
    pub fn merge_from(&mut self, newer: &PatientRecord, observed_at: DateTime<Utc>) -> usize {
        let mut added = 0;
        for (key, result) in &newer.structured_data.test_results {
            if !self.structured_data.test_results.contains_key(key) {
                self.structured_data.test_results.insert(key.clone(), result.clone());
                added += 1;
            }
        }
        if added > 0 {
            self.needs_reexport = true;
        }

        if self.patient_info.patient_suffix.is_none() {
            self.patient_info.patient_suffix = newer.patient_info.patient_suffix.clone();
        }
        merge_report_info(&mut self.structured_data.report_info, &newer.structured_data.report_info);

        // A fresh extraction resets the pending-change signal: the operator
        // has just acted on it.
        self.imported_status = newer.imported_status.clone();
        self.status_changed_since_import = false;
        self.last_refetch_at = Some(observed_at);

        added
    }

    /// One-way latch: an operator who imported this patient while results
    /// were still pending is notified that a refetch is now worthwhile.
    /// Returns true if the latch was set by this call.
    pub fn detect_status_change(&mut self, observed_status: &str) -> bool {
        let was_incomplete = config::STATUS_INCOMPLETE.contains(&self.imported_status.as_str());
        if was_incomplete
            && observed_status == config::STATUS_COMPLETE
            && !self.status_changed_since_import
        {
            self.status_changed_since_import = true;
            return true;
        }
        false
    }

    /// Test keys present in the results but absent from the export ledger.
    pub fn unexported_keys(&self) -> Vec<&str> {
        self.structured_data
            .test_results
            .keys()
            .filter(|k| !self.exported_tests.contains_key(*k))
            .map(String::as_str)
            .collect()
    }

    pub fn has_unexported_tests(&self) -> bool {
        self.structured_data
            .test_results
            .keys()
            .any(|k| !self.exported_tests.contains_key(k))
    }

    /// Stamp every currently unexported test key with the export moment.
    /// Per-test and monotonic: keys already in the ledger are untouched.
    /// Returns the number of keys marked.
    pub fn mark_exported(&mut self, timestamp: DateTime<Utc>) -> usize {
        let mut marked = 0;
        let keys: Vec<String> = self.structured_data.test_results.keys().cloned().collect();
        for key in keys {
            if !self.exported_tests.contains_key(&key) {
                self.exported_tests.insert(key, timestamp);
                marked += 1;
            }
        }
        self.exported = true;
        self.exported_at = Some(timestamp);
        self.needs_reexport = false;
        marked
    }
}

fn merge_report_info(existing: &mut ReportInfo, newer: &ReportInfo) {
    if existing.bulletin_number.is_none() {
        existing.bulletin_number = newer.bulletin_number.clone();
    }
    if existing.report_date.is_none() {
        existing.report_date = newer.report_date.clone();
    }
    if existing.patient_name.is_none() {
        existing.patient_name = newer.patient_name.clone();
    }
    if existing.cnp.is_none() {
        existing.cnp = newer.cnp.clone();
    }
    if existing.referring_doctor.is_none() {
        existing.referring_doctor = newer.referring_doctor.clone();
    }
    if existing.collection_date.is_none() {
        existing.collection_date = newer.collection_date.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn result(value: &str) -> ExtractedTestResult {
        ExtractedTestResult { value: value.to_string(), comparison: None }
    }

    fn record_with_tests(tests: &[(&str, &str)]) -> PatientRecord {
        let mut data = StructuredData::default();
        for (k, v) in tests {
            data.test_results.insert(k.to_string(), result(v));
        }
        PatientRecord::new(
            PatientInfo {
                id_prefix: "25S19".to_string(),
                name: "Ionescu Ana".to_string(),
                patient_suffix: Some("05".to_string()),
            },
            data,
            config::STATUS_COMPLETE.to_string(),
        )
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn patient_key_is_case_and_diacritic_insensitive() {
        assert_eq!(patient_key("25S19", "Ionescu Ana"), "25s19_ionescu ana");
        assert_eq!(patient_key(" 25S19 ", "IONESCU ANA"), "25s19_ionescu ana");
        assert_eq!(patient_key("25S19", "Ionescu Ană"), "25s19_ionescu ana");
    }

    #[test]
    fn merge_adds_only_never_overwrites() {
        let mut existing = record_with_tests(&[("TSH", "2.1")]);
        let newer = record_with_tests(&[("TSH", "9.9"), ("FT4", "1.2")]);

        let added = existing.merge_from(&newer, ts(100));

        assert_eq!(added, 1);
        assert_eq!(existing.structured_data.test_results["TSH"].value, "2.1");
        assert_eq!(existing.structured_data.test_results["FT4"].value, "1.2");
        assert!(existing.needs_reexport);
        assert_eq!(existing.last_refetch_at, Some(ts(100)));
    }

    #[test]
    fn merge_with_identical_results_is_idempotent() {
        let mut existing = record_with_tests(&[("TSH", "2.1")]);
        let exported_before = existing.exported_tests.clone();
        let newer = record_with_tests(&[("TSH", "2.1")]);

        let added = existing.merge_from(&newer, ts(100));

        assert_eq!(added, 0);
        assert!(!existing.needs_reexport);
        assert_eq!(existing.structured_data.test_results.len(), 1);
        assert_eq!(existing.exported_tests, exported_before);
    }

    #[test]
    fn merge_clears_status_change_latch() {
        let mut existing = record_with_tests(&[("TSH", "2.1")]);
        existing.imported_status = "In lucru".to_string();
        assert!(existing.detect_status_change(config::STATUS_COMPLETE));
        assert!(existing.status_changed_since_import);

        let newer = record_with_tests(&[("TSH", "2.1")]);
        existing.merge_from(&newer, ts(100));

        assert!(!existing.status_changed_since_import);
        assert_eq!(existing.imported_status, config::STATUS_COMPLETE);
    }

    #[test]
    fn status_change_latch_is_one_way() {
        let mut rec = record_with_tests(&[("TSH", "2.1")]);
        rec.imported_status = "Rezultate partiale".to_string();

        assert!(rec.detect_status_change(config::STATUS_COMPLETE));
        // Second observation does not re-trigger.
        assert!(!rec.detect_status_change(config::STATUS_COMPLETE));
        assert!(rec.status_changed_since_import);
    }

    #[test]
    fn status_change_requires_incomplete_origin() {
        let mut rec = record_with_tests(&[("TSH", "2.1")]);
        rec.imported_status = config::STATUS_COMPLETE.to_string();
        assert!(!rec.detect_status_change(config::STATUS_COMPLETE));
        assert!(!rec.status_changed_since_import);
    }

    #[test]
    fn mark_exported_is_monotonic_per_test() {
        let mut rec = record_with_tests(&[("TSH", "2.1"), ("FT4", "1.2")]);

        assert_eq!(rec.mark_exported(ts(100)), 2);
        assert!(rec.exported);
        assert!(!rec.has_unexported_tests());

        // A later merge adds a key; only that key gets the new timestamp.
        let newer = record_with_tests(&[("FERITINA", "15.0")]);
        rec.merge_from(&newer, ts(150));
        assert!(rec.has_unexported_tests());

        assert_eq!(rec.mark_exported(ts(200)), 1);
        assert_eq!(rec.exported_tests["TSH"], ts(100));
        assert_eq!(rec.exported_tests["FERITINA"], ts(200));
    }

    #[test]
    fn unexported_keys_drive_pending_visibility() {
        let mut rec = record_with_tests(&[("TSH", "2.1")]);
        assert_eq!(rec.unexported_keys(), vec!["TSH"]);

        rec.mark_exported(ts(100));
        assert!(rec.unexported_keys().is_empty());
    }

    #[test]
    fn display_name_prefers_report_header() {
        let mut rec = record_with_tests(&[("TSH", "2.1")]);
        assert_eq!(rec.display_name(), "Ionescu Ana");

        rec.structured_data.report_info.patient_name = Some("IONESCU ANA MARIA".to_string());
        assert_eq!(rec.display_name(), "IONESCU ANA MARIA");
    }

    #[test]
    fn record_round_trips_through_json() {
        let rec = record_with_tests(&[("TSH", "2.1")]);
        let json = serde_json::to_string(&rec).unwrap();
        let back: PatientRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(rec, back);
    }
}
