use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Rezulta";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Source-system status label meaning results are final.
pub const STATUS_COMPLETE: &str = "Efectuat cu rezultate";

/// Source-system status labels meaning results are still pending. Patients
/// imported under one of these get the status-change notification when the
/// listing later shows them complete.
pub const STATUS_INCOMPLETE: &[&str] = &["In lucru", "Rezultate partiale"];

/// Fixed length of the session-wide identifier prefix (e.g. "25S19").
pub const ID_PREFIX_LEN: usize = 5;

/// Wall-clock budget for acquiring one report's text.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Enforced pause between queue items; the sequential discipline that stands
/// in for locking on the persistent store.
pub const INTER_ITEM_DELAY: Duration = Duration::from_secs(2);

/// Statuses eligible for queue processing: final results plus the pending
/// ones (partial reports still carry extractable values).
pub fn is_processable_status(status: &str) -> bool {
    status == STATUS_COMPLETE || STATUS_INCOMPLETE.contains(&status)
}

/// Statuses eligible for roster matching: final results only.
pub fn is_matchable_status(status: &str) -> bool {
    status == STATUS_COMPLETE
}

/// Get the application data directory
/// ~/Rezulta/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(APP_NAME)
}

/// Default location of the queue database.
pub fn database_path() -> PathBuf {
    app_data_dir().join("queue.db")
}

pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("Rezulta"));
    }

    #[test]
    fn database_path_under_app_data() {
        let db = database_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("queue.db"));
    }

    #[test]
    fn complete_status_is_processable_and_matchable() {
        assert!(is_processable_status(STATUS_COMPLETE));
        assert!(is_matchable_status(STATUS_COMPLETE));
    }

    #[test]
    fn pending_statuses_are_processable_but_not_matchable() {
        for status in STATUS_INCOMPLETE {
            assert!(is_processable_status(status));
            assert!(!is_matchable_status(status));
        }
    }

    #[test]
    fn unknown_status_is_excluded_everywhere() {
        assert!(!is_processable_status("Anulat"));
        assert!(!is_matchable_status("Anulat"));
    }
}
