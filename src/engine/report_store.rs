//! Run report persistence
//!
//! Each rule's most recent report lands at
//! `<data_dir>/series_reports/<rule_id>_latest.json`, world-readable,
//! overwritten atomically on every run.

use std::path::{Path, PathBuf};

use crate::errors::StoreError;
use crate::models::RunReport;
use crate::utils::atomic_file::write_atomic;

pub const REPORTS_DIR: &str = "series_reports";
const REPORT_FILE_MODE: u32 = 0o644;

pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join(REPORTS_DIR),
        }
    }

    pub fn path_for(&self, rule_id: &str) -> PathBuf {
        self.dir.join(format!("{rule_id}_latest.json"))
    }

    pub fn persist(&self, report: &RunReport) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&report.rule_id);
        let bytes = serde_json::to_vec_pretty(report)?;
        write_atomic(&path, &bytes, REPORT_FILE_MODE)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SeriesRule, Trigger};
    use chrono::Utc;
    use uuid::Uuid;

    #[test]
    fn persists_and_overwrites_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let rule: SeriesRule = serde_json::from_str(r#"{"id": "r1"}"#).unwrap();

        let mut report = RunReport::new(&rule, Uuid::nil(), Trigger::Auto, 0, 100, Utc::now());
        let path = store.persist(&report).unwrap();
        assert!(path.ends_with("series_reports/r1_latest.json"));

        report.summary.timers_created = 3;
        store.persist(&report).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["timers_created"], 3);
    }

    #[cfg(unix)]
    #[test]
    fn reports_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        let rule: SeriesRule = serde_json::from_str(r#"{"id": "r1"}"#).unwrap();
        let report = RunReport::new(&rule, Uuid::nil(), Trigger::Auto, 0, 100, Utc::now());

        let path = store.persist(&report).unwrap();
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
