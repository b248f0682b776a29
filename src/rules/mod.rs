//! Series rule storage
//!
//! A keyed in-memory map persisted as a single pretty-printed JSON array.
//! Writers hold the write side across both the in-memory mutation and the
//! persistence attempt; a failed persist rolls the map back before the lock
//! is released, so readers never observe state that is not on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::SeriesRule;
use crate::utils::atomic_file::write_atomic;

pub const RULES_FILE: &str = "series_rules.json";
const RULES_FILE_MODE: u32 = 0o600;

pub struct RuleStore {
    path: PathBuf,
    rules: RwLock<HashMap<String, SeriesRule>>,
}

impl RuleStore {
    /// Load the store from `<data_dir>/series_rules.json`. A missing file is
    /// not an error and yields an empty store.
    pub fn load(data_dir: &Path) -> Result<Self, StoreError> {
        let path = data_dir.join(RULES_FILE);
        let rules = match std::fs::read(&path) {
            Ok(bytes) => {
                let list: Vec<SeriesRule> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|r| (r.id.clone(), r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            rules: RwLock::new(rules),
        })
    }

    /// All rules, ordered by id for deterministic iteration.
    pub fn list(&self) -> Vec<SeriesRule> {
        let guard = self.rules.read().expect("rule store lock poisoned");
        let mut rules: Vec<_> = guard.values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    pub fn get(&self, id: &str) -> Option<SeriesRule> {
        self.rules
            .read()
            .expect("rule store lock poisoned")
            .get(id)
            .cloned()
    }

    /// Insert a new rule, assigning a fresh id when the caller left it empty.
    pub fn add(&self, mut rule: SeriesRule) -> Result<SeriesRule, StoreError> {
        rule.validate().map_err(StoreError::InvalidRule)?;

        let mut guard = self.rules.write().expect("rule store lock poisoned");
        if rule.id.is_empty() {
            rule.id = Uuid::new_v4().to_string();
        }
        if guard.contains_key(&rule.id) {
            return Err(StoreError::InvalidRule(format!(
                "rule id already exists: {}",
                rule.id
            )));
        }

        guard.insert(rule.id.clone(), rule.clone());
        if let Err(e) = self.persist(&guard) {
            guard.remove(&rule.id);
            return Err(e);
        }
        Ok(rule)
    }

    /// Replace a rule's user-editable fields. Each server-managed
    /// `last_run_*` field survives independently unless the caller supplies
    /// that field itself.
    pub fn update(&self, id: &str, mut incoming: SeriesRule) -> Result<SeriesRule, StoreError> {
        incoming.validate().map_err(StoreError::InvalidRule)?;

        let mut guard = self.rules.write().expect("rule store lock poisoned");
        let prior = guard
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        incoming.id = prior.id.clone();
        if incoming.last_run_at.is_none() {
            incoming.last_run_at = prior.last_run_at;
        }
        if incoming.last_run_status.is_empty() {
            incoming.last_run_status = prior.last_run_status.clone();
        }
        if incoming.last_run_summary.is_empty() {
            incoming.last_run_summary = prior.last_run_summary.clone();
        }

        guard.insert(id.to_string(), incoming.clone());
        if let Err(e) = self.persist(&guard) {
            guard.insert(id.to_string(), prior);
            return Err(e);
        }
        Ok(incoming)
    }

    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut guard = self.rules.write().expect("rule store lock poisoned");
        let removed = guard
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if let Err(e) = self.persist(&guard) {
            guard.insert(id.to_string(), removed);
            return Err(e);
        }
        Ok(())
    }

    /// Engine write-back after a pass.
    pub fn record_run_outcome(
        &self,
        id: &str,
        at: DateTime<Utc>,
        status: &str,
        summary: String,
    ) -> Result<(), StoreError> {
        let mut guard = self.rules.write().expect("rule store lock poisoned");
        let prior = guard
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut updated = prior.clone();
        updated.last_run_at = Some(at);
        updated.last_run_status = status.to_string();
        updated.last_run_summary = summary;

        guard.insert(id.to_string(), updated);
        if let Err(e) = self.persist(&guard) {
            guard.insert(id.to_string(), prior);
            return Err(e);
        }
        Ok(())
    }

    /// Force the current state to disk.
    pub fn save(&self) -> Result<(), StoreError> {
        let guard = self.rules.read().expect("rule store lock poisoned");
        self.persist(&guard)
    }

    fn persist(&self, rules: &HashMap<String, SeriesRule>) -> Result<(), StoreError> {
        let mut list: Vec<_> = rules.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        let bytes = serde_json::to_vec_pretty(&list)?;
        write_atomic(&self.path, &bytes, RULES_FILE_MODE)?;
        Ok(())
    }
}
