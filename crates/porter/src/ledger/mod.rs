//! Durable source-id → target-id mappings, one JSON file per entity kind.
//!
//! The ledger is what makes re-running a migration safe: a record whose
//! source id is already mapped is never sent to the target again.
//!
//! # File format
//!
//! ```json
//! {
//!   "users": { "1134669209": "1-42" },
//!   "migrated_at": { "1134669209": "2025-01-14T10:00:00Z" },
//!   "timestamp": "2025-01-14T10:00:05Z",
//!   "stage_marker": "completed"
//! }
//! ```
//!
//! Keys are written in sorted order, so two flushes of the same mappings
//! differ only in `timestamp`.

mod store;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::kind::EntityKind;

pub use store::{LedgerStore, StageState, StageStatus};

const MIGRATED_AT_KEY: &str = "migrated_at";
const TIMESTAMP_KEY: &str = "timestamp";
const MARKER_KEY: &str = "stage_marker";

/// Errors reading or writing a ledger file.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Ledger file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
}

impl LedgerError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn corrupt(path: &Path, message: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Completion marker persisted alongside a stage's mappings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageMarker {
    #[default]
    InProgress,
    Completed,
    /// The stage stopped after exceeding its error threshold.
    Failed,
}

impl StageMarker {
    fn as_str(self) -> &'static str {
        match self {
            StageMarker::InProgress => "in_progress",
            StageMarker::Completed => "completed",
            StageMarker::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(StageMarker::InProgress),
            "completed" => Some(StageMarker::Completed),
            "failed" => Some(StageMarker::Failed),
            _ => None,
        }
    }
}

/// One persisted mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub kind: EntityKind,
    pub source_id: String,
    pub target_id: String,
    pub migrated_at: Option<DateTime<Utc>>,
}

/// The mapping ledger for a single entity kind.
///
/// Mutations stay in memory until [`flush`](Self::flush); a flush replaces
/// the file atomically (write to a sibling temp file, then rename), so a
/// crash leaves either the old or the new contents on disk.
#[derive(Debug, Clone)]
pub struct MappingLedger {
    kind: EntityKind,
    path: PathBuf,
    mappings: BTreeMap<String, String>,
    migrated_at: BTreeMap<String, DateTime<Utc>>,
    timestamp: Option<DateTime<Utc>>,
    marker: StageMarker,
    dirty: bool,
}

impl MappingLedger {
    /// An empty ledger that will be written to `path`.
    pub fn new(kind: EntityKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            mappings: BTreeMap::new(),
            migrated_at: BTreeMap::new(),
            timestamp: None,
            marker: StageMarker::InProgress,
            dirty: false,
        }
    }

    /// Load the ledger at `path`. A missing file yields an empty ledger.
    pub fn load(kind: EntityKind, path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new(kind, path));
            }
            Err(e) => return Err(LedgerError::io(&path, e)),
        };

        let value: Value =
            serde_json::from_str(&raw).map_err(|e| LedgerError::corrupt(&path, e.to_string()))?;
        let Value::Object(root) = value else {
            return Err(LedgerError::corrupt(&path, "top level is not an object"));
        };

        let mut ledger = Self::new(kind, path);

        if let Some(section) = root.get(kind.ledger_key()) {
            let Value::Object(map) = section else {
                return Err(LedgerError::corrupt(
                    &ledger.path,
                    format!("'{}' is not an object", kind.ledger_key()),
                ));
            };
            for (source_id, target) in map {
                let target_id = match target {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    other => {
                        return Err(LedgerError::corrupt(
                            &ledger.path,
                            format!("mapping for '{source_id}' is not a string: {other}"),
                        ));
                    }
                };
                ledger.mappings.insert(source_id.clone(), target_id);
            }
        }

        if let Some(Value::Object(times)) = root.get(MIGRATED_AT_KEY) {
            for (source_id, at) in times {
                if let Some(at) = at.as_str().and_then(parse_time) {
                    ledger.migrated_at.insert(source_id.clone(), at);
                }
            }
        }

        ledger.timestamp = root
            .get(TIMESTAMP_KEY)
            .and_then(Value::as_str)
            .and_then(parse_time);
        ledger.marker = root
            .get(MARKER_KEY)
            .and_then(Value::as_str)
            .and_then(StageMarker::parse)
            .unwrap_or_default();

        Ok(ledger)
    }

    #[inline]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Target id for `source_id`, if mapped.
    pub fn get(&self, source_id: &str) -> Option<&str> {
        self.mappings.get(source_id).map(String::as_str)
    }

    #[inline]
    pub fn contains(&self, source_id: &str) -> bool {
        self.mappings.contains_key(source_id)
    }

    /// Record a mapping, returning the target id it replaced.
    pub fn put(
        &mut self,
        source_id: impl Into<String>,
        target_id: impl Into<String>,
    ) -> Option<String> {
        let source_id = source_id.into();
        self.migrated_at.insert(source_id.clone(), Utc::now());
        self.dirty = true;
        self.mappings.insert(source_id, target_id.into())
    }

    /// All mappings, in source-id order.
    pub fn snapshot(&self) -> Vec<MappingEntry> {
        self.mappings
            .iter()
            .map(|(source_id, target_id)| MappingEntry {
                kind: self.kind,
                source_id: source_id.clone(),
                target_id: target_id.clone(),
                migrated_at: self.migrated_at.get(source_id).copied(),
            })
            .collect()
    }

    /// Borrowed view of the mappings, in source-id order.
    pub fn mappings(&self) -> &BTreeMap<String, String> {
        &self.mappings
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    #[inline]
    pub fn marker(&self) -> StageMarker {
        self.marker
    }

    pub fn set_marker(&mut self, marker: StageMarker) {
        if self.marker != marker {
            self.marker = marker;
            self.dirty = true;
        }
    }

    /// When the ledger was last flushed.
    #[inline]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Whether there are changes not yet flushed.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Persist the full ledger, replacing the previous file.
    pub fn flush(&mut self) -> Result<(), LedgerError> {
        let now = Utc::now();
        let body = self.render(now)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }

        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).map_err(|e| LedgerError::io(&tmp, e))?;
        file.write_all(body.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| LedgerError::io(&tmp, e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| LedgerError::io(&self.path, e))?;

        self.timestamp = Some(now);
        self.dirty = false;
        tracing::debug!(
            "Flushed {} {} mappings to {}",
            self.mappings.len(),
            self.kind,
            self.path.display()
        );
        Ok(())
    }

    fn render(&self, now: DateTime<Utc>) -> Result<String, LedgerError> {
        let mappings: Map<String, Value> = self
            .mappings
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let times: Map<String, Value> = self
            .migrated_at
            .iter()
            .filter(|(k, _)| self.mappings.contains_key(*k))
            .map(|(k, at)| (k.clone(), Value::String(format_time(*at))))
            .collect();

        let mut root = Map::new();
        root.insert(self.kind.ledger_key().to_string(), Value::Object(mappings));
        root.insert(MIGRATED_AT_KEY.to_string(), Value::Object(times));
        root.insert(TIMESTAMP_KEY.to_string(), Value::String(format_time(now)));
        root.insert(
            MARKER_KEY.to_string(),
            Value::String(self.marker.as_str().to_string()),
        );

        serde_json::to_string_pretty(&Value::Object(root))
            .map_err(|e| LedgerError::corrupt(&self.path, e.to_string()))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ledger_in(dir: &TempDir, kind: EntityKind) -> MappingLedger {
        MappingLedger::load(kind, dir.path().join(kind.file_name())).unwrap()
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = ledger_in(&dir, EntityKind::Accounts);
        assert!(ledger.is_empty());
        assert_eq!(ledger.marker(), StageMarker::InProgress);
        assert!(ledger.timestamp().is_none());
        assert!(!ledger.is_dirty());
    }

    #[test]
    fn test_put_then_flush_then_reload() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_in(&dir, EntityKind::Projects);
        assert_eq!(ledger.put("OPS", "0-1"), None);
        assert_eq!(ledger.put("WEB", "0-2"), None);
        assert!(ledger.is_dirty());
        ledger.set_marker(StageMarker::Completed);
        ledger.flush().unwrap();
        assert!(!ledger.is_dirty());

        let reloaded = ledger_in(&dir, EntityKind::Projects);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("OPS"), Some("0-1"));
        assert_eq!(reloaded.marker(), StageMarker::Completed);
        assert!(reloaded.timestamp().is_some());
        assert!(reloaded.snapshot().iter().all(|e| e.migrated_at.is_some()));
    }

    #[test]
    fn test_later_put_replaces_earlier() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_in(&dir, EntityKind::WorkItems);
        ledger.put("OPS-1", "2-1");
        assert_eq!(ledger.put("OPS-1", "2-9").as_deref(), Some("2-1"));
        assert_eq!(ledger.get("OPS-1"), Some("2-9"));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_file_uses_kind_specific_key() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_in(&dir, EntityKind::Accounts);
        ledger.put("1134669209", "hub-1");
        ledger.flush().unwrap();

        let raw = fs::read_to_string(dir.path().join("user_mapping.json")).unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["users"]["1134669209"], "hub-1");
        assert_eq!(value["stage_marker"], "in_progress");
        assert!(value["migrated_at"]["1134669209"].is_string());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_flush_is_repeatable_and_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_in(&dir, EntityKind::Links);
        ledger.put("2-1|2-2|relates", "Relates");
        ledger.flush().unwrap();
        ledger.flush().unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["link_mapping.json".to_string()]);
    }

    #[test]
    fn test_flush_creates_missing_state_dir() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("nested").join("issue_mapping.json");
        let mut ledger = MappingLedger::new(EntityKind::WorkItems, &path);
        ledger.put("OPS-1", "2-1");
        ledger.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("user_mapping.json");
        fs::write(&path, "{not json").unwrap();
        let err = MappingLedger::load(EntityKind::Accounts, &path).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { .. }));

        fs::write(&path, r#"{"users": ["a", "b"]}"#).unwrap();
        let err = MappingLedger::load(EntityKind::Accounts, &path).unwrap_err();
        assert!(err.to_string().contains("'users' is not an object"));
    }

    #[test]
    fn test_loads_legacy_file_without_marker_or_times() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issue_mapping.json");
        fs::write(&path, r#"{"issues": {"OPS-1": "2-1", "OPS-2": 17}}"#).unwrap();

        let ledger = MappingLedger::load(EntityKind::WorkItems, &path).unwrap();
        assert_eq!(ledger.get("OPS-2"), Some("17"));
        assert_eq!(ledger.marker(), StageMarker::InProgress);
        assert!(ledger.snapshot().iter().all(|e| e.migrated_at.is_none()));
    }

    #[test]
    fn test_two_flushes_differ_only_in_timestamp() {
        let dir = TempDir::new().unwrap();
        let mut ledger = ledger_in(&dir, EntityKind::Projects);
        ledger.put("OPS", "0-1");
        ledger.flush().unwrap();
        let first: Value =
            serde_json::from_str(&fs::read_to_string(ledger.path()).unwrap()).unwrap();

        let mut reloaded = ledger_in(&dir, EntityKind::Projects);
        reloaded.flush().unwrap();
        let second: Value =
            serde_json::from_str(&fs::read_to_string(reloaded.path()).unwrap()).unwrap();

        let strip = |mut v: Value| {
            v.as_object_mut().unwrap().remove(TIMESTAMP_KEY);
            v
        };
        assert_eq!(strip(first), strip(second));
    }
}
