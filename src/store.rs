//! Runtime key/value store shared across the daemon
//!
//! Every background loop signals through this store rather than touching each
//! other's state. Keys are fixed at construction; writes to unknown keys are
//! rejected with a warning. Changes to tracked keys are handed to an audit
//! sink as `{timestamp, key, value}` records.

use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Well-known store keys
pub mod keys {
    /// Pending external command string, cleared after consumption
    pub const COMMAND: &str = "command";
    /// Latest reply text, surfaced to the dashboard
    pub const ANSWER: &str = "answer";
    /// True while a conversation turn claims the audio resource
    pub const CHAT_ENABLE: &str = "chat_enable";
    /// True while a non-conversational announcement is playing
    pub const NOTIFY_ENABLE: &str = "notify_enable";
    /// Desired hotword-detector run state
    pub const WAKE_BY_HW: &str = "wakebyhw";
    /// Actual hotword-detector run state
    pub const HW_STARTED: &str = "hw_started";
    /// Master playback volume
    pub const GENERAL_VOLUME: &str = "general_volume";
    /// Music playback volume
    pub const MUSIC_VOLUME: &str = "music_volume";
    /// Enable scheduled notice announcements
    pub const NOTICE_NOTIFY: &str = "notice_notify";
    /// Enable the hourly chime
    pub const TIME_NOTIFY: &str = "time_notify";
}

/// A scalar config value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Float(f64),
    Str(String),
}

impl Value {
    /// Interpret as bool, if it is one
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Interpret as float, if it is one
    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Interpret as string, if it is one
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// One tracked-key change, as handed to the audit sink
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub key: String,
    pub value: Value,
}

/// Callback invoked for every tracked-key change
pub type AuditSink = Box<dyn Fn(&AuditRecord) + Send + Sync>;

/// Shared runtime state, protected by a single lock
pub struct ConfigStore {
    values: Mutex<HashMap<String, Value>>,
    tracked: HashSet<&'static str>,
    dashboard_writable: HashSet<&'static str>,
    sink: Mutex<Option<AuditSink>>,
}

impl ConfigStore {
    /// Create a store seeded with the fixed key set and defaults
    #[must_use]
    pub fn new() -> Self {
        let mut values = HashMap::new();
        values.insert(keys::COMMAND.to_string(), Value::Str(String::new()));
        values.insert(
            keys::ANSWER.to_string(),
            Value::Str("晓晓已上线，有什么可以帮您的吗？".to_string()),
        );
        values.insert(keys::CHAT_ENABLE.to_string(), Value::Bool(false));
        values.insert(keys::NOTIFY_ENABLE.to_string(), Value::Bool(false));
        values.insert(keys::WAKE_BY_HW.to_string(), Value::Bool(true));
        values.insert(keys::HW_STARTED.to_string(), Value::Bool(true));
        values.insert(keys::GENERAL_VOLUME.to_string(), Value::Float(0.5));
        values.insert(keys::MUSIC_VOLUME.to_string(), Value::Float(0.5));
        values.insert(keys::NOTICE_NOTIFY.to_string(), Value::Bool(true));
        values.insert(keys::TIME_NOTIFY.to_string(), Value::Bool(true));

        Self {
            values: Mutex::new(values),
            tracked: HashSet::from([
                keys::GENERAL_VOLUME,
                keys::MUSIC_VOLUME,
                keys::WAKE_BY_HW,
                keys::NOTICE_NOTIFY,
                keys::TIME_NOTIFY,
            ]),
            dashboard_writable: HashSet::from([
                keys::ANSWER,
                keys::COMMAND,
                keys::GENERAL_VOLUME,
                keys::MUSIC_VOLUME,
                keys::WAKE_BY_HW,
                keys::NOTICE_NOTIFY,
                keys::TIME_NOTIFY,
            ]),
            sink: Mutex::new(None),
        }
    }

    /// Install an audit sink receiving tracked-key changes
    pub fn set_audit_sink(&self, sink: AuditSink) {
        *self.sink.lock().expect("audit sink lock") = Some(sink);
    }

    /// Install the default file sink: JSON lines appended to `path`
    pub fn audit_to_file(&self, path: &Path) {
        let path = path.to_path_buf();
        self.set_audit_sink(Box::new(move |record| {
            let line = match serde_json::to_string(record) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode audit record");
                    return;
                }
            };
            let result = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .and_then(|mut f| writeln!(f, "{line}"));
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "failed to append audit record");
            }
        }));
    }

    /// Set a single key
    ///
    /// Unknown keys are logged and dropped; the value is not stored. Tracked
    /// keys whose value actually changes are reported to the audit sink.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.set_many(vec![(key.to_string(), value.into())]);
    }

    /// Set several keys in one locked call
    ///
    /// Each key is applied and tracked independently; there is no atomicity
    /// guarantee across keys beyond the shared lock.
    pub fn set_many(&self, entries: Vec<(String, Value)>) {
        let mut changed = Vec::new();
        {
            let mut values = self.values.lock().expect("store lock");
            for (key, value) in entries {
                let Some(slot) = values.get_mut(&key) else {
                    tracing::warn!(key = %key, "unknown config key, ignoring");
                    continue;
                };
                if self.tracked.contains(key.as_str()) && *slot != value {
                    changed.push((key.clone(), value.clone()));
                }
                *slot = value;
            }
        }

        if changed.is_empty() {
            return;
        }

        tracing::info!(changed = ?changed, "tracked config keys changed");
        let sink = self.sink.lock().expect("audit sink lock");
        if let Some(sink) = sink.as_ref() {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            for (key, value) in changed {
                sink(&AuditRecord {
                    timestamp: timestamp.clone(),
                    key,
                    value,
                });
            }
        }
    }

    /// Get the current value of a key, or `None` if unknown
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().expect("store lock").get(key).cloned()
    }

    /// Get a bool key; `false` when unset or of another type
    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Get a string key; empty when unset or of another type
    #[must_use]
    pub fn get_str(&self, key: &str) -> String {
        self.get(key)
            .and_then(|v| v.as_str().map(ToString::to_string))
            .unwrap_or_default()
    }

    /// Get a float key
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.as_f64())
    }

    /// Whether the dashboard may write this key
    #[must_use]
    pub fn is_dashboard_writable(&self, key: &str) -> bool {
        self.dashboard_writable.contains(key)
    }

    /// Snapshot of the dashboard-editable keys and their current values
    #[must_use]
    pub fn dashboard_snapshot(&self) -> HashMap<String, Value> {
        let values = self.values.lock().expect("store lock");
        self.dashboard_writable
            .iter()
            .filter_map(|k| values.get(*k).map(|v| ((*k).to_string(), v.clone())))
            .collect()
    }

    /// Read `command` and clear it in one locked call
    ///
    /// Returns `None` when no command is pending.
    #[must_use]
    pub fn take_command(&self) -> Option<String> {
        let mut values = self.values.lock().expect("store lock");
        let slot = values.get_mut(keys::COMMAND)?;
        match slot {
            Value::Str(s) if !s.is_empty() => {
                let command = std::mem::take(s);
                Some(command)
            }
            _ => None,
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn unknown_key_is_rejected() {
        let store = ConfigStore::new();
        store.set("bogus", true);
        assert!(store.get("bogus").is_none());
        // Other keys unaffected
        assert!(!store.get_bool(keys::CHAT_ENABLE));
    }

    #[test]
    fn tracked_key_audits_only_on_change() {
        let store = ConfigStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        store.set_audit_sink(Box::new(move |record| {
            assert_eq!(record.key, keys::GENERAL_VOLUME);
            assert_eq!(record.value, Value::Float(0.8));
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        // Unchanged value: no record
        store.set(keys::GENERAL_VOLUME, 0.5);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Changed value: exactly one record with the new value
        store.set(keys::GENERAL_VOLUME, 0.8);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn untracked_key_never_audits() {
        let store = ConfigStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        store.set_audit_sink(Box::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        store.set(keys::CHAT_ENABLE, true);
        store.set(keys::ANSWER, "hello");
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(store.get_bool(keys::CHAT_ENABLE));
    }

    #[test]
    fn take_command_clears_pending() {
        let store = ConfigStore::new();
        assert!(store.take_command().is_none());

        store.set(keys::COMMAND, "wake");
        assert_eq!(store.take_command().as_deref(), Some("wake"));
        assert!(store.take_command().is_none());
        assert_eq!(store.get_str(keys::COMMAND), "");
    }

    #[test]
    fn audit_file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config_state.log");

        let store = ConfigStore::new();
        store.audit_to_file(&path);
        store.set(keys::TIME_NOTIFY, false);
        store.set(keys::TIME_NOTIFY, false); // no change, no record

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let record: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record["key"], "time_notify");
        assert_eq!(record["value"], false);
    }
}
