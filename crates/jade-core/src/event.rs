//! Structured, append-only event log (SPEC_FULL.md §4.1, §6).
//!
//! Mirrors the original `StructuredLogEvent`: a fixed envelope of
//! timestamp/source/category/name/message plus a free-form `data` map that
//! must round-trip untouched regardless of which keys it carries.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const EVENT_CATEGORY_ERROR: &str = "Error";
pub const EVENT_CATEGORY_HPC: &str = "HPC";
pub const EVENT_CATEGORY_RESOURCE_UTIL: &str = "ResourceUtilization";

pub const EVENT_NAME_HPC_SUBMIT: &str = "hpc_submit";
pub const EVENT_NAME_HPC_JOB_ASSIGNED: &str = "hpc_job_assigned";
pub const EVENT_NAME_HPC_JOB_STATE_CHANGE: &str = "hpc_job_state_change";
pub const EVENT_NAME_UNHANDLED_ERROR: &str = "error";

/// One self-contained, structured log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: String,
    pub source: String,
    pub category: String,
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}

impl Event {
    pub fn new(source: impl Into<String>, category: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: now_timestamp(),
            source: source.into(),
            category: category.into(),
            name: name.into(),
            message: message.into(),
            data: serde_json::Map::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn hpc_submit(source: &str, batch_size: usize, num_blocked: usize, per_node_batch_size: usize) -> Self {
        Self::new(source, EVENT_CATEGORY_HPC, EVENT_NAME_HPC_SUBMIT, "Submitted HPC batch")
            .with_data("batch_size", batch_size as i64)
            .with_data("num_blocked", num_blocked as i64)
            .with_data("per_node_batch_size", per_node_batch_size as i64)
    }

    pub fn hpc_job_assigned(source: &str, job_id: &str) -> Self {
        Self::new(source, EVENT_CATEGORY_HPC, EVENT_NAME_HPC_JOB_ASSIGNED, "HPC job assigned")
            .with_data("job_id", job_id.to_string())
    }

    pub fn hpc_job_state_change(source: &str, job_id: &str, old_state: &str, new_state: &str) -> Self {
        Self::new(source, EVENT_CATEGORY_HPC, EVENT_NAME_HPC_JOB_STATE_CHANGE, "HPC job state change")
            .with_data("job_id", job_id.to_string())
            .with_data("old_state", old_state.to_string())
            .with_data("new_state", new_state.to_string())
    }
}

/// Append-only sink for structured events. Implementations must never make
/// the caller handle a write failure — best-effort, logged, not fatal.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// No-op sink, used where events aren't of interest (e.g. unit tests that
/// only exercise the batch packer).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

/// In-memory sink for assertions in tests.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub fn events_named(&self, name: &str) -> Vec<Event> {
        self.events().into_iter().filter(|e| e.name == name).collect()
    }

    pub fn unique_batch_sources(&self) -> HashSet<String> {
        self.events().into_iter().map(|e| e.source).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}

/// Appends one JSON line per event to a file, matching the
/// `<output>/<name>_events.log` newline-delimited-JSON format (SPEC_FULL.md
/// §6). A write failure is logged and swallowed — the event stream is
/// best-effort observational data, never authoritative state.
pub struct FileEventSink {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for FileEventSink {
    fn emit(&self, event: Event) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize event, dropping");
                return;
            }
        };

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(e) => {
                tracing::warn!(error = %e, "event log mutex poisoned, dropping event");
                return;
            }
        };

        if let Err(e) = writeln!(file, "{line}") {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to append event");
        }
    }
}

/// Parse a newline-delimited-JSON event log, sorted by timestamp, as
/// required by the testable "read-back" invariant (SPEC_FULL.md §8).
pub fn read_event_log(path: impl AsRef<Path>) -> std::io::Result<Vec<Event>> {
    let contents = std::fs::read_to_string(path)?;
    let mut events: Vec<Event> = contents
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    Ok(events)
}
