//! Append-only error sink.
//!
//! Every failure in a run — failed extraction attempts, malformed cards,
//! archival collisions — is appended to `errors/errors.log` before it is
//! folded into an outcome. Terminal output stays a summary; the sink holds
//! the full diagnostic record, including raw backend responses when
//! available.
//!
//! The sink is process-scoped and lives from orchestrator start to the end
//! of the run. Appends are serialized through a mutex so concurrent chunk
//! workers never interleave records. One JSON object per line.

use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::warn;

/// One diagnostic record.
#[derive(Debug, Clone, Serialize)]
pub struct SinkRecord {
    /// RFC 3339 UTC timestamp, stamped at append time.
    pub timestamp: String,
    /// Component or backend that reported the failure.
    pub source: String,
    /// Human-readable failure description.
    pub message: String,
    /// Raw backend response body, when one was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Document being processed, empty for run-level failures.
    pub document: String,
    /// Prompt in use, empty when not applicable.
    pub prompt: String,
}

impl SinkRecord {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: String::new(),
            source: source.into(),
            message: message.into(),
            raw_response: None,
            document: String::new(),
            prompt: String::new(),
        }
    }

    pub fn document(mut self, document: impl Into<String>) -> Self {
        self.document = document.into();
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }
}

/// Append-only JSONL log, safe for concurrent writers.
#[derive(Debug)]
pub struct ErrorSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl ErrorSink {
    /// Open (or create) `errors.log` inside `dir` for appending.
    pub fn open(dir: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("errors.log");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Sink failures are logged and swallowed — a broken
    /// diagnostic channel must not take the pipeline down with it.
    pub fn append(&self, mut record: SinkRecord) {
        record.timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(err) => {
                warn!("Error sink: failed to serialize record: {err}");
                return;
            }
        };

        let mut file = match self.file.lock() {
            Ok(file) => file,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(err) = writeln!(file, "{line}") {
            warn!("Error sink: failed to append to {}: {err}", self.path.display());
        }
    }
}
