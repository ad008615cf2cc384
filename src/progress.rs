//! Indexing progress reporting.
//!
//! Two consumers see progress. Interactive runs get per-file events through a
//! [`ProgressReporter`] writing to **stderr** so stdout stays parseable for
//! scripts. Background jobs get a shared [`ProgressHandle`] that the indexer
//! updates and callers poll for a [`IndexProgress`] snapshot.

use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, RwLock};

/// Lifecycle of an indexing job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job accepted, file discovery not finished.
    Starting,
    /// Files are being processed. Counts are meaningful.
    Running,
    Completed,
    Error,
}

/// Snapshot of a job's progress.
#[derive(Clone, Debug, Serialize)]
pub struct IndexProgress {
    pub status: JobStatus,
    pub processed: u64,
    pub total: u64,
    pub errors: u64,
}

impl IndexProgress {
    fn new() -> Self {
        Self {
            status: JobStatus::Starting,
            processed: 0,
            total: 0,
            errors: 0,
        }
    }
}

/// Shared, pollable progress state for a background job.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<RwLock<IndexProgress>>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(IndexProgress::new())),
        }
    }

    pub fn snapshot(&self) -> IndexProgress {
        self.inner.read().expect("progress lock poisoned").clone()
    }

    /// Discovery finished; switch to Running with a known total.
    pub fn begin(&self, total: u64) {
        let mut p = self.inner.write().expect("progress lock poisoned");
        p.status = JobStatus::Running;
        p.total = total;
    }

    pub fn advance(&self, failed: bool) {
        let mut p = self.inner.write().expect("progress lock poisoned");
        p.processed += 1;
        if failed {
            p.errors += 1;
        }
    }

    pub fn finish(&self, status: JobStatus) {
        let mut p = self.inner.write().expect("progress lock poisoned");
        p.status = status;
    }
}

impl Default for ProgressHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// A single progress event for an interactive indexing run.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Walking the tree; no total yet.
    Discovering,
    /// Processing file n of total.
    Indexing { n: u64, total: u64, path: String },
}

/// Reports indexing progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "index  12 / 340  docs/notes.md".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Discovering => "index  discovering...\n".to_string(),
            ProgressEvent::Indexing { n, total, path } => {
                format!(
                    "index  {} / {}  {}\n",
                    format_number(*n),
                    format_number(*total),
                    path
                )
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Discovering => serde_json::json!({
                "event": "progress",
                "phase": "discovering"
            }),
            ProgressEvent::Indexing { n, total, path } => serde_json::json!({
                "event": "progress",
                "phase": "indexing",
                "n": n,
                "total": total,
                "path": path
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn handle_tracks_lifecycle() {
        let handle = ProgressHandle::new();
        assert_eq!(handle.snapshot().status, JobStatus::Starting);

        handle.begin(3);
        let p = handle.snapshot();
        assert_eq!(p.status, JobStatus::Running);
        assert_eq!(p.total, 3);

        handle.advance(false);
        handle.advance(true);
        let p = handle.snapshot();
        assert_eq!(p.processed, 2);
        assert_eq!(p.errors, 1);

        handle.finish(JobStatus::Completed);
        assert_eq!(handle.snapshot().status, JobStatus::Completed);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Starting).unwrap(),
            "\"starting\""
        );
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }
}
