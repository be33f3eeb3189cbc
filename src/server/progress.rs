//! Upload progress tracking shared between the upload handler and the
//! progress endpoint.

use parking_lot::Mutex;
use serde::Serialize;

/// Most recent per-file status messages kept for the progress endpoint.
const MAX_STATUS_LINES: usize = 100;

/// Snapshot returned by `/upload-progress`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub processed: u64,
    pub indexed: u64,
    pub status: Vec<String>,
}

/// Cumulative upload counters.
#[derive(Debug, Default)]
pub struct UploadProgress {
    inner: Mutex<ProgressSnapshot>,
}

impl UploadProgress {
    pub fn new() -> Self {
        UploadProgress::default()
    }

    /// Register `count` newly received files.
    pub fn begin(&self, count: u64) {
        self.inner.lock().total += count;
    }

    /// Record one finished file (indexed or failed) with a status line.
    pub fn finish(&self, indexed: bool, message: String) {
        let mut inner = self.inner.lock();
        inner.processed += 1;
        if indexed {
            inner.indexed += 1;
        }
        inner.status.push(message);
        if inner.status.len() > MAX_STATUS_LINES {
            let excess = inner.status.len() - MAX_STATUS_LINES;
            inner.status.drain(..excess);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let progress = UploadProgress::new();
        progress.begin(2);
        progress.finish(true, "doc 1 indexed".to_string());
        progress.finish(false, "doc 2 failed".to_string());

        let snapshot = progress.snapshot();
        assert_eq!(snapshot.total, 2);
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.indexed, 1);
        assert_eq!(snapshot.status.len(), 2);
    }

    #[test]
    fn test_status_lines_bounded() {
        let progress = UploadProgress::new();
        progress.begin(200);
        for i in 0..200 {
            progress.finish(true, format!("doc {i}"));
        }
        let snapshot = progress.snapshot();
        assert_eq!(snapshot.status.len(), MAX_STATUS_LINES);
        assert_eq!(snapshot.status.last().unwrap(), "doc 199");
    }
}
