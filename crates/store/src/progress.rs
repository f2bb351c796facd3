//! Structured progress reporting for store operations.
//!
//! Long vectorization runs emit one event per phase step so that a caller
//! can render progress without parsing logs.

use std::sync::Arc;
use std::time::Instant;

/// Progress event emitted during a store operation.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Phase of the operation: "plan", "embed", "commit", "scan"
    pub phase: &'static str,

    /// Current progress (batches embedded, chunks scanned, ...)
    pub current: u64,

    /// Total expected work (if known)
    pub total: Option<u64>,

    /// Percentage complete (0.0 - 100.0)
    pub percentage: Option<f64>,

    pub message: String,

    /// Elapsed time since the reporter was created
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(
        phase: &'static str,
        current: u64,
        total: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        let percentage =
            total.map(|t| if t > 0 { (current as f64 / t as f64) * 100.0 } else { 0.0 });

        Self {
            phase,
            current,
            total,
            percentage,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    pub fn with_elapsed(mut self, elapsed_secs: f64) -> Self {
        self.elapsed_secs = Some(elapsed_secs);
        self
    }

    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };

        let pct = self
            .percentage
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress reporter that emits events through a callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("enabled", &self.callback.is_some())
            .finish()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// Create a no-op reporter (no events emitted).
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(&self, event: ProgressEvent) {
        let Some(callback) = &self.callback else {
            return;
        };

        let elapsed = self.start_time.elapsed().as_secs_f64();
        let event = event.with_elapsed(elapsed);

        tracing::debug!(
            phase = event.phase,
            current = event.current,
            total = ?event.total,
            message = %event.message,
            elapsed_secs = elapsed,
            "Progress event"
        );

        callback(event);
    }

    /// Planning finished.
    pub fn plan(&self, pending: usize, batches: usize) {
        self.emit(ProgressEvent::new(
            "plan",
            batches as u64,
            Some(batches as u64),
            format!("{} entities pending in {} batches", pending, batches),
        ));
    }

    /// A batch is about to be sent to the model.
    pub fn embed(&self, batch: u64, total: u64, chunk_id: u32, size: usize) {
        self.emit(ProgressEvent::new(
            "embed",
            batch,
            Some(total),
            format!("chunk {} ({} entities)", chunk_id, size),
        ));
    }

    /// A batch was committed.
    pub fn commit(&self, batch: u64, total: u64, chunk_id: u32) {
        self.emit(ProgressEvent::new(
            "commit",
            batch,
            Some(total),
            format!("chunk {} committed", chunk_id),
        ));
    }

    /// A chunk was scanned by a query.
    pub fn scan(&self, scanned: u64, total: u64, chunk_id: u32) {
        self.emit(ProgressEvent::new(
            "scan",
            scanned,
            Some(total),
            format!("chunk {}", chunk_id),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_event_format() {
        let event = ProgressEvent::new("embed", 5, Some(10), "chunk 4 (50 entities)");
        let formatted = event.format_simple();
        assert!(formatted.contains("[embed]"));
        assert!(formatted.contains("5/10"));
        assert!(formatted.contains("50%"));
    }

    #[test]
    fn test_progress_reporter_emit() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let captured = events.clone();

        let reporter = ProgressReporter::new(Arc::new(move |event| {
            captured.lock().unwrap().push(event);
        }));

        reporter.commit(3, 10, 7);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].phase, "commit");
        assert_eq!(events[0].current, 3);
        assert!(events[0].elapsed_secs.is_some());
    }

    #[test]
    fn test_noop_reporter() {
        let reporter = ProgressReporter::noop();
        reporter.scan(1, 2, 0);
    }
}
