//! Structured logging helpers.
//!
//! Provides operation timing for the hot paths (matching, import batches)
//! with structured `tracing` fields.

use std::time::Instant;

/// Operation timer for measuring and logging execution duration.
///
/// Logs the operation start at debug level and the completion with its
/// duration.
#[derive(Debug)]
pub struct OpTimer {
    /// Component being timed (e.g. "matcher", "importer").
    component: &'static str,
    /// Operation being performed (e.g. "match_message").
    operation: &'static str,
    /// Start time of the operation.
    start: Instant,
}

impl OpTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        tracing::debug!(component, operation, "Operation started");
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }

    /// Finishes the timer and logs the duration.
    pub fn finish(self) {
        let duration_ms = self.start.elapsed().as_millis();
        tracing::debug!(
            component = self.component,
            operation = self.operation,
            duration_ms,
            "Operation completed"
        );
    }

    /// Finishes the timer with result-aware logging.
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: Result<&T, &E>) {
        let duration_ms = self.start.elapsed().as_millis();
        match result {
            Ok(_) => {
                tracing::debug!(
                    component = self.component,
                    operation = self.operation,
                    duration_ms,
                    "Operation completed successfully"
                );
            }
            Err(e) => {
                tracing::error!(
                    component = self.component,
                    operation = self.operation,
                    duration_ms,
                    error = %e,
                    "Operation failed"
                );
            }
        }
    }
}
