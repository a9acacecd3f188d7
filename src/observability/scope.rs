//! ObservationScope for automatic begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` or `{name}_FAILED` when closed explicitly
//! - Logs `{name}_INCOMPLETE` if dropped without being closed
//!
//! All four are emitted inside the scope's span, so the span's fields
//! (including any recorded before closing) travel with every record.

use std::cell::Cell;
use std::time::Instant;

use tracing::Span;

/// A scope that logs its own begin and end.
///
/// ```ignore
/// let span = tracing::info_span!("source_load", base = 4, nodes = tracing::field::Empty);
/// let scope = ObservationScope::in_span("CACHE_SOURCE_LOAD", span);
/// // ... do work ...
/// scope.span().record("nodes", 42);
/// scope.complete();
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: Cell<bool>,
    span: Span,
    timer: Timer,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str) -> Self {
        Self::in_span(name, Span::current())
    }

    pub fn in_span(name: &'a str, span: Span) -> Self {
        span.in_scope(|| tracing::info!(event = %format!("{}_BEGIN", name)));
        Self {
            name,
            completed: Cell::new(false),
            span,
            timer: Timer::new(),
        }
    }

    /// The span the scope logs into; record result fields here before closing.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn complete(self) {
        self.completed.set(true);
        self.span.in_scope(|| {
            tracing::info!(
                event = %format!("{}_COMPLETE", self.name),
                elapsed_ms = self.timer.elapsed_ms(),
            )
        });
    }

    /// Logs `{name}_FAILED` at ERROR level.
    pub fn fail(self, reason: &str) {
        self.completed.set(true);
        self.span.in_scope(|| {
            tracing::error!(
                event = %format!("{}_FAILED", self.name),
                elapsed_ms = self.timer.elapsed_ms(),
                reason,
            )
        });
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            self.span.in_scope(|| {
                tracing::warn!(
                    event = %format!("{}_INCOMPLETE", self.name),
                    reason = "scope dropped without completion",
                )
            });
        }
    }
}

/// Elapsed-time helper for log fields.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_lifecycle() {
        let scope = ObservationScope::new("TEST");
        assert!(!scope.is_completed());
        scope.complete();
    }

    #[test]
    fn test_scope_in_span_records_and_fails() {
        let span = tracing::info_span!("test", key = "value", count = tracing::field::Empty);
        let scope = ObservationScope::in_span("TEST", span);
        scope.span().record("count", 3);
        scope.fail("something went wrong");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("TEST");
        drop(scope);
    }

    #[test]
    fn test_timer_monotonic() {
        let timer = Timer::new();
        let first = timer.elapsed_ms();
        assert!(timer.elapsed_ms() >= first);
    }
}
