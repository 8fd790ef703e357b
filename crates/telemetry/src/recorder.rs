//! Thread-safe trace recorder shared by all agent instances of a runtime.

use crate::model::{Span, Trace};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Completed traces beyond this count are pruned oldest-first.
const MAX_TRACES: usize = 5_000;

/// Collects turn traces.
///
/// Thread-safe via `RwLock`. Spans are recorded once complete, so a span is
/// never observed half-written.
#[derive(Debug, Default)]
pub struct TraceRecorder {
    traces: RwLock<Vec<Trace>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Trace>> {
        self.traces.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Trace>> {
        self.traces.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a new trace for a turn. Returns the trace id.
    pub fn start_trace(&self, turn_id: &str, agent: &str) -> String {
        let trace = Trace::new(turn_id, agent);
        let id = trace.id.clone();
        let mut traces = self.write();

        if traces.len() >= MAX_TRACES {
            let drain_count = MAX_TRACES / 10;
            let mut removed = 0;
            traces.retain(|t| {
                if removed >= drain_count || t.ended_at.is_none() {
                    return true;
                }
                removed += 1;
                false
            });
        }

        traces.push(trace);
        id
    }

    /// Record a completed span in a trace.
    pub fn record_span(&self, trace_id: &str, span: Span) {
        debug!(
            trace = trace_id,
            kind = %span.kind,
            label = %span.label,
            duration_ms = span.duration_ms.unwrap_or(0),
            success = span.success.unwrap_or(false),
            "Span recorded"
        );
        let mut traces = self.write();
        match traces.iter_mut().find(|t| t.id == trace_id) {
            Some(trace) => trace.add_span(span),
            None => warn!(trace = trace_id, "Dropping span for unknown trace"),
        }
    }

    /// Mark a trace as ended.
    pub fn end_trace(&self, trace_id: &str) {
        if let Some(trace) = self.write().iter_mut().find(|t| t.id == trace_id) {
            trace.end();
        }
    }

    pub fn get_trace(&self, trace_id: &str) -> Option<Trace> {
        self.read().iter().find(|t| t.id == trace_id).cloned()
    }

    /// The trace recorded for a turn.
    pub fn trace_for_turn(&self, turn_id: &str) -> Option<Trace> {
        self.read().iter().find(|t| t.turn_id == turn_id).cloned()
    }

    /// Most recent traces, newest first.
    pub fn recent_traces(&self, limit: usize) -> Vec<Trace> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn trace_count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpanKind;

    #[test]
    fn records_spans_under_their_trace() {
        let recorder = TraceRecorder::new();
        let trace_id = recorder.start_trace("turn-1", "planner");

        let mut root = Span::new(SpanKind::Turn, "turn");
        let mut step = Span::new(SpanKind::Step, "step 0").with_parent(&root.id);
        step.end(true);
        root.end(true);
        recorder.record_span(&trace_id, step);
        recorder.record_span(&trace_id, root);
        recorder.end_trace(&trace_id);

        let trace = recorder.trace_for_turn("turn-1").unwrap();
        assert_eq!(trace.spans.len(), 2);
        assert!(trace.ended_at.is_some());
        assert!(trace.is_connected());
    }

    #[test]
    fn unknown_trace_is_ignored() {
        let recorder = TraceRecorder::new();
        recorder.record_span("nope", Span::new(SpanKind::Step, "x"));
        assert_eq!(recorder.trace_count(), 0);
    }

    #[test]
    fn recent_traces_are_newest_first() {
        let recorder = TraceRecorder::new();
        recorder.start_trace("a", "x");
        recorder.start_trace("b", "x");
        let recent = recorder.recent_traces(1);
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].turn_id, "b");
    }
}
