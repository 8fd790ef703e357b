//! Data model for turn traces and their spans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which part of the turn loop a span covers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpanKind {
    /// Top-level turn (inbound event → final answer). Root of every trace.
    Turn,
    /// One iteration of the model/tool loop.
    Step,
    /// Safe-point live config application.
    ConfigApply,
    /// A language model request (including its one retry).
    LlmCall,
    /// A single tool call.
    ToolCall,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Turn => "turn",
            Self::Step => "step",
            Self::ConfigApply => "config_apply",
            Self::LlmCall => "llm_call",
            Self::ToolCall => "tool_call",
        };
        f.write_str(name)
    }
}

/// One timed section of a turn. Spans link to their parent by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    /// Parent span id (None for the turn span).
    pub parent_id: Option<String>,
    pub kind: SpanKind,
    /// Human-readable label (e.g. tool name, step index).
    pub label: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Set by [`Span::end`].
    pub duration_ms: Option<u64>,
    pub success: Option<bool>,
    /// Loop facts such as step index, revision or retries.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    /// Open a root span; call [`Span::with_parent`] for nested ones.
    pub fn new(kind: SpanKind, label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: None,
            kind,
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            success: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Close the span and stamp its duration.
    pub fn end(&mut self, success: bool) {
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(
            now.signed_duration_since(self.started_at)
                .num_milliseconds()
                .max(0) as u64,
        );
        self.success = Some(success);
    }
}

/// All spans of one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    /// Turn id this trace belongs to.
    pub turn_id: String,
    /// Agent that ran the turn.
    pub agent: String,
    /// All spans in this trace, in completion order.
    pub spans: Vec<Span>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trace {
    pub fn new(turn_id: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turn_id: turn_id.into(),
            agent: agent.into(),
            spans: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn add_span(&mut self, span: Span) {
        self.spans.push(span);
    }

    pub fn end(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// The root (turn) span, if recorded.
    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.parent_id.is_none())
    }

    /// Direct children of a span.
    pub fn children_of<'a>(&'a self, parent_id: &'a str) -> impl Iterator<Item = &'a Span> + 'a {
        self.spans
            .iter()
            .filter(move |s| s.parent_id.as_deref() == Some(parent_id))
    }

    pub fn count(&self, kind: SpanKind) -> usize {
        self.spans.iter().filter(|s| s.kind == kind).count()
    }

    /// True when every non-root span points at a span of this trace.
    pub fn is_connected(&self) -> bool {
        self.spans.iter().all(|s| match &s.parent_id {
            None => true,
            Some(p) => self.spans.iter().any(|other| &other.id == p),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_end_sets_duration_and_success() {
        let mut span = Span::new(SpanKind::LlmCall, "echo").with_meta("step", 0);
        span.end(true);
        assert_eq!(span.success, Some(true));
        assert!(span.duration_ms.is_some());
        assert_eq!(span.metadata["step"], 0);
    }

    #[test]
    fn trace_tracks_hierarchy() {
        let mut trace = Trace::new("turn-1", "planner");
        let turn = Span::new(SpanKind::Turn, "turn");
        let step = Span::new(SpanKind::Step, "step 0").with_parent(&turn.id);
        let tool = Span::new(SpanKind::ToolCall, "search").with_parent(&step.id);
        let step_id = step.id.clone();
        trace.add_span(tool);
        trace.add_span(step);
        trace.add_span(turn);

        assert!(trace.is_connected());
        assert_eq!(trace.root().map(|s| s.kind), Some(SpanKind::Turn));
        assert_eq!(trace.children_of(&step_id).count(), 1);
        assert_eq!(trace.count(SpanKind::Step), 1);
    }

    #[test]
    fn orphan_span_breaks_connectivity() {
        let mut trace = Trace::new("t", "a");
        trace.add_span(Span::new(SpanKind::Step, "step 0").with_parent("missing"));
        assert!(!trace.is_connected());
    }

    #[test]
    fn kind_names_match_serde() {
        assert_eq!(SpanKind::ConfigApply.to_string(), "config_apply");
        assert_eq!(SpanKind::ToolCall.to_string(), "tool_call");
        assert_eq!(serde_json::to_value(SpanKind::LlmCall).unwrap(), "llm_call");
    }
}
