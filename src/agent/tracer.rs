//! Trace sink (spec.md §6, `TraceSink` in config/mod.rs): a structured record
//! of what the agent loop did, independent of `tracing`'s span/event output
//! (which still fires in parallel via `tracing::debug!`/`info!` in
//! `runtime.rs` — this is the in-process queryable record a caller can dump
//! after a run, e.g. for the CLI's `--log-dir-path`).

use serde::Serialize;
use std::sync::Mutex;

/// One traced event, tagged by what stage of the turn state machine produced
/// it (spec.md §4.1).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    TurnStarted { turn: u32 },
    ModelCalled { turn: u32, message_count: usize },
    ToolCalled { turn: u32, tool_name: String, parameters: serde_json::Value },
    ToolResult { turn: u32, tool_name: String, is_error: bool },
    Compaction { turn: u32, messages_before: usize, messages_after: usize },
    Terminated { turn: u32, reason: String },
}

/// Sink for trace events. `emit` is synchronous and infallible: tracing must
/// never be able to fail a run.
pub trait Tracer: Send + Sync {
    fn emit(&self, event: TraceEvent);

    /// Dump accumulated events as JSON, e.g. for `--log-dir-path`. Sinks that
    /// don't retain events (like `NullTracer`) return an empty array.
    fn dump(&self) -> serde_json::Value {
        serde_json::Value::Array(vec![])
    }
}

/// Default sink (`trace_sink = "memory"`): keeps every event in order, queryable
/// as a JSON array via `dump_traces`.
#[derive(Default)]
pub struct InMemoryTracer {
    events: Mutex<Vec<TraceEvent>>,
}

impl InMemoryTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dump_traces(&self) -> serde_json::Value {
        let events = self.events.lock().unwrap();
        serde_json::to_value(&*events).unwrap_or(serde_json::Value::Array(vec![]))
    }
}

impl Tracer for InMemoryTracer {
    fn emit(&self, event: TraceEvent) {
        tracing::debug!(?event, "agent trace event");
        self.events.lock().unwrap().push(event);
    }

    fn dump(&self) -> serde_json::Value {
        self.dump_traces()
    }
}

/// `trace_sink = "none"`: drops every event after forwarding it to `tracing`.
#[derive(Default)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn emit(&self, event: TraceEvent) {
        tracing::debug!(?event, "agent trace event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_tracer_accumulates_events_in_order() {
        let tracer = InMemoryTracer::new();
        tracer.emit(TraceEvent::TurnStarted { turn: 1 });
        tracer.emit(TraceEvent::Terminated { turn: 1, reason: "GOAL".into() });

        let dumped = tracer.dump_traces();
        let array = dumped.as_array().unwrap();
        assert_eq!(array.len(), 2);
        assert_eq!(array[0]["event"], "turn_started");
        assert_eq!(array[1]["event"], "terminated");
    }

    #[test]
    fn null_tracer_does_not_panic() {
        let tracer = NullTracer;
        tracer.emit(TraceEvent::TurnStarted { turn: 1 });
    }
}
