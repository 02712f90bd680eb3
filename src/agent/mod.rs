//! The agent runtime: turn state machine, middleware pipeline, context
//! compactor, termination protocol, LLM provider adapters, trace sink, and
//! the environment-context/folder-structure scanner (spec.md §4).

pub mod compactor;
pub mod env_context;
pub mod message;
pub mod middleware;
pub mod provider;
pub mod runtime;
pub mod termination;
pub mod tracer;

pub use runtime::{AgentLoop, RunOutcome};
