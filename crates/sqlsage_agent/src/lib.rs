//! The SQL generation agent.
//!
//! One `run()` drives a small state machine through generate →
//! validate → execute, analyzing failures and retrying with structured
//! error feedback until it succeeds, exhausts its retry budget, or is
//! cancelled. All mutable state lives in a single `AgentState` owned by
//! the running agent; errors travel through it as data, never as
//! unwinding.

mod analyzer;
mod machine;
mod state;
mod validate;

pub use analyzer::{similar_names, ErrorAnalyzer};
pub use machine::{AgentPhase, SqlAgent};
pub use state::{AgentInput, AgentOutcome, AgentState};
pub use validate::{validate_sql, ValidationError};
