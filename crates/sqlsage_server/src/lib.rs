//! Headless query service.
//!
//! Owns the process-scoped registries (pools, sessions, LLM binding,
//! hints) and exposes `QueryOrchestrator`, which runs the SQL agent on
//! a blocking worker under a hard deadline. Transport layers (HTTP,
//! RPC) sit on top of the typed request/response records in `api` and
//! are not part of this crate.

mod api;
mod context;
mod orchestrator;
mod sweeper;

pub use api::{ConversationTurn, QueryFailure, QueryRequest, QueryResponse};
pub use context::AppContext;
pub use orchestrator::{OrchestratorSettings, QueryOrchestrator};
pub use sweeper::Sweeper;

/// Initialize env-filtered logging. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
