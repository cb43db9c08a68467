//! LLM capability: dialect-aware SQL generation and structured JSON
//! generation, independent of vendor.
//!
//! Three providers are supported over plain HTTP: OpenAI, vLLM (an
//! OpenAI-compatible chat endpoint), and Ollama. All responses go
//! through the same extraction ladder, so a vendor that wraps its JSON
//! in prose or code fences still yields a usable result.

mod capability;
mod extract;
mod provider;

pub use capability::{
    ChatMessage, LlmCapability, LlmError, LlmService, SqlGeneration, SqlGenerationRequest,
};
pub use extract::{extract_json, extract_sql_generation};
pub use provider::{LlmClient, LlmProvider};
