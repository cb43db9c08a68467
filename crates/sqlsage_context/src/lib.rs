//! Token-budgeted prompt assembly.
//!
//! A configured `max_tokens` selects one of four verbosity strategies;
//! each strategy splits the budget across the system prompt, schema,
//! conversation history, and error sections with fixed ratios. Every
//! section is truncated to its own budget, so the assembled prompt
//! never exceeds the configured window.

mod builder;
mod strategy;

pub use builder::ContextBuilder;
pub use strategy::{estimate_tokens, truncate_to_tokens, ContextStrategy, TokenBudget};
