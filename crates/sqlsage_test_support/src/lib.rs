//! Deterministic fakes and fixtures shared by unit and scenario tests.

mod fake_adapter;
mod fake_llm;
pub mod fixtures;

pub use fake_adapter::{FakeAdapter, FakeAdapterFactory, FakeAdapterStats, FakeQueryOutcome};
pub use fake_llm::{FakeLlm, FakeLlmReply};
