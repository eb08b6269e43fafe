//! LLM provider abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete provider implementations
//! - `BoxLlmProvider`: object-safe wrapper for dynamic dispatch
//! - `ModelRegistry`: resolves model names to token counters

pub mod box_provider;
pub mod provider;
pub mod tokenizer;
