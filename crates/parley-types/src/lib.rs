//! Shared domain types for Parley.
//!
//! This crate contains the value types used across the Parley service:
//! models, chat messages, chat configuration, LLM request/response shapes,
//! application configuration, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
