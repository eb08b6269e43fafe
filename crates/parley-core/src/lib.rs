//! Business logic and port trait definitions for Parley.
//!
//! This crate owns the chat session aggregate and the two completion flows.
//! It defines the "ports" (`ChatRepository`, `LlmProvider`) that the
//! infrastructure layer implements, and depends only on `parley-types`,
//! never on `parley-infra` or any database/IO crate.

pub mod chat;
pub mod llm;
