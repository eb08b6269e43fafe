//! Infrastructure layer for Parley.
//!
//! Implements the ports defined in `parley-core`: the SQLite session store
//! and the OpenAI-compatible LLM provider. Also loads `config.toml`.

pub mod config;
pub mod llm;
pub mod sqlite;
