//! Chat sessions and the completion flows that drive them.
//!
//! `ChatSession` is the aggregate enforcing the token budget. `ChatService`
//! runs one conversational turn against it, either blocking
//! (`complete`) or streamed (`complete_stream`).

pub mod completion;
pub mod locks;
pub mod repository;
pub mod service;
pub mod session;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;
