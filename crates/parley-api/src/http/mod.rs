//! HTTP API layer for Parley.
//!
//! Axum-based API exposing the blocking and streaming completion flows,
//! with optional token authentication and CORS support.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
