//! HTTP API layer for pollhub.
//!
//! This crate provides the REST API and real-time streaming:
//!
//! - **Endpoints**: room polls, global polls and voting under `/api`
//! - **Extractors**: bearer-token identity
//! - **Middleware**: application state and authentication
//! - **Streaming**: the poll room WebSocket protocol at `/streaming`
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod streaming;

pub use endpoints::router;
pub use middleware::AppState;
pub use streaming::streaming_handler;
