//! Request/Response Module
//!
//! Serves `GET /get/{db}/{key}` with the value as the raw response body.
//! Owned keys are streamed from local storage; other keys are proxied once
//! to a peer, and a request that was already proxied is never forwarded again.

pub mod handlers;
pub mod local;

pub use handlers::{handle_get, serve_key};
pub use local::serve_local;

/// First path segment of key lookups.
pub const ENDPOINT_GET_SEGMENT: &str = "get";
