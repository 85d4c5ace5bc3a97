//! Sharded Key-Value Serving Library
//!
//! This library crate defines the request-dispatch layer of a read-only,
//! sharded key-value serving tier. It serves as the foundation for the binary
//! executable (`main.rs`).
//!
//! ## Architecture Modules
//! Each node holds some partitions of an immutable dataset snapshot (a
//! `Version`) and resolves every request either locally or through a peer:
//!
//! - **`storage`**: The local side. Locates keys to partitions and serves point
//!   lookups and partition range scans from a block store.
//! - **`membership`**: Which partitions this node owns and which peers own the rest.
//! - **`version`**: The served snapshot and its local-vs-remote routing decision.
//! - **`proxy`**: Peer selection, the deadline-bounded attempt loop, and the
//!   request/response proxy with its single alternate-partition retry.
//! - **`serve`**: The request/response protocol (raw value bodies, status codes).
//! - **`rpc`**: The remote-procedure protocol (typed records, streamed ranges)
//!   including the range fan-out coordinator.
//! - **`server`**, **`config`**, **`error`**: Router, node configuration and
//!   the shared error taxonomy.

pub mod config;
pub mod error;
pub mod membership;
pub mod proxy;
pub mod rpc;
pub mod serve;
pub mod server;
pub mod storage;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;
