//! Remote-Procedure Module
//!
//! The typed protocol: `GetKey` returns a whole `Record`, `GetRange` streams
//! records and ends with a terminal frame.
//!
//! ## Core Concepts
//! - **Protocol**: JSON DTOs with base64 keys and values, NDJSON range frames.
//! - **Client**: `RpcPeer` is how the routing code calls a peer; `HttpRpcClient`
//!   is its reqwest implementation.
//! - **Service**: point lookups, with the same routing and alternate-partition
//!   retry as the request/response path and an explicit deadline on every
//!   peer call.
//! - **Range**: the fan-out coordinator for multi-partition scans.

pub mod client;
pub mod handlers;
pub mod protocol;
pub mod range;
pub mod service;

pub use client::{HttpRpcClient, RpcPeer};
pub use protocol::{KeyRequest, RangeFrame, RangeRequest, Record, RpcErrorBody};
