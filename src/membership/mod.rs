//! Membership Module
//!
//! Tracks which partitions of the current version this node owns and which
//! peers own the rest.
//!
//! ## Core Concepts
//! - **Oracle**: `PartitionOracle` is the only view of topology the routing code uses.
//! - **Static membership**: `MembershipService` is built from configuration and
//!   answers lookups from concurrent maps, with no writes on the request path.
//! - **Per-protocol peers**: request/response peers are addresses, remote-procedure
//!   peers are `RpcPeer` clients.

pub mod oracle;
pub mod service;
pub mod types;

pub use oracle::PartitionOracle;
pub use service::MembershipService;
pub use types::{Node, NodeId};
