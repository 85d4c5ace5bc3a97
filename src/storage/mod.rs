//! Local Storage Module
//!
//! The read side of the block storage that holds this node's partitions of a
//! version, plus the locator that decides which partitions a key may live in.
//!
//! ## Core Concepts
//! - **Locating**: `Locator` maps a key to a primary and an alternate partition.
//! - **Records**: `BlockRecord` owns a lazily read value stream of known length.
//! - **Access**: `BlockStore` serves point lookups by key and per-partition range scans.
//! - **Memory**: `MemoryBlockStore` is the partition-sharded in-memory implementation.

pub mod memory;
pub mod partitioner;
pub mod record;
pub mod store;

pub use memory::MemoryBlockStore;
pub use partitioner::{HashLocator, Locator};
pub use record::{BlockRecord, KeyValue};
pub use store::{BlockStore, KeyRange};
