//! Version
//!
//! An immutable snapshot of one database, as served by this node. A version is
//! created when a snapshot is loaded and is only ever read by the routing code,
//! so it is shared between requests behind an `Arc` without locking.

use crate::error::{Result, ServeError};
use crate::membership::PartitionOracle;
use crate::storage::{BlockStore, Locator};

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Header carrying the name of the version that produced a response.
pub const VERSION_HEADER: &str = "x-shardserve-version";
/// Header carrying the identity of the peer that served a proxied response.
pub const PROXY_HEADER: &str = "x-shardserve-proxied-to";

/// Where a key should be served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Local,
    Remote { primary: u32, alternate: u32 },
}

pub struct Version {
    pub name: String,
    pub created: DateTime<Utc>,
    pub partition_count: u32,
    pub db_name: String,
    pub oracle: Arc<dyn PartitionOracle>,
    pub store: Arc<dyn BlockStore>,
    pub locator: Arc<dyn Locator>,
}

impl Version {
    /// Candidate partitions of `key`. Callers must have checked
    /// `partition_count` first.
    pub fn locate(&self, key: &[u8]) -> (u32, u32) {
        self.locator.locate(key, self.partition_count)
    }

    /// Decides between local service and proxying.
    ///
    /// A version without partitions has no data at all, and fails before the
    /// locator is consulted.
    pub fn route(&self, key: &[u8]) -> Result<Route> {
        if self.partition_count == 0 {
            return Err(ServeError::NotFound);
        }

        let (primary, alternate) = self.locate(key);
        if self.oracle.have_local(primary) || self.oracle.have_local(alternate) {
            Ok(Route::Local)
        } else {
            Ok(Route::Remote { primary, alternate })
        }
    }

    /// `/db/key (version name)`, for log lines.
    pub fn describe(&self, key: &[u8]) -> String {
        format!(
            "/{}/{} (version {})",
            self.db_name,
            String::from_utf8_lossy(key),
            self.name
        )
    }

    /// Creation time as an HTTP date (RFC 1123, GMT).
    pub fn last_modified(&self) -> String {
        self.created.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

impl std::fmt::Debug for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Version")
            .field("name", &self.name)
            .field("db_name", &self.db_name)
            .field("partition_count", &self.partition_count)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}
