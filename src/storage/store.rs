use super::record::{BlockRecord, KeyValue};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// An inclusive key range `[start, end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }
}

/// Block storage holding the partitions of one version that this node owns.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Looks a key up regardless of which candidate partition holds it.
    async fn get(&self, key: &[u8]) -> Result<Option<BlockRecord>>;

    /// Streams every entry of `partition` inside `range` into `sink`.
    ///
    /// Fails when `cancel` fires or the sink is closed before the scan
    /// finished, so a truncated scan is never reported as complete.
    async fn get_range(
        &self,
        partition: u32,
        range: &KeyRange,
        sink: mpsc::Sender<KeyValue>,
        cancel: CancellationToken,
    ) -> Result<()>;
}
