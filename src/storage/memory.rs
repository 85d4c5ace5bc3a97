use super::partitioner::Locator;
use super::record::{BlockRecord, KeyValue};
use super::store::{BlockStore, KeyRange};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// In-memory block store, sharded by partition.
///
/// Structure: `Partition ID -> ordered Key -> Value`, plus a key index so that
/// point lookups do not depend on which candidate partition the writer used.
pub struct MemoryBlockStore {
    local_data: Arc<DashMap<u32, BTreeMap<Vec<u8>, Bytes>>>,
    key_index: Arc<DashMap<Vec<u8>, u32>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self {
            local_data: Arc::new(DashMap::new()),
            key_index: Arc::new(DashMap::new()),
        }
    }

    /// Loads a JSON object of `key -> value` strings, keeping only the
    /// entries whose primary or alternate partition satisfies `keep`.
    pub fn load_json_file(
        path: &Path,
        locator: &dyn Locator,
        partition_count: u32,
        keep: impl Fn(u32) -> bool,
    ) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading dataset {}", path.display()))?;
        let entries: HashMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing dataset {}", path.display()))?;

        let store = Self::new();
        if partition_count == 0 {
            return Ok(store);
        }

        for (key, value) in entries {
            let (primary, alternate) = locator.locate(key.as_bytes(), partition_count);
            let partition = if keep(primary) {
                primary
            } else if keep(alternate) {
                alternate
            } else {
                continue;
            };
            store.store_local(partition, key.into_bytes(), Bytes::from(value.into_bytes()));
        }

        tracing::info!(
            "Loaded {} entries in {} partitions from {}",
            store.local_entry_count(),
            store.local_partition_count(),
            path.display()
        );
        Ok(store)
    }

    pub fn store_local(&self, partition: u32, key: Vec<u8>, value: Bytes) {
        self.key_index.insert(key.clone(), partition);
        self.local_data
            .entry(partition)
            .or_default()
            .insert(key, value);
    }

    #[cfg(test)]
    pub(crate) fn has_partition(&self, partition: u32) -> bool {
        self.local_data
            .get(&partition)
            .map(|map| !map.is_empty())
            .unwrap_or(false)
    }

    pub fn local_partition_count(&self) -> usize {
        self.local_data.len()
    }

    pub fn local_entry_count(&self) -> usize {
        self.local_data.iter().map(|entry| entry.value().len()).sum()
    }

    fn lookup(&self, key: &[u8]) -> Option<Bytes> {
        let partition = *self.key_index.get(key)?;
        self.local_data
            .get(&partition)
            .and_then(|map| map.get(key).cloned())
    }

    fn collect_range(&self, partition: u32, range: &KeyRange) -> Vec<KeyValue> {
        if range.start > range.end {
            return Vec::new();
        }

        // Copy out under the shard lock; sending happens without holding it.
        self.local_data
            .get(&partition)
            .map(|map| {
                map.range(range.start.clone()..=range.end.clone())
                    .map(|(key, value)| KeyValue {
                        key: key.clone(),
                        value: value.to_vec(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn get(&self, key: &[u8]) -> Result<Option<BlockRecord>> {
        Ok(self.lookup(key).map(BlockRecord::from_bytes))
    }

    async fn get_range(
        &self,
        partition: u32,
        range: &KeyRange,
        sink: mpsc::Sender<KeyValue>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let entries = self.collect_range(partition, range);
        tracing::debug!(
            "Scanning partition {}: {} entries in range",
            partition,
            entries.len()
        );

        for entry in entries {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(anyhow::anyhow!("scan of partition {} cancelled", partition));
                }
                sent = sink.send(entry) => {
                    if sent.is_err() {
                        return Err(anyhow::anyhow!(
                            "range sink closed while scanning partition {}",
                            partition
                        ));
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(anyhow::anyhow!("scan of partition {} cancelled", partition));
        }
        Ok(())
    }
}
