//! Fakes of the consumed seams, shared by the module tests.

use crate::error::PeerError;
use crate::membership::PartitionOracle;
use crate::proxy::{PeerRequest, PeerResponse, PeerTransport};
use crate::rpc::client::RpcPeer;
use crate::rpc::protocol::{KeyRequest, RangeRequest, Record};
use crate::storage::{BlockStore, Locator, MemoryBlockStore};
use crate::version::Version;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use futures_util::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const VERSION_NAME: &str = "v1";
pub const DB_NAME: &str = "books";

/// Locator answering from a fixed table, `(0, 0)` for unknown keys.
#[derive(Default)]
pub struct FixedLocator {
    table: HashMap<Vec<u8>, (u32, u32)>,
    calls: AtomicUsize,
}

impl FixedLocator {
    pub fn new(entries: &[(&str, (u32, u32))]) -> Self {
        Self {
            table: entries
                .iter()
                .map(|(key, located)| (key.as_bytes().to_vec(), *located))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Adds a key that is not necessarily UTF-8.
    pub fn locating(mut self, key: &[u8], located: (u32, u32)) -> Self {
        self.table.insert(key.to_vec(), located);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Locator for FixedLocator {
    fn locate(&self, key: &[u8], _partition_count: u32) -> (u32, u32) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table.get(key).copied().unwrap_or((0, 0))
    }
}

#[derive(Default)]
pub struct StaticOracle {
    local: HashSet<u32>,
    peers: HashMap<u32, Vec<String>>,
    rpc_peers: HashMap<u32, Vec<Arc<dyn RpcPeer>>>,
}

impl StaticOracle {
    pub fn owning(partitions: &[u32]) -> Self {
        Self {
            local: partitions.iter().copied().collect(),
            ..Default::default()
        }
    }

    pub fn with_peers(mut self, partition: u32, peers: &[&str]) -> Self {
        self.peers
            .insert(partition, peers.iter().map(|p| p.to_string()).collect());
        self
    }

    pub fn with_rpc_peer(mut self, partition: u32, peer: Arc<dyn RpcPeer>) -> Self {
        self.rpc_peers.entry(partition).or_default().push(peer);
        self
    }
}

impl PartitionOracle for StaticOracle {
    fn have_local(&self, partition: u32) -> bool {
        self.local.contains(&partition)
    }

    fn find_peers(&self, partition: u32) -> Vec<String> {
        self.peers.get(&partition).cloned().unwrap_or_default()
    }

    fn find_rpc_peers(&self, partition: u32) -> Vec<Arc<dyn RpcPeer>> {
        self.rpc_peers.get(&partition).cloned().unwrap_or_default()
    }
}

pub fn store_with(entries: &[(u32, &str, &str)]) -> MemoryBlockStore {
    let store = MemoryBlockStore::new();
    for (partition, key, value) in entries {
        store.store_local(
            *partition,
            key.as_bytes().to_vec(),
            Bytes::from(value.to_string()),
        );
    }
    store
}

pub fn version(
    partition_count: u32,
    locator: Arc<dyn Locator>,
    oracle: StaticOracle,
    store: impl BlockStore + 'static,
) -> Version {
    Version {
        name: VERSION_NAME.to_string(),
        created: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        partition_count,
        db_name: DB_NAME.to_string(),
        oracle: Arc::new(oracle),
        store: Arc::new(store),
        locator,
    }
}

// ============================================================
// REQUEST/RESPONSE PEERS
// ============================================================

#[derive(Debug, Clone)]
pub enum PeerBehavior {
    /// 200 with this body, tagged with the peer's version.
    Serve(&'static str),
    /// Serve after a delay.
    Slow(Duration, &'static str),
    NotFound,
    Fail,
    Hang,
    /// 200 headers, then a body that sends one chunk and never finishes.
    Stall,
}

/// Transport answering per peer address and recording every call as
/// `(peer, marker token)`.
#[derive(Default)]
pub struct FakeTransport {
    behaviors: HashMap<String, PeerBehavior>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeTransport {
    pub fn new(behaviors: &[(&str, PeerBehavior)]) -> Self {
        Self {
            behaviors: behaviors
                .iter()
                .map(|(peer, behavior)| (peer.to_string(), behavior.clone()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called_peers(&self) -> Vec<String> {
        self.calls().into_iter().map(|(peer, _)| peer).collect()
    }
}

fn peer_response(status: StatusCode, body: &'static str) -> PeerResponse {
    PeerResponse {
        status,
        version: Some("peer-v7".to_string()),
        content_length: Some(body.len() as u64),
        body: futures_util::stream::once(async move {
            Ok::<_, std::io::Error>(Bytes::from_static(body.as_bytes()))
        })
        .boxed(),
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn fetch(&self, peer: &str, request: PeerRequest<'_>) -> Result<PeerResponse, PeerError> {
        self.calls
            .lock()
            .unwrap()
            .push((peer.to_string(), request.marker.as_token().to_string()));

        match self.behaviors.get(peer).cloned().unwrap_or(PeerBehavior::Fail) {
            PeerBehavior::Serve(body) => Ok(peer_response(StatusCode::OK, body)),
            PeerBehavior::Slow(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(peer_response(StatusCode::OK, body))
            }
            PeerBehavior::NotFound => Ok(peer_response(StatusCode::NOT_FOUND, "key not found")),
            PeerBehavior::Fail => Err(PeerError::Failed("connection refused".to_string())),
            PeerBehavior::Hang => std::future::pending().await,
            PeerBehavior::Stall => Ok(PeerResponse {
                status: StatusCode::OK,
                version: Some("peer-v7".to_string()),
                content_length: None,
                body: futures_util::stream::once(async {
                    Ok::<_, std::io::Error>(Bytes::from_static(b"par"))
                })
                .chain(futures_util::stream::pending())
                .boxed(),
            }),
        }
    }
}

// ============================================================
// REMOTE-PROCEDURE PEERS
// ============================================================

#[derive(Debug, Clone)]
pub enum RpcBehavior {
    Value(&'static str),
    NotFound,
    Fail,
    Hang,
    /// Streams these `(key, value)` pairs, then completes.
    Range(Vec<(&'static str, &'static str)>),
    /// Streams these pairs, then fails.
    RangeThenFail(Vec<(&'static str, &'static str)>),
}

pub struct FakeRpcPeer {
    id: String,
    behavior: RpcBehavior,
    key_calls: Mutex<Vec<KeyRequest>>,
    range_calls: Mutex<Vec<RangeRequest>>,
}

impl FakeRpcPeer {
    pub fn new(id: &str, behavior: RpcBehavior) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behavior,
            key_calls: Mutex::new(Vec::new()),
            range_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn key_calls(&self) -> Vec<KeyRequest> {
        self.key_calls.lock().unwrap().clone()
    }

    pub fn range_calls(&self) -> Vec<RangeRequest> {
        self.range_calls.lock().unwrap().clone()
    }
}

async fn send_pairs(sink: &mpsc::Sender<Record>, pairs: &[(&str, &str)]) -> Result<(), PeerError> {
    for (key, value) in pairs {
        let record = Record::local(key.as_bytes().to_vec(), value.as_bytes().to_vec(), "peer-v7");
        sink.send(record)
            .await
            .map_err(|_| PeerError::Failed("sink closed".to_string()))?;
    }
    Ok(())
}

#[async_trait]
impl RpcPeer for FakeRpcPeer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_key(&self, request: KeyRequest) -> Result<Record, PeerError> {
        self.key_calls.lock().unwrap().push(request.clone());

        match &self.behavior {
            RpcBehavior::Value(value) => Ok(Record::local(
                request.key,
                value.as_bytes().to_vec(),
                "peer-v7",
            )),
            RpcBehavior::NotFound => Err(PeerError::NotFound),
            RpcBehavior::Hang => std::future::pending().await,
            _ => Err(PeerError::Failed("connection refused".to_string())),
        }
    }

    async fn get_range(
        &self,
        request: RangeRequest,
        sink: mpsc::Sender<Record>,
    ) -> Result<(), PeerError> {
        self.range_calls.lock().unwrap().push(request);

        match &self.behavior {
            RpcBehavior::Range(pairs) => send_pairs(&sink, pairs).await,
            RpcBehavior::RangeThenFail(pairs) => {
                send_pairs(&sink, pairs).await?;
                Err(PeerError::Failed("connection reset".to_string()))
            }
            RpcBehavior::Hang => std::future::pending().await,
            _ => Err(PeerError::Failed("connection refused".to_string())),
        }
    }
}
