use crate::rpc::client::RpcPeer;
use std::sync::Arc;

/// Answers partition ownership questions for one version.
///
/// Lookups happen per request; callers never cache the returned peers.
pub trait PartitionOracle: Send + Sync {
    /// Whether this node holds `partition` locally.
    fn have_local(&self, partition: u32) -> bool;

    /// Request/response peer addresses (`host:port`) holding `partition`.
    fn find_peers(&self, partition: u32) -> Vec<String>;

    /// Remote-procedure clients for the peers holding `partition`.
    fn find_rpc_peers(&self, partition: u32) -> Vec<Arc<dyn RpcPeer>>;
}
