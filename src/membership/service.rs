use super::oracle::PartitionOracle;
use super::types::{Node, NodeId};
use crate::rpc::client::{HttpRpcClient, RpcPeer};

use dashmap::{DashMap, DashSet};
use std::sync::Arc;

/// Static view of partition ownership for one version.
///
/// Built from configuration when a version is loaded. Remote owners are kept
/// per partition; remote-procedure clients are created once per member and
/// share one connection pool.
pub struct MembershipService {
    pub local_node: NodeId,
    local_partitions: DashSet<u32>,
    owners: DashMap<u32, Vec<Node>>,
    members: DashMap<NodeId, Node>,
    rpc_clients: DashMap<NodeId, Arc<HttpRpcClient>>,
    http_client: reqwest::Client,
}

impl MembershipService {
    pub fn new(local_node: NodeId, local_partitions: impl IntoIterator<Item = u32>) -> Arc<Self> {
        Self::with_client(local_node, local_partitions, reqwest::Client::new())
    }

    pub fn with_client(
        local_node: NodeId,
        local_partitions: impl IntoIterator<Item = u32>,
        http_client: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            local_node,
            local_partitions: local_partitions.into_iter().collect(),
            owners: DashMap::new(),
            members: DashMap::new(),
            rpc_clients: DashMap::new(),
            http_client,
        })
    }

    /// Registers a remote member. The local node is never its own peer.
    pub fn add_member(&self, node: Node) {
        if node.id == self.local_node {
            tracing::warn!("Ignoring local node {} listed as a peer", node.id);
            return;
        }

        if self.members.contains_key(&node.id) {
            for mut owners in self.owners.iter_mut() {
                owners.retain(|existing| existing.id != node.id);
            }
        }
        for partition in &node.partitions {
            self.owners
                .entry(*partition)
                .or_default()
                .push(node.clone());
        }

        tracing::info!(
            "Registered peer {} at {} ({} partitions)",
            node.id,
            node.addr,
            node.partitions.len()
        );
        self.rpc_clients.remove(&node.id);
        self.members.insert(node.id.clone(), node);
    }

    #[cfg(test)]
    pub(crate) fn get_member(&self, id: &NodeId) -> Option<Node> {
        self.members.get(id).map(|entry| entry.value().clone())
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn local_partitions(&self) -> Vec<u32> {
        let mut partitions: Vec<u32> = self.local_partitions.iter().map(|p| *p).collect();
        partitions.sort_unstable();
        partitions
    }

    fn owners_of(&self, partition: u32) -> Vec<Node> {
        self.owners
            .get(&partition)
            .map(|owners| owners.value().clone())
            .unwrap_or_default()
    }

    fn rpc_client(&self, node: &Node) -> Arc<HttpRpcClient> {
        self.rpc_clients
            .entry(node.id.clone())
            .or_insert_with(|| {
                Arc::new(HttpRpcClient::new(
                    node.id.0.clone(),
                    &node.addr,
                    self.http_client.clone(),
                ))
            })
            .value()
            .clone()
    }
}

impl PartitionOracle for MembershipService {
    fn have_local(&self, partition: u32) -> bool {
        self.local_partitions.contains(&partition)
    }

    fn find_peers(&self, partition: u32) -> Vec<String> {
        self.owners_of(partition)
            .into_iter()
            .map(|node| node.addr)
            .collect()
    }

    fn find_rpc_peers(&self, partition: u32) -> Vec<Arc<dyn RpcPeer>> {
        self.owners_of(partition)
            .iter()
            .map(|node| self.rpc_client(node) as Arc<dyn RpcPeer>)
            .collect()
    }
}
