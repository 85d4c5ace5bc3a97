//! Point lookups over the remote-procedure protocol.
//!
//! Same routing decisions as the request/response path, but the value is
//! materialized and returned inline as a `Record`.

use super::client::RpcPeer;
use super::protocol::{KeyRequest, Record, budget};
use crate::error::{PeerError, Result, ServeError};
use crate::proxy::{ProxyCoordinator, ProxyMarker, try_peers};
use crate::version::{Route, Version};

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Serves `request` from local storage or from the peers owning its key.
///
/// `default_budget` applies when the caller did not send a deadline.
pub async fn get_key(
    version: &Version,
    coordinator: &ProxyCoordinator,
    request: KeyRequest,
    default_budget: Duration,
) -> Result<Record> {
    if version.partition_count == 0 {
        return Err(ServeError::NoAvailablePeers);
    }

    match version.route(&request.key)? {
        Route::Local => get_local(version, request.key).await,
        Route::Remote { primary, alternate } => {
            let marker = ProxyMarker::from_token(Some(&request.proxied_version));
            if marker.is_proxied() {
                tracing::error!(
                    "Request for {} proxied by {} reached a node without the key",
                    version.describe(&request.key),
                    marker.as_token()
                );
                return Err(ServeError::ProxiedIncorrectly);
            }

            let deadline = Instant::now() + budget(request.deadline_ms, default_budget);
            let key = request.key.as_slice();

            if let Some(record) =
                get_from_partition(version, coordinator, key, primary, deadline).await?
            {
                return Ok(record);
            }
            if alternate == primary {
                return Err(ServeError::NotFound);
            }

            tracing::info!(
                "Trying alternate partition {} for pathological key {}",
                alternate,
                version.describe(key)
            );
            get_from_partition(version, coordinator, key, alternate, deadline)
                .await?
                .ok_or(ServeError::NotFound)
        }
    }
}

async fn get_local(version: &Version, key: Vec<u8>) -> Result<Record> {
    let Some(record) = version.store.get(&key).await.inspect_err(|e| {
        tracing::error!("Failed to read {}: {}", version.describe(&key), e);
    })?
    else {
        return Err(ServeError::NotFound);
    };

    let value = record.read_all().await.map_err(|e| {
        tracing::error!("Failed to read value of {}: {}", version.describe(&key), e);
        ServeError::Storage(e.into())
    })?;
    Ok(Record::local(key, value, &version.name))
}

/// Asks the owners of `partition`. `Ok(None)` means the peer that answered
/// does not have the key.
async fn get_from_partition(
    version: &Version,
    coordinator: &ProxyCoordinator,
    key: &[u8],
    partition: u32,
    deadline: Instant,
) -> Result<Option<Record>> {
    let peers = coordinator
        .selector()
        .select(version.oracle.find_rpc_peers(partition));
    if peers.is_empty() {
        tracing::warn!(
            "No peers available for partition {} of {}",
            partition,
            version.describe(key)
        );
        return Err(ServeError::NoAvailablePeers);
    }

    let marker = ProxyMarker::stamped(&version.name);

    let (found, peer) = try_peers(
        peers,
        deadline,
        coordinator.peer_timeout(),
        |peer: &Arc<dyn RpcPeer>| peer.id().to_string(),
        |peer, budget| {
            let peer = peer.clone();
            let mut outbound = KeyRequest::new(version.db_name.clone(), key);
            outbound.proxied_version = marker.as_token().to_string();
            outbound.deadline_ms = Some(millis(budget));
            async move {
                match peer.get_key(outbound).await {
                    Ok(record) => Ok(Some(record)),
                    Err(PeerError::NotFound) => Ok(None),
                    Err(err) => Err(err),
                }
            }
        },
    )
    .await?;

    Ok(found.map(|mut record| {
        record.proxied = true;
        record.proxied_to = Some(peer.id().to_string());
        record
    }))
}

pub(crate) fn millis(budget: Duration) -> u64 {
    u64::try_from(budget.as_millis()).unwrap_or(u64::MAX)
}
