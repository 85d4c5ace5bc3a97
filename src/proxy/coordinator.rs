//! Proxy Coordinator
//!
//! Forwards requests for keys this node does not own to peers that do.
//!
//! ## Algorithm
//! 1. Look up the peers owning the primary partition and shuffle them.
//! 2. Try them one at a time; each attempt is bounded by the per-peer timeout
//!    and by what is left of the inbound request's budget. The first peer that
//!    answers at all wins; a failed peer is not tried again.
//! 3. If that answer is "not found" and the key has a distinct alternate
//!    partition, repeat once against the alternate partition's peers.
//! 4. The winning body stream is cut off with an error when the inbound
//!    deadline passes, so a peer that stalls mid-body cannot hold the client.
//!
//! Failure classification: `ProxyTimeout` when every failed attempt ran out of
//! time, `NoAvailablePeers` otherwise (including when there was nobody to ask).

use super::marker::ProxyMarker;
use super::selector::PeerSelector;
use super::transport::{PeerRequest, PeerResponse, PeerTransport, body_until};
use crate::error::{PeerError, Result, ServeError};
use crate::version::Version;

use axum::http::StatusCode;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Tries `peers` in order until one answers.
///
/// `call` receives the time budget of the attempt, which it may forward
/// downstream; the attempt is also cut off locally when the budget runs out.
/// Returns the answer together with the peer that produced it.
pub async fn try_peers<P, T, F, Fut>(
    peers: Vec<P>,
    deadline: Instant,
    peer_timeout: Duration,
    describe: impl Fn(&P) -> String,
    mut call: F,
) -> Result<(T, P)>
where
    F: FnMut(&P, Duration) -> Fut,
    Fut: Future<Output = std::result::Result<T, PeerError>>,
{
    if peers.is_empty() {
        return Err(ServeError::NoAvailablePeers);
    }

    let mut timeouts = 0usize;
    let mut failures = 0usize;
    let mut exhausted = false;

    for peer in peers {
        let now = Instant::now();
        if now >= deadline {
            exhausted = true;
            break;
        }
        let budget = peer_timeout.min(deadline - now);

        match tokio::time::timeout(budget, call(&peer, budget)).await {
            Ok(Ok(answer)) => return Ok((answer, peer)),
            Ok(Err(PeerError::Timeout)) | Err(_) => {
                tracing::warn!("Peer {} timed out after {:?}", describe(&peer), budget);
                timeouts += 1;
            }
            Ok(Err(err)) => {
                tracing::warn!("Peer {} failed: {}", describe(&peer), err);
                failures += 1;
            }
        }
    }

    if failures == 0 && (timeouts > 0 || exhausted) {
        Err(ServeError::ProxyTimeout)
    } else {
        Err(ServeError::NoAvailablePeers)
    }
}

/// A successful proxied answer and the peer that gave it.
#[derive(Debug)]
pub struct ProxiedResponse {
    pub peer: String,
    pub response: PeerResponse,
}

pub struct ProxyCoordinator {
    transport: Arc<dyn PeerTransport>,
    selector: PeerSelector,
    peer_timeout: Duration,
}

impl ProxyCoordinator {
    pub fn new(
        transport: Arc<dyn PeerTransport>,
        selector: PeerSelector,
        peer_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            selector,
            peer_timeout,
        }
    }

    pub fn selector(&self) -> &PeerSelector {
        &self.selector
    }

    pub fn peer_timeout(&self) -> Duration {
        self.peer_timeout
    }

    /// Proxies `key` to the owners of `primary`, and once to the owners of
    /// `alternate` if the first answer is a 404 and the two differ.
    pub async fn proxy(
        &self,
        version: &Version,
        key: &[u8],
        primary: u32,
        alternate: u32,
        deadline: Instant,
    ) -> Result<ProxiedResponse> {
        let proxied = self.proxy_partition(version, key, primary, deadline).await?;

        if proxied.response.status == StatusCode::NOT_FOUND && alternate != primary {
            tracing::info!(
                "Trying alternate partition {} for pathological key {}",
                alternate,
                version.describe(key)
            );
            // Drops the first body before asking again.
            drop(proxied);
            return self.proxy_partition(version, key, alternate, deadline).await;
        }

        Ok(proxied)
    }

    async fn proxy_partition(
        &self,
        version: &Version,
        key: &[u8],
        partition: u32,
        deadline: Instant,
    ) -> Result<ProxiedResponse> {
        let peers = self.selector.select(version.oracle.find_peers(partition));
        if peers.is_empty() {
            tracing::warn!(
                "No peers available for partition {} of {}",
                partition,
                version.describe(key)
            );
            return Err(ServeError::NoAvailablePeers);
        }

        let marker = ProxyMarker::stamped(&version.name);
        let request = PeerRequest {
            db: &version.db_name,
            key,
            marker: &marker,
        };

        let (mut response, peer) = try_peers(
            peers,
            deadline,
            self.peer_timeout,
            |peer: &String| peer.clone(),
            |peer, _budget| {
                let transport = self.transport.clone();
                let peer = peer.clone();
                async move { transport.fetch(&peer, request).await }
            },
        )
        .await?;

        tracing::debug!(
            "Proxied {} to {} ({})",
            version.describe(key),
            peer,
            response.status
        );
        // The body is still owed to the client under the same deadline.
        response.body = body_until(response.body, deadline);
        Ok(ProxiedResponse { peer, response })
    }
}
