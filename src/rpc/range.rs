//! Range Fan-out Coordinator
//!
//! Serves `[start_key, end_key]` range queries over the remote-procedure
//! protocol.
//!
//! ## Algorithm
//! 1. Locate both ends of the range. If any start candidate equals any end
//!    candidate the range lives in one partition: scan every owned start
//!    candidate locally, otherwise hand the whole range to one of the start
//!    primary's owners.
//! 2. Otherwise spawn one local scan per owned partition in
//!    `[min(start, end), max(start, end)]` of the primaries, all writing into
//!    the same sink, and join every one of them.
//! 3. A spanned partition this node does not own fails the whole range with
//!    `NoAvailablePeers`, so truncated results are never reported complete.
//!
//! Records from different partitions may interleave in the sink.

use super::client::RpcPeer;
use super::protocol::{RangeRequest, Record, budget};
use super::service::millis;
use crate::error::{PeerError, Result, ServeError};
use crate::proxy::{ProxyCoordinator, ProxyMarker};
use crate::storage::{BlockStore, KeyRange, KeyValue};
use crate::version::Version;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const SCAN_BUFFER: usize = 64;

/// Streams every record of the range into `sink`.
///
/// Returns only after every scan it started has finished. `cancel` aborts
/// in-flight scans and peer calls.
pub async fn get_range(
    version: &Version,
    coordinator: &ProxyCoordinator,
    request: RangeRequest,
    sink: mpsc::Sender<Record>,
    cancel: CancellationToken,
    default_budget: Duration,
) -> Result<()> {
    if version.partition_count == 0 {
        return Err(ServeError::NoAvailablePeers);
    }

    let (start_primary, start_alternate) = version.locate(&request.start_key);
    let (end_primary, end_alternate) = version.locate(&request.end_key);
    let range = KeyRange::new(request.start_key.clone(), request.end_key.clone());

    let single_partition = [start_primary, start_alternate]
        .iter()
        .any(|start| *start == end_primary || *start == end_alternate);

    if single_partition {
        let mut owned: Vec<u32> = [start_primary, start_alternate]
            .into_iter()
            .filter(|partition| version.oracle.have_local(*partition))
            .collect();
        owned.dedup();

        if owned.is_empty() {
            return delegate(
                version,
                coordinator,
                request,
                start_primary,
                sink,
                cancel,
                default_budget,
            )
            .await;
        }

        // Rows may have been loaded under either candidate.
        for partition in owned {
            scan_partition(
                version.store.clone(),
                partition,
                range.clone(),
                sink.clone(),
                version.name.clone(),
                cancel.clone(),
            )
            .await?;
        }
        return Ok(());
    }

    fan_out(
        version,
        start_primary.min(end_primary),
        start_primary.max(end_primary),
        range,
        sink,
        cancel,
    )
    .await
}

async fn fan_out(
    version: &Version,
    low: u32,
    high: u32,
    range: KeyRange,
    sink: mpsc::Sender<Record>,
    cancel: CancellationToken,
) -> Result<()> {
    let scan_cancel = cancel.child_token();
    // Scans stop if this future is dropped before they finish.
    let _scan_guard = scan_cancel.clone().drop_guard();

    let mut scans = JoinSet::new();
    let mut unserved = Vec::new();

    for partition in low..=high {
        if version.oracle.have_local(partition) {
            scans.spawn(scan_partition(
                version.store.clone(),
                partition,
                range.clone(),
                sink.clone(),
                version.name.clone(),
                scan_cancel.clone(),
            ));
        } else {
            unserved.push(partition);
        }
    }
    drop(sink);

    tracing::debug!(
        "Range of {} spans partitions {}..={}: {} local scans, {} unserved",
        version.db_name,
        low,
        high,
        scans.len(),
        unserved.len()
    );

    let mut failure = None;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                scans.abort_all();
                while scans.join_next().await.is_some() {}
                return Err(ServeError::Cancelled);
            }
            joined = scans.join_next() => match joined {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(err))) => {
                    if failure.is_none() {
                        scan_cancel.cancel();
                    }
                    failure.get_or_insert(err);
                }
                Some(Err(join_err)) => {
                    tracing::error!("Range scan task of {} panicked: {}", version.db_name, join_err);
                    scan_cancel.cancel();
                    failure.get_or_insert(ServeError::Storage(join_err.into()));
                }
            }
        }
    }

    if !unserved.is_empty() {
        tracing::warn!(
            "Range of {} (version {}) spans partitions {:?} not owned locally",
            version.db_name,
            version.name,
            unserved
        );
        return Err(ServeError::NoAvailablePeers);
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Scans one local partition, tagging each entry with `version`.
async fn scan_partition(
    store: Arc<dyn BlockStore>,
    partition: u32,
    range: KeyRange,
    sink: mpsc::Sender<Record>,
    version: String,
    cancel: CancellationToken,
) -> Result<()> {
    let (entries_tx, mut entries_rx) = mpsc::channel::<KeyValue>(SCAN_BUFFER);

    let scan = store.get_range(partition, &range, entries_tx, cancel.clone());
    let relay = async move {
        while let Some(entry) = entries_rx.recv().await {
            let record = Record::local(entry.key, entry.value, &version);
            if sink.send(record).await.is_err() {
                break;
            }
        }
    };

    let (scanned, ()) = tokio::join!(scan, relay);
    scanned.map_err(|err| {
        if cancel.is_cancelled() {
            ServeError::Cancelled
        } else {
            tracing::error!("Range scan of partition {} failed: {}", partition, err);
            ServeError::Storage(err)
        }
    })
}

/// Hands a single-partition range to the owners of `partition`.
///
/// Peers are tried in random order, but only until one of them has forwarded
/// a record: after that, a failure ends the range.
async fn delegate(
    version: &Version,
    coordinator: &ProxyCoordinator,
    request: RangeRequest,
    partition: u32,
    sink: mpsc::Sender<Record>,
    cancel: CancellationToken,
    default_budget: Duration,
) -> Result<()> {
    let marker = ProxyMarker::from_token(Some(&request.proxied_version));
    if marker.is_proxied() {
        tracing::error!(
            "Range of {} proxied by {} reached a node without partition {}",
            version.db_name,
            marker.as_token(),
            partition
        );
        return Err(ServeError::ProxiedIncorrectly);
    }

    let peers = coordinator
        .selector()
        .select(version.oracle.find_rpc_peers(partition));
    if peers.is_empty() {
        tracing::warn!(
            "No peers available for range partition {} of {} (version {})",
            partition,
            version.db_name,
            version.name
        );
        return Err(ServeError::NoAvailablePeers);
    }

    let stamped = ProxyMarker::stamped(&version.name);
    let deadline = Instant::now() + budget(request.deadline_ms, default_budget);
    let forwarded = AtomicUsize::new(0);

    let mut timeouts = 0usize;
    let mut failures = 0usize;

    for peer in peers {
        let now = Instant::now();
        if now >= deadline {
            timeouts += 1;
            break;
        }
        let remaining = deadline - now;

        let mut outbound = request.clone();
        outbound.proxied_version = stamped.as_token().to_string();
        outbound.deadline_ms = Some(millis(remaining));

        let attempt = forward_range(peer.as_ref(), outbound, &sink, &forwarded);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(ServeError::Cancelled),
            outcome = tokio::time::timeout(remaining, attempt) => outcome,
        };

        let err = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err,
            Err(_) => PeerError::Timeout,
        };
        tracing::warn!("Range peer {} failed: {}", peer.id(), err);

        let is_timeout = err == PeerError::Timeout;
        if is_timeout {
            timeouts += 1;
        } else {
            failures += 1;
        }

        let sent = forwarded.load(Ordering::Relaxed);
        if sent > 0 {
            tracing::error!(
                "Range peer {} failed after forwarding {} records of {}",
                peer.id(),
                sent,
                version.db_name
            );
            return Err(if is_timeout {
                ServeError::ProxyTimeout
            } else {
                ServeError::Transport(err.to_string())
            });
        }
    }

    if failures == 0 && timeouts > 0 {
        Err(ServeError::ProxyTimeout)
    } else {
        Err(ServeError::NoAvailablePeers)
    }
}

async fn forward_range(
    peer: &dyn RpcPeer,
    request: RangeRequest,
    sink: &mpsc::Sender<Record>,
    forwarded: &AtomicUsize,
) -> std::result::Result<(), PeerError> {
    let (relay_tx, mut relay_rx) = mpsc::channel::<Record>(SCAN_BUFFER);

    let call = peer.get_range(request, relay_tx);
    let relay = async move {
        while let Some(record) = relay_rx.recv().await {
            if sink.send(record).await.is_err() {
                break;
            }
            forwarded.fetch_add(1, Ordering::Relaxed);
        }
    };

    let (result, ()) = tokio::join!(call, relay);
    result
}
