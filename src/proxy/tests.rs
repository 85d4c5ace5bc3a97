//! Proxy Module Tests
//!
//! Validates peer iteration, failure classification, and the request/response
//! proxy.
//!
//! ## Test Scopes
//! - **Attempt Loop**: Peer order, deadline bounding, and timeout vs unavailable classification.
//! - **Coordinator**: Marker stamping, the single alternate-partition retry, and missing peers.

#[cfg(test)]
mod tests {
    use crate::error::{PeerError, ServeError};
    use crate::proxy::coordinator::{ProxyCoordinator, try_peers};
    use crate::proxy::selector::PeerSelector;
    use crate::test_support::{
        FakeTransport, FixedLocator, PeerBehavior, StaticOracle, VERSION_NAME, store_with, version,
    };
    use axum::http::StatusCode;
    use futures_util::TryStreamExt;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    const PEER_TIMEOUT: Duration = Duration::from_millis(100);

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    // ============================================================
    // ATTEMPT LOOP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_no_peers_is_unavailable() {
        let result = try_peers(
            Vec::<String>::new(),
            deadline_in(1000),
            PEER_TIMEOUT,
            |peer| peer.clone(),
            |_, _| async { Ok::<_, PeerError>(()) },
        )
        .await;

        assert!(matches!(result, Err(ServeError::NoAvailablePeers)));
    }

    #[tokio::test]
    async fn test_first_answer_wins_and_failed_peers_are_skipped() {
        let tried = Mutex::new(Vec::new());

        let (answer, peer) = try_peers(
            vec!["a", "b", "c"],
            deadline_in(1000),
            PEER_TIMEOUT,
            |peer| peer.to_string(),
            |peer, _| {
                tried.lock().unwrap().push(*peer);
                let peer = *peer;
                async move {
                    if peer == "a" {
                        Err(PeerError::Failed("refused".to_string()))
                    } else {
                        Ok(format!("from {}", peer))
                    }
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(peer, "b");
        assert_eq!(answer, "from b");
        assert_eq!(*tried.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_peers_timing_out_is_proxy_timeout() {
        let started = Instant::now();

        let result = try_peers(
            vec!["a", "b"],
            deadline_in(1000),
            PEER_TIMEOUT,
            |peer| peer.to_string(),
            |_, _| std::future::pending::<Result<(), PeerError>>(),
        )
        .await;

        assert!(matches!(result, Err(ServeError::ProxyTimeout)));
        assert_eq!(started.elapsed(), PEER_TIMEOUT * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_mixed_with_failure_is_unavailable() {
        let result = try_peers(
            vec!["slow", "broken"],
            deadline_in(1000),
            PEER_TIMEOUT,
            |peer| peer.to_string(),
            |peer, _| {
                let peer = *peer;
                async move {
                    if peer == "slow" {
                        std::future::pending::<()>().await;
                    }
                    Err::<(), _>(PeerError::Failed("refused".to_string()))
                }
            },
        )
        .await;

        assert!(matches!(result, Err(ServeError::NoAvailablePeers)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_timeout_counts_as_timeout() {
        let result = try_peers(
            vec!["a"],
            deadline_in(1000),
            PEER_TIMEOUT,
            |peer| peer.to_string(),
            |_, _| async { Err::<(), _>(PeerError::Timeout) },
        )
        .await;

        assert!(matches!(result, Err(ServeError::ProxyTimeout)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_capped_by_remaining_deadline() {
        let budgets = Mutex::new(Vec::new());

        let result = try_peers(
            vec!["a", "b", "c"],
            deadline_in(150),
            PEER_TIMEOUT,
            |peer| peer.to_string(),
            |_, budget| {
                budgets.lock().unwrap().push(budget);
                std::future::pending::<Result<(), PeerError>>()
            },
        )
        .await;

        // Third peer is never tried: the deadline is gone after two attempts.
        assert!(matches!(result, Err(ServeError::ProxyTimeout)));
        assert_eq!(
            *budgets.lock().unwrap(),
            vec![PEER_TIMEOUT, Duration::from_millis(50)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_deadline_tries_nobody() {
        let calls = Mutex::new(0);

        let result = try_peers(
            vec!["a"],
            Instant::now(),
            PEER_TIMEOUT,
            |peer| peer.to_string(),
            |_, _| {
                *calls.lock().unwrap() += 1;
                async { Ok::<_, PeerError>(()) }
            },
        )
        .await;

        assert!(matches!(result, Err(ServeError::ProxyTimeout)));
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    // ============================================================
    // COORDINATOR TESTS
    // ============================================================

    fn coordinator(transport: Arc<FakeTransport>) -> ProxyCoordinator {
        ProxyCoordinator::new(transport, PeerSelector::seeded(0), PEER_TIMEOUT)
    }

    fn remote_version(oracle: StaticOracle) -> crate::version::Version {
        version(
            4,
            Arc::new(FixedLocator::new(&[])),
            oracle,
            store_with(&[]),
        )
    }

    #[tokio::test]
    async fn test_proxy_stamps_marker_and_returns_peer() {
        let transport = Arc::new(FakeTransport::new(&[(
            "10.0.0.2:9599",
            PeerBehavior::Serve("bar"),
        )]));
        let version = remote_version(StaticOracle::owning(&[]).with_peers(2, &["10.0.0.2:9599"]));

        let proxied = coordinator(transport.clone())
            .proxy(&version, b"foo", 2, 2, deadline_in(1000))
            .await
            .unwrap();

        assert_eq!(proxied.peer, "10.0.0.2:9599");
        assert_eq!(proxied.response.status, StatusCode::OK);
        assert_eq!(proxied.response.version.as_deref(), Some("peer-v7"));

        let body: Vec<_> = proxied.response.body.try_collect().await.unwrap();
        assert_eq!(body.concat(), b"bar");

        assert_eq!(
            transport.calls(),
            vec![("10.0.0.2:9599".to_string(), VERSION_NAME.to_string())]
        );
    }

    #[tokio::test]
    async fn test_not_found_retries_alternate_once() {
        let transport = Arc::new(FakeTransport::new(&[
            ("primary-peer", PeerBehavior::NotFound),
            ("alternate-peer", PeerBehavior::Serve("found")),
        ]));
        let version = remote_version(
            StaticOracle::owning(&[])
                .with_peers(1, &["primary-peer"])
                .with_peers(3, &["alternate-peer"]),
        );

        let proxied = coordinator(transport.clone())
            .proxy(&version, b"pathological", 1, 3, deadline_in(1000))
            .await
            .unwrap();

        assert_eq!(proxied.peer, "alternate-peer");
        assert_eq!(proxied.response.status, StatusCode::OK);
        assert_eq!(transport.called_peers(), vec!["primary-peer", "alternate-peer"]);
    }

    #[tokio::test]
    async fn test_alternate_not_found_does_not_recurse() {
        let transport = Arc::new(FakeTransport::new(&[
            ("primary-peer", PeerBehavior::NotFound),
            ("alternate-peer", PeerBehavior::NotFound),
        ]));
        let version = remote_version(
            StaticOracle::owning(&[])
                .with_peers(1, &["primary-peer"])
                .with_peers(3, &["alternate-peer"]),
        );

        let proxied = coordinator(transport.clone())
            .proxy(&version, b"missing", 1, 3, deadline_in(1000))
            .await
            .unwrap();

        assert_eq!(proxied.response.status, StatusCode::NOT_FOUND);
        assert_eq!(transport.called_peers(), vec!["primary-peer", "alternate-peer"]);
    }

    #[tokio::test]
    async fn test_not_found_without_alternate_is_not_retried() {
        let transport = Arc::new(FakeTransport::new(&[("peer", PeerBehavior::NotFound)]));
        let version = remote_version(StaticOracle::owning(&[]).with_peers(2, &["peer"]));

        let proxied = coordinator(transport.clone())
            .proxy(&version, b"missing", 2, 2, deadline_in(1000))
            .await
            .unwrap();

        assert_eq!(proxied.response.status, StatusCode::NOT_FOUND);
        assert_eq!(transport.called_peers(), vec!["peer"]);
    }

    #[tokio::test]
    async fn test_partition_without_peers_is_unavailable() {
        let transport = Arc::new(FakeTransport::default());
        let version = remote_version(StaticOracle::owning(&[]));

        let result = coordinator(transport.clone())
            .proxy(&version, b"foo", 2, 2, deadline_in(1000))
            .await;

        assert!(matches!(result, Err(ServeError::NoAvailablePeers)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_every_peer_is_tried_once() {
        let transport = Arc::new(FakeTransport::new(&[
            ("a", PeerBehavior::Fail),
            ("b", PeerBehavior::Fail),
            ("c", PeerBehavior::Fail),
        ]));
        let version = remote_version(StaticOracle::owning(&[]).with_peers(0, &["a", "b", "c"]));

        let result = coordinator(transport.clone())
            .proxy(&version, b"foo", 0, 0, deadline_in(1000))
            .await;

        assert!(matches!(result, Err(ServeError::NoAvailablePeers)));
        let mut called = transport.called_peers();
        called.sort();
        assert_eq!(called, vec!["a", "b", "c"]);
    }
}
