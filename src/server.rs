//! HTTP surface shared by both protocols.

use crate::proxy::ProxyCoordinator;
use crate::rpc::protocol::{ENDPOINT_RPC_GET_KEY, ENDPOINT_RPC_GET_RANGE};
use crate::version::Version;
use crate::{rpc, serve};

use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// State shared by every request: the served versions, keyed by database
/// name, and the proxy machinery.
pub struct AppState {
    versions: DashMap<String, Arc<Version>>,
    pub coordinator: Arc<ProxyCoordinator>,
    /// Budget of an inbound request that did not bring its own.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(coordinator: Arc<ProxyCoordinator>, request_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            versions: DashMap::new(),
            coordinator,
            request_timeout,
        })
    }

    /// Serves `version` for its database, replacing any previous version.
    pub fn install(&self, version: Arc<Version>) {
        tracing::info!(
            "Serving database {} at version {} ({} partitions)",
            version.db_name,
            version.name,
            version.partition_count
        );
        self.versions.insert(version.db_name.clone(), version);
    }

    pub fn version(&self, db: &str) -> Option<Arc<Version>> {
        self.versions.get(db).map(|entry| entry.value().clone())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            &format!("/{}/:db/*key", serve::ENDPOINT_GET_SEGMENT),
            get(serve::handle_get),
        )
        .route(ENDPOINT_RPC_GET_KEY, post(rpc::handlers::handle_get_key))
        .route(ENDPOINT_RPC_GET_RANGE, post(rpc::handlers::handle_get_range))
        .layer(Extension(state))
}
