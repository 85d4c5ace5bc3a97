use axum::{
    body::Body,
    extract::{Extension, Query},
    http::{
        StatusCode, Uri,
        header::{CONTENT_LENGTH, LAST_MODIFIED},
    },
    response::{IntoResponse, Response},
};
use futures_util::TryStreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::time::Instant;

use super::ENDPOINT_GET_SEGMENT;
use super::local::serve_local;
use crate::error::{Result, ServeError};
use crate::proxy::{ProxiedResponse, ProxyCoordinator, ProxyMarker};
use crate::server::AppState;
use crate::version::{PROXY_HEADER, Route, VERSION_HEADER, Version};

#[derive(Debug, Default, Deserialize)]
pub struct KeyParams {
    /// Set by the node that forwarded this request.
    pub proxy: Option<String>,
}

/// The key is read from the raw path rather than through `Path`, which would
/// reject keys that do not decode to UTF-8.
pub async fn handle_get(
    Extension(state): Extension<Arc<AppState>>,
    uri: Uri,
    Query(params): Query<KeyParams>,
) -> Response {
    let Some((db, key)) = split_key_path(uri.path()) else {
        return serve_error(&ServeError::NotFound, uri.path(), None);
    };

    let Some(version) = state.version(&db) else {
        let description = format!("/{}/{}", db, String::from_utf8_lossy(&key));
        tracing::warn!("Request for {} names an unknown database", description);
        return serve_error(&ServeError::UnknownDatabase(db), &description, None);
    };

    let marker = ProxyMarker::from_token(params.proxy.as_deref());
    let deadline = Instant::now() + state.request_timeout;

    match serve_key(&version, &state.coordinator, &key, &marker, deadline).await {
        Ok(response) => response,
        Err(e) => serve_error(&e, &version.describe(&key), Some(&version.name)),
    }
}

/// Splits `/get/{db}/{key}` into the database name and the percent-decoded
/// key bytes.
fn split_key_path(path: &str) -> Option<(String, Vec<u8>)> {
    let mut segments = path.strip_prefix('/')?.splitn(3, '/');
    if segments.next()? != ENDPOINT_GET_SEGMENT {
        return None;
    }
    let db = urlencoding::decode(segments.next()?).ok()?.into_owned();
    let key = urlencoding::decode_binary(segments.next()?.as_bytes()).into_owned();
    Some((db, key))
}

/// Serves `key` locally or through a peer, per the version's routing.
pub async fn serve_key(
    version: &Version,
    coordinator: &ProxyCoordinator,
    key: &[u8],
    marker: &ProxyMarker,
    deadline: Instant,
) -> Result<Response> {
    match version.route(key)? {
        Route::Local => serve_local(version, key).await,
        Route::Remote { primary, alternate } => {
            if marker.is_proxied() {
                tracing::error!(
                    "Request for {} proxied by {} reached a node without the key",
                    version.describe(key),
                    marker.as_token()
                );
                return Err(ServeError::ProxiedIncorrectly);
            }

            let proxied = coordinator
                .proxy(version, key, primary, alternate, deadline)
                .await?;
            serve_proxied(version, key, proxied)
        }
    }
}

/// Relays a peer's answer: its status, version and length, our
/// `Last-Modified`, and its body unmodified.
fn serve_proxied(version: &Version, key: &[u8], proxied: ProxiedResponse) -> Result<Response> {
    let ProxiedResponse { peer, response } = proxied;

    let mut builder = Response::builder()
        .status(response.status)
        .header(PROXY_HEADER, peer.as_str())
        .header(LAST_MODIFIED, version.last_modified());
    if let Some(peer_version) = response.version {
        builder = builder.header(VERSION_HEADER, peer_version);
    }
    if let Some(len) = response.content_length {
        builder = builder.header(CONTENT_LENGTH, len);
    }

    let description = version.describe(key);
    let body = response.body.inspect_err(move |e| {
        tracing::error!(
            "Failed streaming proxied value of {} from {}: {}",
            description,
            peer,
            e
        );
    });

    builder
        .body(Body::from_stream(body))
        .map_err(|e| ServeError::Transport(format!("building proxied response: {}", e)))
}

/// Not-found answers carry the version they were looked up in, when known.
fn serve_error(err: &ServeError, description: &str, version: Option<&str>) -> Response {
    let status = err.status();
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Failed to serve {}: {}", description, err);
    } else if status != StatusCode::NOT_FOUND {
        tracing::warn!("Failed to serve {}: {}", description, err);
    }

    match version {
        Some(name) if status == StatusCode::NOT_FOUND => {
            (status, [(VERSION_HEADER, name)], err.to_string()).into_response()
        }
        _ => (status, err.to_string()).into_response(),
    }
}
