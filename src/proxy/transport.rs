//! Request/response peer transport.
//!
//! Fetches a key from a peer with `GET /get/{db}/{key}?proxy={marker}` and
//! hands back the status, the headers the proxy path forwards, and the body
//! as an unread byte stream.

use super::marker::ProxyMarker;
use crate::error::PeerError;
use crate::serve::ENDPOINT_GET_SEGMENT;
use crate::version::VERSION_HEADER;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use std::io;
use tokio::time::Instant;

pub type BodyStream = BoxStream<'static, io::Result<Bytes>>;

/// Ends `body` with a `TimedOut` error once `deadline` passes.
pub fn body_until(body: BodyStream, deadline: Instant) -> BodyStream {
    futures_util::stream::unfold(Some(body), move |body| async move {
        let mut body = body?;
        match tokio::time::timeout_at(deadline, body.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(body))),
            Ok(None) => None,
            Err(_) => Some((
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "peer body not finished before the request deadline",
                )),
                None,
            )),
        }
    })
    .boxed()
}

/// What is asked of a peer.
#[derive(Debug, Clone, Copy)]
pub struct PeerRequest<'a> {
    pub db: &'a str,
    pub key: &'a [u8],
    pub marker: &'a ProxyMarker,
}

/// A peer's answer. The body has not been read yet.
pub struct PeerResponse {
    pub status: StatusCode,
    pub version: Option<String>,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl std::fmt::Debug for PeerResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerResponse")
            .field("status", &self.status)
            .field("version", &self.version)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Issues request/response calls to peers.
///
/// Deadlines are enforced by the caller around `fetch`, which only has to
/// resolve once the response head is available.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn fetch(&self, peer: &str, request: PeerRequest<'_>) -> Result<PeerResponse, PeerError>;
}

/// `reqwest` implementation of [`PeerTransport`].
pub struct HttpPeerTransport {
    http_client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }

    /// Keys are raw bytes, so they are percent-encoded byte by byte.
    fn url(peer: &str, request: &PeerRequest<'_>) -> Result<reqwest::Url, PeerError> {
        let mut url = reqwest::Url::parse(&format!(
            "http://{}/{}/{}/{}",
            peer,
            ENDPOINT_GET_SEGMENT,
            urlencoding::encode(request.db),
            urlencoding::encode_binary(request.key)
        ))
        .map_err(|e| PeerError::Failed(format!("invalid peer address {}: {}", peer, e)))?;
        url.query_pairs_mut()
            .append_pair("proxy", request.marker.as_token());
        Ok(url)
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn fetch(&self, peer: &str, request: PeerRequest<'_>) -> Result<PeerResponse, PeerError> {
        let url = Self::url(peer, &request)?;
        let response = self.http_client.get(url).send().await?;

        let version = response
            .headers()
            .get(VERSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        Ok(PeerResponse {
            status: response.status(),
            version,
            content_length: response.content_length(),
            body: response
                .bytes_stream()
                .map_err(io::Error::other)
                .boxed(),
        })
    }
}
