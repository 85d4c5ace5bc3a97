//! Remote-procedure peer clients.

use super::protocol::{
    ENDPOINT_RPC_GET_KEY, ENDPOINT_RPC_GET_RANGE, KeyRequest, RangeFrame, RangeRequest, Record,
    RpcErrorBody,
};
use crate::error::{PeerError, ServeError};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;

/// A peer reachable over the remote-procedure protocol.
///
/// Callers bound every call with their own deadline and forward the budget in
/// the request's `deadline_ms`.
#[async_trait]
pub trait RpcPeer: Send + Sync {
    /// Identity reported as `proxied_to` on records this peer served.
    fn id(&self) -> &str;

    /// Fetches one key. A peer without the key answers `PeerError::NotFound`.
    async fn get_key(&self, request: KeyRequest) -> Result<Record, PeerError>;

    /// Streams a range into `sink`, returning once the peer reported the
    /// range complete.
    async fn get_range(
        &self,
        request: RangeRequest,
        sink: mpsc::Sender<Record>,
    ) -> Result<(), PeerError>;
}

/// Maps an error reported by a peer onto the outcome of the call.
fn remote_error(body: RpcErrorBody) -> PeerError {
    match body.into_error() {
        ServeError::NotFound => PeerError::NotFound,
        ServeError::ProxyTimeout => PeerError::Timeout,
        other => PeerError::Failed(other.to_string()),
    }
}

/// JSON-over-HTTP implementation of [`RpcPeer`].
pub struct HttpRpcClient {
    id: String,
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpRpcClient {
    pub fn new(id: String, addr: &str, http_client: reqwest::Client) -> Self {
        Self {
            id,
            base_url: format!("http://{}", addr),
            http_client,
        }
    }

    async fn error_body(response: reqwest::Response) -> PeerError {
        let status = response.status();
        match response.json::<RpcErrorBody>().await {
            Ok(body) => remote_error(body),
            Err(_) => PeerError::Failed(format!("peer answered {}", status)),
        }
    }
}

#[async_trait]
impl RpcPeer for HttpRpcClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_key(&self, request: KeyRequest) -> Result<Record, PeerError> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, ENDPOINT_RPC_GET_KEY))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_body(response).await);
        }
        Ok(response.json::<Record>().await?)
    }

    async fn get_range(
        &self,
        request: RangeRequest,
        sink: mpsc::Sender<Record>,
    ) -> Result<(), PeerError> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, ENDPOINT_RPC_GET_RANGE))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_body(response).await);
        }

        let mut frames = FrameReader::default();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            frames.push(&chunk?);
            while let Some(frame) = frames.next_frame()? {
                match frame {
                    RangeFrame::Record(record) => {
                        if sink.send(record).await.is_err() {
                            return Err(PeerError::Failed("range sink closed".to_string()));
                        }
                    }
                    RangeFrame::Done => return Ok(()),
                    RangeFrame::Error(body) => return Err(remote_error(body)),
                }
            }
        }

        Err(PeerError::Failed(
            "range stream ended without a terminal frame".to_string(),
        ))
    }
}

/// Splits a byte stream into newline-delimited `RangeFrame`s.
#[derive(Default)]
pub(crate) struct FrameReader {
    buffer: Vec<u8>,
}

impl FrameReader {
    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<RangeFrame>, PeerError> {
        loop {
            let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') else {
                return Ok(None);
            };
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = &line[..line.len() - 1];
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            return serde_json::from_slice(line)
                .map(Some)
                .map_err(|e| PeerError::Failed(format!("malformed range frame: {}", e)));
        }
    }
}
