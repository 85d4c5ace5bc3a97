//! Local Server
//!
//! Streams a record held by this node's storage to the client.

use crate::error::{Result, ServeError};
use crate::version::{VERSION_HEADER, Version};

use axum::body::Body;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_LENGTH, LAST_MODIFIED};
use axum::response::Response;
use futures_util::TryStreamExt;
use tokio_util::io::ReaderStream;

/// Looks `key` up in local storage and streams its value.
///
/// The record is owned by the body stream and released when the body finishes
/// or the client goes away. Read failures after the status was sent can only
/// be logged.
pub async fn serve_local(version: &Version, key: &[u8]) -> Result<Response> {
    let record = version.store.get(key).await.inspect_err(|e| {
        tracing::error!("Failed to fetch {}: {}", version.describe(key), e);
    })?;
    let Some(record) = record else {
        tracing::debug!("No record for {}", version.describe(key));
        return Err(ServeError::NotFound);
    };

    let value_len = record.value_len;
    let description = version.describe(key);
    let body = ReaderStream::new(record).inspect_err(move |e| {
        tracing::error!("Failed streaming value of {}: {}", description, e);
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(VERSION_HEADER, version.name.as_str())
        .header(CONTENT_LENGTH, value_len)
        .header(LAST_MODIFIED, version.last_modified())
        .body(Body::from_stream(body))
        .map_err(|e| ServeError::Transport(format!("building response: {}", e)))
}
