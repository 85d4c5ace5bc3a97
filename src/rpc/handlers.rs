use axum::{
    Json,
    body::Body,
    extract::Extension,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use super::protocol::{KeyRequest, RangeFrame, RangeRequest, Record, RpcErrorBody};
use super::{range, service};
use crate::error::ServeError;
use crate::server::AppState;

const RANGE_BUFFER: usize = 256;

fn error_response(err: &ServeError) -> Response {
    (err.status(), Json(RpcErrorBody::from(err))).into_response()
}

pub async fn handle_get_key(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<KeyRequest>,
) -> Response {
    let Some(version) = state.version(&req.db) else {
        tracing::warn!("RPC get for unknown database {}", req.db);
        return error_response(&ServeError::UnknownDatabase(req.db));
    };

    match service::get_key(&version, &state.coordinator, req, state.request_timeout).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => {
            tracing::debug!("RPC get on {} failed: {}", version.db_name, e);
            error_response(&e)
        }
    }
}

/// Streams the range as newline-delimited `RangeFrame`s.
///
/// Errors found before the scan starts are plain error responses. Once the
/// stream is open, the outcome travels in its terminal frame. Dropping the
/// response body cancels the scan.
pub async fn handle_get_range(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<RangeRequest>,
) -> Response {
    let Some(version) = state.version(&req.db) else {
        tracing::warn!("RPC range for unknown database {}", req.db);
        return error_response(&ServeError::UnknownDatabase(req.db));
    };

    let cancel = CancellationToken::new();
    let (records_tx, records_rx) = mpsc::channel(RANGE_BUFFER);

    let coordinator = state.coordinator.clone();
    let budget = state.request_timeout;
    let scan_cancel = cancel.clone();
    let scan = tokio::spawn(async move {
        range::get_range(
            &version,
            &coordinator,
            req,
            records_tx,
            scan_cancel,
            budget,
        )
        .await
    });

    let body = Body::from_stream(range_frames(records_rx, scan, cancel.drop_guard()));
    ([(CONTENT_TYPE, "application/x-ndjson")], body).into_response()
}

type RangeState = (
    mpsc::Receiver<Record>,
    JoinHandle<crate::error::Result<()>>,
    DropGuard,
);

fn range_frames(
    records: mpsc::Receiver<Record>,
    scan: JoinHandle<crate::error::Result<()>>,
    guard: DropGuard,
) -> impl futures_util::Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    futures_util::stream::unfold(
        Some((records, scan, guard)),
        |state: Option<RangeState>| async move {
            let (mut records, scan, guard) = state?;

            if let Some(record) = records.recv().await {
                let line = encode(&RangeFrame::Record(record));
                return Some((line, Some((records, scan, guard))));
            }

            let terminal = match scan.await {
                Ok(Ok(())) => RangeFrame::Done,
                Ok(Err(e)) => {
                    tracing::warn!("Range scan ended with error: {}", e);
                    RangeFrame::Error(RpcErrorBody::from(&e))
                }
                Err(e) => {
                    tracing::error!("Range scan task failed: {}", e);
                    RangeFrame::Error(RpcErrorBody::from(&ServeError::Storage(e.into())))
                }
            };
            drop(guard);
            Some((encode(&terminal), None))
        },
    )
}

fn encode(frame: &RangeFrame) -> std::io::Result<Bytes> {
    let mut line = serde_json::to_vec(frame)?;
    line.push(b'\n');
    Ok(Bytes::from(line))
}
