//! Error taxonomy shared by both protocols.

use axum::http::StatusCode;
use thiserror::Error;

/// Outcome of serving a key or range that did not produce data.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The version has no data for the key.
    #[error("key not found")]
    NotFound,

    /// The request names a database this node does not serve.
    #[error("unknown database: {0}")]
    UnknownDatabase(String),

    /// No candidate peer existed, or reachable peers failed for reasons
    /// other than the deadline.
    #[error("no available peers")]
    NoAvailablePeers,

    /// Every attempted peer exceeded its deadline.
    #[error("all peers timed out")]
    ProxyTimeout,

    /// An already proxied request reached a node that does not own the key.
    #[error("request was proxied to a node that does not own the key")]
    ProxiedIncorrectly,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),

    #[error("transport error: {0}")]
    Transport(String),

    /// The caller went away before the request finished.
    #[error("request cancelled")]
    Cancelled,
}

impl ServeError {
    /// Stable wire code used by the remote-procedure protocol.
    pub fn code(&self) -> &'static str {
        match self {
            ServeError::NotFound | ServeError::UnknownDatabase(_) => "not_found",
            ServeError::NoAvailablePeers => "no_available_peers",
            ServeError::ProxyTimeout => "proxy_timeout",
            ServeError::ProxiedIncorrectly => "proxied_incorrectly",
            ServeError::Storage(_) | ServeError::Transport(_) | ServeError::Cancelled => {
                "internal"
            }
        }
    }

    /// Status code used by both protocols' responses.
    pub fn status(&self) -> StatusCode {
        match self {
            ServeError::NotFound | ServeError::UnknownDatabase(_) => StatusCode::NOT_FOUND,
            ServeError::NoAvailablePeers | ServeError::ProxiedIncorrectly => {
                StatusCode::BAD_GATEWAY
            }
            ServeError::ProxyTimeout => StatusCode::GATEWAY_TIMEOUT,
            ServeError::Storage(_) | ServeError::Transport(_) | ServeError::Cancelled => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Inverse of [`ServeError::code`]; unknown codes become transport errors.
    pub fn from_code(code: &str, message: String) -> Self {
        match code {
            "not_found" => ServeError::NotFound,
            "no_available_peers" => ServeError::NoAvailablePeers,
            "proxy_timeout" => ServeError::ProxyTimeout,
            "proxied_incorrectly" => ServeError::ProxiedIncorrectly,
            _ => ServeError::Transport(message),
        }
    }
}

/// Failure of a single call to a single peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("peer call exceeded its deadline")]
    Timeout,

    /// The peer answered and does not have the key.
    #[error("peer reported key not found")]
    NotFound,

    #[error("peer call failed: {0}")]
    Failed(String),
}

impl From<reqwest::Error> for PeerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PeerError::Timeout
        } else {
            PeerError::Failed(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ServeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip_for_routing_errors() {
        for err in [
            ServeError::NotFound,
            ServeError::NoAvailablePeers,
            ServeError::ProxyTimeout,
            ServeError::ProxiedIncorrectly,
        ] {
            let decoded = ServeError::from_code(err.code(), err.to_string());
            assert_eq!(decoded.code(), err.code());
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ServeError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ServeError::NoAvailablePeers.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ServeError::ProxiedIncorrectly.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ServeError::ProxyTimeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            ServeError::Storage(anyhow::anyhow!("disk")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_unknown_code_is_transport_error() {
        let err = ServeError::from_code("bogus", "boom".to_string());
        assert!(matches!(err, ServeError::Transport(msg) if msg == "boom"));
    }
}
