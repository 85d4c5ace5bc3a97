//! Remote-Procedure Protocol
//!
//! Defines the endpoints and Data Transfer Objects (DTOs) of the typed
//! protocol nodes use among themselves and with clients that want whole
//! values rather than byte streams.
//!
//! Keys and values are opaque bytes and travel as base64 strings inside JSON.
//! Range results are streamed as newline-delimited JSON `RangeFrame`s.

use crate::error::ServeError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// --- API Endpoints ---

/// Point lookup returning a whole `Record`.
pub const ENDPOINT_RPC_GET_KEY: &str = "/rpc/get_key";
/// Range scan streaming `RangeFrame`s.
pub const ENDPOINT_RPC_GET_RANGE: &str = "/rpc/get_range";

// --- Data Transfer Objects ---

/// Request for a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRequest {
    /// The database to read from.
    pub db: String,
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
    /// Version name of the node that forwarded this request. Empty when the
    /// request comes straight from a client.
    #[serde(default)]
    pub proxied_version: String,
    /// Remaining time budget of the caller, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl KeyRequest {
    pub fn new(db: impl Into<String>, key: impl Into<Vec<u8>>) -> Self {
        Self {
            db: db.into(),
            key: key.into(),
            proxied_version: String::new(),
            deadline_ms: None,
        }
    }
}

/// Request for every key in `[start_key, end_key]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    pub db: String,
    #[serde(with = "base64_bytes")]
    pub start_key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub end_key: Vec<u8>,
    #[serde(default)]
    pub proxied_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl RangeRequest {
    pub fn new(
        db: impl Into<String>,
        start_key: impl Into<Vec<u8>>,
        end_key: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            db: db.into(),
            start_key: start_key.into(),
            end_key: end_key.into(),
            proxied_version: String::new(),
            deadline_ms: None,
        }
    }
}

/// Budget left for the inbound call: what the caller sent, else `default`.
pub fn budget(deadline_ms: Option<u64>, default: Duration) -> Duration {
    deadline_ms.map(Duration::from_millis).unwrap_or(default)
}

/// A value served for a key under a specific version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub value: Vec<u8>,
    /// Name of the version that produced the value.
    pub version: String,
    /// Whether the value was obtained from a peer.
    pub proxied: bool,
    /// The peer that served a proxied value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied_to: Option<String>,
}

impl Record {
    pub fn local(key: Vec<u8>, value: Vec<u8>, version: &str) -> Self {
        Self {
            key,
            value,
            version: version.to_string(),
            proxied: false,
            proxied_to: None,
        }
    }
}

/// Error body of a failed call, and terminal frame of a failed range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// One of `not_found`, `no_available_peers`, `proxy_timeout`,
    /// `proxied_incorrectly`, `internal`.
    pub code: String,
    pub message: String,
}

impl From<&ServeError> for RpcErrorBody {
    fn from(err: &ServeError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl RpcErrorBody {
    pub fn into_error(self) -> ServeError {
        ServeError::from_code(&self.code, self.message)
    }
}

/// One line of a range response.
///
/// A well-formed stream is any number of `Record` frames followed by exactly
/// one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeFrame {
    Record(Record),
    Done,
    Error(RpcErrorBody),
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
