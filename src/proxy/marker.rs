//! Proxy loop marker.
//!
//! Carried on every forwarded request, in the `proxy` query parameter of the
//! request/response protocol and in the `proxied_version` field of the
//! remote-procedure protocol. An empty marker means this node is the original
//! recipient; a stamped one names the version that forwarded the request and
//! forbids forwarding it again.

/// "Already attempted by" token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyMarker(Option<String>);

impl ProxyMarker {
    #[cfg(test)]
    pub(crate) fn none() -> Self {
        Self(None)
    }

    /// Parses the wire form. Absent and empty both mean "not yet proxied".
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some(token) if !token.is_empty() => Self(Some(token.to_string())),
            _ => Self(None),
        }
    }

    /// Marker placed on outbound calls made on behalf of `version`.
    pub fn stamped(version: &str) -> Self {
        Self(Some(version.to_string()))
    }

    pub fn is_proxied(&self) -> bool {
        self.0.is_some()
    }

    #[cfg(test)]
    pub(crate) fn attempted_by(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Wire form; empty when not proxied.
    pub fn as_token(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }
}
