//! Proxy Module
//!
//! Everything needed to serve a key this node does not own by asking a peer
//! that does.
//!
//! ## Core Concepts
//! - **Marker**: `ProxyMarker` stops a forwarded request from being forwarded again.
//! - **Selection**: `PeerSelector` shuffles candidate peers with its own RNG.
//! - **Attempts**: `try_peers` walks the shuffled peers under a deadline and
//!   tells "nobody could answer" apart from "everybody ran out of time". Both
//!   protocols use it.
//! - **Transport**: `PeerTransport` fetches a key from a peer over the
//!   request/response protocol, leaving the body as a stream.

pub mod coordinator;
pub mod marker;
pub mod selector;
pub mod transport;

pub use coordinator::{ProxiedResponse, ProxyCoordinator, try_peers};
pub use marker::ProxyMarker;
pub use selector::PeerSelector;
pub use transport::{BodyStream, HttpPeerTransport, PeerRequest, PeerResponse, PeerTransport};

#[cfg(test)]
mod tests;
