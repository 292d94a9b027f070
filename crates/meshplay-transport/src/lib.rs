//! Mesh transport abstraction layer for Meshplay.
//!
//! Provides the [`MeshTransport`] trait that abstracts over a peer-to-peer
//! session: discovery, advertising, invitations and reliable per-sender
//! ordered delivery to the currently connected peers. Everything the
//! transport observes is reported as a [`TransportEvent`] on a channel the
//! owner drains from its own task.
//!
//! # Feature Flags
//!
//! - `memory` (default): in-process mesh ([`MemoryNetwork`]) for tests and demos

mod error;
#[cfg(feature = "memory")]
mod memory;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{MemoryNetwork, MemoryTransport};

use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Stable identity of a device taking part in a session.
///
/// The display name is what a lobby shows; the unique id tells apart two
/// devices that happen to share a name. Ordering compares the display name
/// first and the unique id second, so every replica sorts a set of peers
/// the same way.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PeerId {
    #[serde(rename = "name")]
    display_name: String,
    #[serde(rename = "uid")]
    unique_id: u64,
}

impl PeerId {
    /// Creates a `PeerId` from its parts.
    pub fn new(display_name: impl Into<String>, unique_id: u64) -> Self {
        Self {
            display_name: display_name.into(),
            unique_id,
        }
    }

    /// Creates a `PeerId` with a freshly drawn random unique id.
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self::new(display_name, rand::rng().random())
    }

    /// Returns the human-readable name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the random component of the identity.
    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{:x}", self.display_name, self.unique_id)
    }
}

/// Session-level state of a remote peer as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    Connecting,
    Connected,
    NotConnected,
}

/// The accept/decline decision for an incoming invitation.
///
/// Consumed on use: an invitation is answered exactly once. Dropping the
/// reply without answering leaves the inviter waiting until its invite
/// timeout fires.
pub struct InvitationReply {
    respond: Box<dyn FnOnce(bool) + Send>,
}

impl InvitationReply {
    /// Wraps the transport-specific answer callback.
    pub fn new(respond: impl FnOnce(bool) + Send + 'static) -> Self {
        Self {
            respond: Box::new(respond),
        }
    }

    /// Accepts the invitation and joins the inviter's session.
    pub fn accept(self) {
        (self.respond)(true);
    }

    /// Declines the invitation.
    pub fn decline(self) {
        (self.respond)(false);
    }
}

impl fmt::Debug for InvitationReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InvitationReply { .. }")
    }
}

/// Everything a transport reports to its owner.
#[derive(Debug)]
pub enum TransportEvent {
    /// Browsing discovered an advertising peer.
    PeerFound(PeerId),
    /// A previously found peer stopped advertising or went away.
    PeerLost(PeerId),
    /// Advertising received an invitation that must be answered.
    InvitationReceived { from: PeerId, reply: InvitationReply },
    /// A peer's session state changed.
    PeerStateChanged {
        peer: PeerId,
        state: PeerConnectionState,
    },
    /// Bytes arrived from a connected peer.
    DataReceived { from: PeerId, data: Vec<u8> },
    /// Discovery could not be started.
    BrowsingFailed(String),
    /// Advertising could not be started.
    AdvertisingFailed(String),
}

/// A peer-to-peer session endpoint.
///
/// All methods are non-blocking: they queue work and return immediately.
/// Results that arrive later (found peers, connection changes, inbound
/// data) are delivered as [`TransportEvent`]s.
pub trait MeshTransport: Send + 'static {
    /// The identity this endpoint was created with.
    fn local_peer(&self) -> &PeerId;

    /// Peers currently in this endpoint's session.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Sends `data` to every peer in `to`. Delivery is reliable and
    /// ordered per sender.
    fn send(&self, data: &[u8], to: &[PeerId]) -> Result<(), TransportError>;

    /// Looks for peers advertising `service_type`. Peers advertising any
    /// other service are never reported.
    fn start_browsing(&self, service_type: &str) -> Result<(), TransportError>;

    fn stop_browsing(&self);

    fn start_advertising(&self, service_type: &str) -> Result<(), TransportError>;

    fn stop_advertising(&self);

    /// Invites a discovered peer into this endpoint's session. The peer
    /// reports `NotConnected` if it does not answer within `timeout`.
    fn invite(
        &self,
        peer: &PeerId,
        timeout: Duration,
    ) -> Result<(), TransportError>;

    /// Leaves the session. Remaining peers observe `NotConnected`.
    fn disconnect(&self);
}
