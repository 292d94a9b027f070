//! Error types for the session layer.

use meshplay_transport::PeerId;

use crate::{Mode, PeerAction, PeerStatus};

/// Errors that can occur during session management.
///
/// Most variants describe a protocol desynchronization: the local view of
/// a peer's lifecycle disagrees with what the transport reported. Those
/// cannot be repaired locally; [`SessionError::is_fatal`] tells the host
/// to stop the peer.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A lifecycle action arrived for a peer in a status that does not
    /// allow it (e.g. inviting a peer that was never found).
    #[error("{action} for {peer} is illegal in {mode} mode (status {status:?})")]
    Desync {
        peer: PeerId,
        action: PeerAction,
        mode: Mode,
        status: Option<PeerStatus>,
    },

    /// A browsing/advertising operation was called before any mode was set.
    #[error("{operation} requires a mode, none is set")]
    ModeNotSet { operation: &'static str },

    /// A browsing/advertising operation was called in the other mode.
    #[error("{operation} requires {expected} mode, current mode is {actual}")]
    WrongMode {
        operation: &'static str,
        expected: Mode,
        actual: Mode,
    },

    /// A peer was removed from the found-peer collection without ever
    /// having been added to it.
    #[error("found-peer collection has no entry for {0}")]
    UnknownFoundPeer(PeerId),

    /// The caller asked to invite a peer that is not currently found.
    #[error("peer {0} is not in the found-peer collection")]
    NotFound(PeerId),

    /// Reading or writing the persisted identity failed.
    #[error("identity storage failed: {0}")]
    IdentityIo(#[from] std::io::Error),

    /// The persisted identity exists but cannot be parsed.
    #[error("identity file is malformed: {0}")]
    IdentityFormat(#[from] serde_json::Error),
}

impl SessionError {
    /// `true` for errors that mean the peer-coordination state can no
    /// longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Desync { .. }
                | Self::ModeNotSet { .. }
                | Self::WrongMode { .. }
                | Self::UnknownFoundPeer(_)
        )
    }
}
