//! Peer connection lifecycle state machine.
//!
//! Every known peer (the local one included) has exactly one
//! [`PeerStatus`]. Which lifecycle actions are legal depends on the
//! process-wide [`Mode`]. All legal transitions live in one table,
//! [`PeerController::apply`], so the whole protocol can be audited in a
//! single match.
//!
//! ```text
//!            Browsing mode                       Advertising mode
//!
//!   (none) ──found──→ Found                (none) ──invitation──→ Joining
//!   Found  ──lost───→ (none)               Joining ──connecting──→ Connecting
//!   Found  ──invited→ Accepting
//!   Accepting ─connecting→ Connecting
//!
//!            any mode:  * ──connected──→ Connected
//!                       * ──not connected──→ (none)
//! ```

use std::collections::HashMap;
use std::fmt;

use meshplay_transport::PeerId;

use crate::SessionError;

/// The local peer's discovery role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Neither browsing nor advertising. Only disconnect cleanup applies.
    #[default]
    Idle,
    /// Looking for hosts.
    Browsing,
    /// Hosting and accepting invitations.
    Advertising,
}

impl Mode {
    /// Status the local peer falls back to when it is alone in this mode.
    pub fn baseline(self) -> PeerStatus {
        match self {
            Self::Idle => PeerStatus::Initialized,
            Self::Browsing => PeerStatus::Browsing,
            Self::Advertising => PeerStatus::Hosting,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Browsing => "browsing",
            Self::Advertising => "advertising",
        };
        f.write_str(name)
    }
}

/// Lifecycle status of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerStatus {
    Initialized,
    Browsing,
    Hosting,
    Found,
    Accepting,
    Joining,
    Connecting,
    Connected,
    NotConnected,
}

/// Lifecycle events reported for a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerAction {
    WasFound,
    WasLost,
    WasInvited,
    DidReceiveInvitation,
    IsConnecting,
    DidConnect,
    DidNotConnect,
}

impl fmt::Display for PeerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WasFound => "peer_was_found",
            Self::WasLost => "peer_was_lost",
            Self::WasInvited => "peer_was_invited",
            Self::DidReceiveInvitation => "peer_did_receive_invitation",
            Self::IsConnecting => "peer_is_connecting",
            Self::DidConnect => "peer_did_connect",
            Self::DidNotConnect => "peer_did_not_connect",
        };
        f.write_str(name)
    }
}

/// Outcome of a lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The status map changed.
    Applied,
    /// The current mode does not recognize the action, or it had no
    /// effect on the current status.
    Ignored,
}

/// What a row of the transition table does.
enum Step {
    Ignore,
    Set {
        peer: PeerStatus,
        local: Option<PeerStatus>,
    },
    Remove,
    RemoveAndRebase,
}

/// Tracks the lifecycle status of every known peer under the current mode.
pub struct PeerController {
    local: PeerId,
    mode: Mode,
    peers: HashMap<PeerId, PeerStatus>,
}

impl PeerController {
    /// Creates a controller in idle mode with the local peer `Initialized`.
    pub fn new(local: PeerId) -> Self {
        let peers = HashMap::from([(local.clone(), PeerStatus::Initialized)]);
        Self {
            local,
            mode: Mode::Idle,
            peers,
        }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn status(&self, peer: &PeerId) -> Option<PeerStatus> {
        self.peers.get(peer).copied()
    }

    pub fn local_status(&self) -> PeerStatus {
        self.status(&self.local).unwrap_or(PeerStatus::Initialized)
    }

    /// Iterates over every known peer and its status, self included.
    pub fn peers(&self) -> impl Iterator<Item = (&PeerId, PeerStatus)> {
        self.peers.iter().map(|(peer, status)| (peer, *status))
    }

    /// Number of known peers, self included.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Always `false`: the local peer is always tracked.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    // -- Mode switching ---------------------------------------------------

    /// Leaves the current mode, then enters `mode`.
    ///
    /// If only the local peer is left and it is still `Initialized`, it
    /// moves to the new mode's baseline (`Browsing` or `Hosting`).
    pub fn set_mode(&mut self, mode: Mode) {
        self.leave_mode();
        self.mode = mode;

        if self.peers.len() == 1
            && self.local_status() == PeerStatus::Initialized
            && mode != Mode::Idle
        {
            self.set(self.local.clone(), mode.baseline());
        }
        tracing::debug!(%mode, local = %self.local, status = ?self.local_status(), "mode entered");
    }

    /// Returns to idle mode.
    pub fn reset_mode(&mut self) {
        self.set_mode(Mode::Idle);
    }

    /// Discards every peer that is not `Connected`.
    ///
    /// The local peer is always kept: `Connected` if anyone else still is,
    /// `Initialized` otherwise.
    pub fn leave_mode(&mut self) {
        let before = self.peers.len();
        self.peers.retain(|_, status| *status == PeerStatus::Connected);

        if !self.peers.contains_key(&self.local) {
            let status = if self.peers.is_empty() {
                PeerStatus::Initialized
            } else {
                PeerStatus::Connected
            };
            self.peers.insert(self.local.clone(), status);
        }
        tracing::debug!(
            mode = %self.mode,
            purged = before.saturating_sub(self.peers.len()),
            "mode left"
        );
    }

    // -- Lifecycle actions ------------------------------------------------

    pub fn peer_was_found(&mut self, peer: &PeerId) -> Result<Transition, SessionError> {
        self.apply(PeerAction::WasFound, peer)
    }

    pub fn peer_was_lost(&mut self, peer: &PeerId) -> Result<Transition, SessionError> {
        self.apply(PeerAction::WasLost, peer)
    }

    pub fn peer_was_invited(&mut self, peer: &PeerId) -> Result<Transition, SessionError> {
        self.apply(PeerAction::WasInvited, peer)
    }

    pub fn peer_did_receive_invitation(
        &mut self,
        peer: &PeerId,
    ) -> Result<Transition, SessionError> {
        self.apply(PeerAction::DidReceiveInvitation, peer)
    }

    pub fn peer_is_connecting(&mut self, peer: &PeerId) -> Result<Transition, SessionError> {
        self.apply(PeerAction::IsConnecting, peer)
    }

    pub fn peer_did_connect(&mut self, peer: &PeerId) -> Result<Transition, SessionError> {
        self.apply(PeerAction::DidConnect, peer)
    }

    pub fn peer_did_not_connect(&mut self, peer: &PeerId) -> Result<Transition, SessionError> {
        self.apply(PeerAction::DidNotConnect, peer)
    }

    /// Applies `action` to `peer` according to the transition table.
    ///
    /// # Errors
    /// Returns [`SessionError::Desync`] when the mode recognizes the action
    /// but the peer's status does not allow it.
    pub fn apply(
        &mut self,
        action: PeerAction,
        peer: &PeerId,
    ) -> Result<Transition, SessionError> {
        use Mode::{Advertising, Browsing, Idle};
        use PeerAction::*;
        use PeerStatus as S;

        if *peer == self.local {
            tracing::warn!(%action, "lifecycle action reported for the local peer, ignoring");
            return Ok(Transition::Ignored);
        }

        let current = self.status(peer);
        let step = match (self.mode, action, current) {
            (Browsing, WasFound, None) => Step::Set {
                peer: S::Found,
                local: None,
            },
            (_, WasFound, _) => Step::Ignore,

            (Browsing, WasLost, Some(S::Found)) => Step::Remove,
            (_, WasLost, _) => Step::Ignore,

            (Browsing, WasInvited, Some(S::Found)) => Step::Set {
                peer: S::Accepting,
                local: Some(S::Joining),
            },
            (Browsing, WasInvited, _) => return Err(self.desync(action, peer)),
            (_, WasInvited, _) => Step::Ignore,

            (Advertising, DidReceiveInvitation, None) => Step::Set {
                peer: S::Joining,
                local: Some(S::Accepting),
            },
            (Advertising, DidReceiveInvitation, Some(_)) => {
                return Err(self.desync(action, peer));
            }
            (_, DidReceiveInvitation, _) => Step::Ignore,

            (Browsing, IsConnecting, Some(S::Accepting))
            | (Advertising, IsConnecting, Some(S::Joining)) => Step::Set {
                peer: S::Connecting,
                local: Some(S::Connecting),
            },
            (Browsing | Advertising, IsConnecting, _) => {
                return Err(self.desync(action, peer));
            }
            (Idle, IsConnecting, _) => Step::Ignore,

            (_, DidConnect, _) => Step::Set {
                peer: S::Connected,
                local: Some(S::Connected),
            },

            (_, DidNotConnect, Some(_)) => Step::RemoveAndRebase,
            (_, DidNotConnect, None) => Step::Ignore,
        };

        let transition = match step {
            Step::Ignore => Transition::Ignored,
            Step::Set { peer: status, local } => {
                let changed = current != Some(status)
                    || local.is_some_and(|s| s != self.local_status());
                self.set(peer.clone(), status);
                if let Some(local_status) = local {
                    self.set(self.local.clone(), local_status);
                }
                if changed {
                    Transition::Applied
                } else {
                    Transition::Ignored
                }
            }
            Step::Remove => {
                self.peers.remove(peer);
                Transition::Applied
            }
            Step::RemoveAndRebase => {
                self.peers.remove(peer);
                if self.peers.len() == 1 {
                    self.set(self.local.clone(), self.mode.baseline());
                }
                Transition::Applied
            }
        };

        if transition == Transition::Applied {
            tracing::debug!(
                %action,
                %peer,
                mode = %self.mode,
                status = ?self.status(peer),
                local_status = ?self.local_status(),
                "peer status changed"
            );
        }
        Ok(transition)
    }

    fn set(&mut self, peer: PeerId, status: PeerStatus) {
        self.peers.insert(peer, status);
    }

    fn desync(&self, action: PeerAction, peer: &PeerId) -> SessionError {
        let err = SessionError::Desync {
            peer: peer.clone(),
            action,
            mode: self.mode,
            status: self.status(peer),
        };
        tracing::error!(error = %err, "peer lifecycle desynchronized");
        err
    }
}

// =========================================================================
// Tests
// =========================================================================
