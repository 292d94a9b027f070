//! Session layer for Meshplay.
//!
//! Manages who the local peer is playing with:
//!
//! - **Peer lifecycle** ([`PeerController`]): the mode-scoped state
//!   machine that tracks every known peer's [`PeerStatus`].
//! - **Session manager** ([`SessionManager`]): owns the transport, turns
//!   its events into lifecycle actions, keeps the lobby collections
//!   (found peers, invites) and computes precedence.
//! - **Identity** ([`IdentityStore`]): keeps the local [`PeerId`] stable
//!   across runs.
//!
//! [`PeerId`]: meshplay_transport::PeerId

mod config;
mod error;
mod identity;
mod manager;
mod peer;

pub use config::SessionConfig;
pub use error::SessionError;
pub use identity::{IDENTITY_KEY, IdentityStore};
pub use manager::{
    InviteStatus, PeerInvite, SessionManager, SessionNotification,
};
pub use peer::{Mode, PeerAction, PeerController, PeerStatus, Transition};
