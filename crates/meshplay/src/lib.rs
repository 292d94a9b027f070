//! # Meshplay
//!
//! Peer-to-peer multiplayer game coordination over a local mesh.
//!
//! Every device runs one peer actor. The actor owns the session (who is
//! connected, who coordinates) and the game controller (barriers, turn
//! ordered setup, a clock-synchronized start, state replication). Hosts
//! talk to it through a [`PeerHandle`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meshplay::prelude::*;
//!
//! # async fn demo() -> Result<(), MeshplayError> {
//! let network = MemoryNetwork::new();
//! let (transport, events) = network.join(PeerId::generate("alpha"));
//! let (view, _frames) = ChannelView::new();
//! let stage = GridStage::new(StageConfig::default());
//!
//! let peer = PeerHandle::builder().spawn(transport, events, stage, view);
//! peer.set_mode(Mode::Advertising).await?;
//! peer.start_advertising().await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod logging;
mod peer;

pub use error::MeshplayError;
pub use peer::{
    DEFAULT_COMMAND_CAPACITY, PeerBuilder, PeerHandle, PeerInfo, local_identity,
};

pub use meshplay_clock as clock;
pub use meshplay_game as game;
pub use meshplay_protocol as protocol;
pub use meshplay_session as session;
pub use meshplay_transport as transport;

/// The types most hosts need.
pub mod prelude {
    pub use crate::{MeshplayError, PeerBuilder, PeerHandle, PeerInfo, local_identity};
    pub use meshplay_game::{
        ArrowKeys, ChannelView, Element, ElementSnapshot, GameConfig, GameStatus,
        GameView, GridStage, KeyBindings, Stage, StageConfig, ViewEvent,
    };
    pub use meshplay_protocol::{Direction, Location};
    pub use meshplay_session::{Mode, SessionConfig, SessionNotification};
    pub use meshplay_transport::{MemoryNetwork, MeshTransport, PeerId};
}
