//! # meshplay-game
//!
//! Game coordination on top of a Meshplay session: acknowledgement
//! barriers, precedence-ordered player setup, a clock-synchronized start
//! and state replication while playing.
//!
//! The [`GameController`] is synchronous. It owns no timers; the caller
//! arms the start deadline from [`GameController::take_start_deadline`]
//! and calls [`GameController::step`] on every tick.

mod barrier;
mod config;
mod controller;
mod error;
mod mesh;
mod stage;
mod view;

pub use barrier::AckBarrier;
pub use config::{GameConfig, StageConfig};
pub use controller::{Disposition, GameController, GameStatus};
pub use error::GameError;
pub use mesh::PeerMesh;
pub use stage::{Element, ElementSnapshot, GridStage, PlayerHandle, Stage};
pub use view::{ArrowKeys, ChannelView, GameView, KeyBindings, ViewEvent};
