//! Error types for the game coordination layer.

use meshplay_clock::ClockError;

use crate::GameStatus;

/// Errors that can occur while coordinating a game.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// A local operation was called in a status that does not allow it.
    #[error("{operation} is not allowed while {status}")]
    InvalidState {
        operation: &'static str,
        status: GameStatus,
    },

    /// The coordinator's start date could not be parsed.
    #[error(transparent)]
    InvalidStartDate(#[from] ClockError),
}
