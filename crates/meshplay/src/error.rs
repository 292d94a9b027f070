//! Unified error type for Meshplay.

use meshplay_clock::ClockError;
use meshplay_game::GameError;
use meshplay_protocol::ProtocolError;
use meshplay_session::SessionError;
use meshplay_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// Each `#[from]` variant lets `?` convert sub-crate errors directly.
#[derive(Debug, thiserror::Error)]
pub enum MeshplayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Clock(#[from] ClockError),

    /// The peer task has exited; its handle is no longer usable.
    #[error("peer {0} is no longer running")]
    PeerStopped(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err: MeshplayError = TransportError::Shutdown.into();
        assert!(matches!(err, MeshplayError::Transport(_)));
    }

    #[test]
    fn test_from_protocol_error() {
        let err: MeshplayError = ProtocolError::UnknownEvent(42).into();
        assert!(matches!(err, MeshplayError::Protocol(_)));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_from_session_error_keeps_fatality() {
        let err: MeshplayError = SessionError::ModeNotSet {
            operation: "start_browsing",
        }
        .into();
        let MeshplayError::Session(inner) = err else {
            panic!("expected session error");
        };
        assert!(inner.is_fatal());
    }

    #[test]
    fn test_from_clock_error() {
        let err: MeshplayError = ClockError::InvalidStartDate("soon".into()).into();
        assert!(matches!(err, MeshplayError::Clock(_)));
        assert!(err.to_string().contains("soon"));
    }
}
