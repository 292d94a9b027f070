use crate::PeerId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The target peer is not part of this node's session.
    #[error("peer {0} is not connected")]
    NotConnected(PeerId),

    /// The peer is not known to the mesh (never joined, or already left).
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),

    /// The peer is known but is not accepting invitations.
    #[error("peer {0} is not advertising")]
    NotAdvertising(PeerId),

    /// The local node has left the mesh.
    #[error("transport shut down")]
    Shutdown,
}
