//! What the game controller needs from the session.

use meshplay_protocol::{Message, MessageFactory};
use meshplay_session::SessionManager;
use meshplay_transport::{MeshTransport, PeerId};

/// The controller's view of the session: membership, precedence and a way
/// to send messages.
///
/// [`SessionManager`] is the production implementation. Tests substitute
/// an in-memory outbox.
pub trait PeerMesh {
    fn local_peer(&self) -> &PeerId;

    /// Live membership. Barriers compare against this.
    fn connected_peers(&self) -> Vec<PeerId>;

    /// Local rank; `0` is the coordinator.
    fn precedence(&self) -> usize;

    fn is_highest_precedence(&self) -> bool {
        self.precedence() == 0
    }

    fn coordinator(&self) -> PeerId;

    fn messages(&self) -> &MessageFactory;

    /// Sends to every connected peer.
    fn broadcast(&self, message: &Message);

    fn send_to(&self, message: &Message, peers: &[PeerId]);
}

impl<T: MeshTransport> PeerMesh for SessionManager<T> {
    fn local_peer(&self) -> &PeerId {
        SessionManager::local_peer(self)
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        SessionManager::connected_peers(self)
    }

    fn precedence(&self) -> usize {
        SessionManager::precedence(self)
    }

    fn is_highest_precedence(&self) -> bool {
        SessionManager::is_highest_precedence(self)
    }

    fn coordinator(&self) -> PeerId {
        SessionManager::coordinator(self)
    }

    fn messages(&self) -> &MessageFactory {
        SessionManager::messages(self)
    }

    fn broadcast(&self, message: &Message) {
        self.send(message);
    }

    fn send_to(&self, message: &Message, peers: &[PeerId]) {
        SessionManager::send_to(self, message, peers);
    }
}
