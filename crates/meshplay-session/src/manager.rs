//! Session manager: owns the transport and tracks who is in the session.

use std::collections::HashMap;

use meshplay_protocol::{Message, MessageFactory, WireCodec};
use meshplay_transport::{
    InvitationReply, MeshTransport, PeerConnectionState, PeerId,
    TransportEvent,
};
use tokio::sync::broadcast;

use crate::{Mode, PeerController, PeerStatus, SessionConfig, SessionError, Transition};

/// Progress of one invitation as shown in a lobby.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteStatus {
    Pending,
    Connecting,
    Connected,
    NotConnected,
}

/// A lobby entry: a peer taking part in an invitation, and how far it got.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInvite {
    pub peer: PeerId,
    pub status: InviteStatus,
}

/// Change notifications for observers (lobby screens, the demo).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotification {
    FoundPeersChanged,
    PeerInvitesChanged,
    PeersChanged,
}

/// Coordinates one local peer's session.
///
/// All methods take `&mut self` and are meant to be called from a single
/// task: the peer actor that also drains the transport's event stream and
/// feeds it to [`handle_event`](Self::handle_event).
pub struct SessionManager<T: MeshTransport> {
    transport: T,
    config: SessionConfig,
    codec: WireCodec,
    peers: PeerController,
    factory: MessageFactory,

    /// Peers discovered while browsing, in discovery order.
    found_peers: Vec<PeerId>,

    /// Invitation progress, one entry per peer.
    invites: Vec<PeerInvite>,

    /// Invitations waiting for a manual answer (auto-accept disabled).
    unanswered: HashMap<PeerId, InvitationReply>,

    notifications: broadcast::Sender<SessionNotification>,
}

impl<T: MeshTransport> SessionManager<T> {
    /// Creates a manager in idle mode for the transport's local peer.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let local = transport.local_peer().clone();
        let (notifications, _) =
            broadcast::channel(config.notification_capacity.max(1));
        tracing::info!(peer = %local, service = %config.service_type, "session created");
        Self {
            transport,
            codec: WireCodec::default(),
            peers: PeerController::new(local.clone()),
            factory: MessageFactory::new(local),
            found_peers: Vec::new(),
            invites: Vec::new(),
            unanswered: HashMap::new(),
            notifications,
            config,
        }
    }

    // -- Accessors ----------------------------------------------------------

    pub fn local_peer(&self) -> &PeerId {
        self.factory.sender()
    }

    /// Factory for messages stamped with the local peer as sender.
    pub fn messages(&self) -> &MessageFactory {
        &self.factory
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.peers.mode()
    }

    pub fn peers(&self) -> &PeerController {
        &self.peers
    }

    pub fn peer_status(&self, peer: &PeerId) -> Option<PeerStatus> {
        self.peers.status(peer)
    }

    pub fn found_peers(&self) -> &[PeerId] {
        &self.found_peers
    }

    pub fn peer_invites(&self) -> &[PeerInvite] {
        &self.invites
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Live session membership as reported by the transport.
    pub fn connected_peers(&self) -> Vec<PeerId> {
        self.transport.connected_peers()
    }

    /// Subscribes to change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.notifications.subscribe()
    }

    // -- Modes --------------------------------------------------------------

    /// Switches to `mode`, stopping whatever discovery the old mode ran.
    ///
    /// Peers that are not connected are forgotten; so are found peers and
    /// unfinished invitations.
    pub fn set_mode(&mut self, mode: Mode) {
        match self.peers.mode() {
            Mode::Browsing => self.transport.stop_browsing(),
            Mode::Advertising => self.transport.stop_advertising(),
            Mode::Idle => {}
        }

        self.peers.set_mode(mode);

        if !self.found_peers.is_empty() {
            self.found_peers.clear();
            self.notify(SessionNotification::FoundPeersChanged);
        }
        let before = self.invites.len();
        self.invites
            .retain(|invite| invite.status == InviteStatus::Connected);
        if self.invites.len() != before {
            self.notify(SessionNotification::PeerInvitesChanged);
        }
        for (peer, reply) in self.unanswered.drain() {
            tracing::debug!(%peer, "declining unanswered invitation on mode change");
            reply.decline();
        }

        tracing::info!(peer = %self.local_peer(), %mode, "mode set");
        self.notify(SessionNotification::PeersChanged);
    }

    pub fn reset_mode(&mut self) {
        self.set_mode(Mode::Idle);
    }

    pub fn start_browsing(&mut self) -> Result<(), SessionError> {
        self.require_mode("start_browsing", Mode::Browsing)?;
        if let Err(e) = self.transport.start_browsing(&self.config.service_type) {
            tracing::warn!(error = %e, "failed to start browsing");
        }
        Ok(())
    }

    pub fn stop_browsing(&mut self) -> Result<(), SessionError> {
        self.require_mode("stop_browsing", Mode::Browsing)?;
        self.transport.stop_browsing();
        Ok(())
    }

    pub fn start_advertising(&mut self) -> Result<(), SessionError> {
        self.require_mode("start_advertising", Mode::Advertising)?;
        if let Err(e) = self.transport.start_advertising(&self.config.service_type) {
            tracing::warn!(error = %e, "failed to start advertising");
        }
        Ok(())
    }

    pub fn stop_advertising(&mut self) -> Result<(), SessionError> {
        self.require_mode("stop_advertising", Mode::Advertising)?;
        self.transport.stop_advertising();
        Ok(())
    }

    fn require_mode(
        &self,
        operation: &'static str,
        expected: Mode,
    ) -> Result<(), SessionError> {
        match self.peers.mode() {
            actual if actual == expected => Ok(()),
            Mode::Idle => Err(SessionError::ModeNotSet { operation }),
            actual => Err(SessionError::WrongMode {
                operation,
                expected,
                actual,
            }),
        }
    }

    // -- Invitations --------------------------------------------------------

    /// Invites a found peer into the local session.
    ///
    /// # Errors
    /// - [`SessionError::ModeNotSet`] / [`SessionError::WrongMode`] outside
    ///   browsing mode.
    /// - [`SessionError::NotFound`] if `peer` is not a found peer.
    /// - [`SessionError::Desync`] if `peer` was already invited.
    pub fn invite_peer(&mut self, peer: &PeerId) -> Result<(), SessionError> {
        self.require_mode("invite_peer", Mode::Browsing)?;
        if !self.found_peers.contains(peer) {
            return Err(SessionError::NotFound(peer.clone()));
        }

        self.peers.peer_was_invited(peer)?;
        let local = self.local_peer().clone();
        self.add_peer_invite(&local);
        self.add_peer_invite(peer);
        self.notify(SessionNotification::PeersChanged);

        if let Err(e) = self.transport.invite(peer, self.config.invite_timeout) {
            tracing::warn!(%peer, error = %e, "invitation could not be sent");
            self.update_peer_invite(peer, InviteStatus::NotConnected);
            self.apply_peer_action(|pc| pc.peer_did_not_connect(peer))?;
        } else {
            tracing::info!(%peer, timeout = ?self.config.invite_timeout, "peer invited");
        }
        Ok(())
    }

    /// Answers an invitation that was held because auto-accept is off.
    pub fn answer_invitation(
        &mut self,
        peer: &PeerId,
        accept: bool,
    ) -> Result<(), SessionError> {
        let reply = self
            .unanswered
            .remove(peer)
            .ok_or_else(|| SessionError::NotFound(peer.clone()))?;
        if accept {
            tracing::info!(%peer, "invitation accepted");
            reply.accept();
        } else {
            tracing::info!(%peer, "invitation declined");
            reply.decline();
            self.update_peer_invite(peer, InviteStatus::NotConnected);
            self.apply_peer_action(|pc| pc.peer_did_not_connect(peer))?;
        }
        Ok(())
    }

    /// Peers whose invitations are waiting for [`answer_invitation`](Self::answer_invitation).
    pub fn unanswered_invitations(&self) -> impl Iterator<Item = &PeerId> {
        self.unanswered.keys()
    }

    // -- Found peers and invites ---------------------------------------------

    /// Records a discovered peer. Returns `false` if it was already known.
    pub fn add_found_peer(&mut self, peer: &PeerId) -> bool {
        if self.found_peers.contains(peer) {
            return false;
        }
        self.found_peers.push(peer.clone());
        self.notify(SessionNotification::FoundPeersChanged);
        true
    }

    /// Forgets a discovered peer.
    ///
    /// # Errors
    /// [`SessionError::UnknownFoundPeer`] if it was never found.
    pub fn remove_found_peer(&mut self, peer: &PeerId) -> Result<(), SessionError> {
        let index = self
            .found_peers
            .iter()
            .position(|p| p == peer)
            .ok_or_else(|| SessionError::UnknownFoundPeer(peer.clone()))?;
        self.found_peers.remove(index);
        self.notify(SessionNotification::FoundPeersChanged);
        Ok(())
    }

    /// Adds a pending invite entry for `peer` unless one exists.
    pub fn add_peer_invite(&mut self, peer: &PeerId) -> bool {
        if self.invites.iter().any(|i| i.peer == *peer) {
            return false;
        }
        self.invites.push(PeerInvite {
            peer: peer.clone(),
            status: InviteStatus::Pending,
        });
        self.notify(SessionNotification::PeerInvitesChanged);
        true
    }

    /// Sets the invite status of `peer`, creating the entry if needed.
    pub fn update_peer_invite(&mut self, peer: &PeerId, status: InviteStatus) {
        self.add_peer_invite(peer);
        let changed = self
            .invites
            .iter_mut()
            .find(|i| i.peer == *peer)
            .is_some_and(|invite| {
                std::mem::replace(&mut invite.status, status) != status
            });
        if changed {
            self.notify(SessionNotification::PeerInvitesChanged);
        }
    }

    // -- Precedence ---------------------------------------------------------

    /// The local peer and every connected peer, in precedence order.
    ///
    /// Every replica sorts the same set by [`PeerId`]'s ordering, so all
    /// of them agree on the ranks without exchanging anything.
    pub fn precedence_order(&self) -> Vec<PeerId> {
        let mut order = self.connected_peers();
        order.push(self.local_peer().clone());
        order.sort();
        order.dedup();
        order
    }

    /// Rank of `peer` in [`precedence_order`](Self::precedence_order).
    pub fn precedence_of(&self, peer: &PeerId) -> Option<usize> {
        self.precedence_order().iter().position(|p| p == peer)
    }

    /// Rank of the local peer. `0` is the coordinator.
    pub fn precedence(&self) -> usize {
        self.precedence_of(self.local_peer()).unwrap_or(0)
    }

    pub fn is_highest_precedence(&self) -> bool {
        self.precedence() == 0
    }

    /// The peer with rank `0`.
    pub fn coordinator(&self) -> PeerId {
        self.precedence_order()
            .into_iter()
            .next()
            .unwrap_or_else(|| self.local_peer().clone())
    }

    // -- Messaging ----------------------------------------------------------

    /// Sends `message` to every connected peer.
    ///
    /// Failures are logged and not retried.
    pub fn send(&self, message: &Message) {
        let to = self.connected_peers();
        self.send_to(message, &to);
    }

    /// Sends `message` to the given peers only.
    pub fn send_to(&self, message: &Message, peers: &[PeerId]) {
        if peers.is_empty() {
            tracing::trace!(event = %message.event(), "no recipients, message not sent");
            return;
        }
        let bytes = match message.encode(&self.codec) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(event = %message.event(), error = %e, "failed to encode message");
                return;
            }
        };
        match self.transport.send(&bytes, peers) {
            Ok(()) => {
                tracing::trace!(event = %message.event(), recipients = peers.len(), "message sent");
            }
            Err(e) => {
                tracing::warn!(event = %message.event(), error = %e, "failed to send message");
            }
        }
    }

    /// Leaves the session and returns to idle mode.
    pub fn disconnect(&mut self) {
        for peer in self.connected_peers() {
            if let Err(e) = self.apply_peer_action(|pc| pc.peer_did_not_connect(&peer)) {
                tracing::warn!(%peer, error = %e, "failed to forget peer on disconnect");
            }
            self.update_peer_invite(&peer, InviteStatus::NotConnected);
        }
        self.transport.disconnect();
        tracing::info!(peer = %self.local_peer(), "left session");
        self.reset_mode();
    }

    // -- Transport events ---------------------------------------------------

    /// Applies one transport event.
    ///
    /// Returns the decoded message for `DataReceived` events that carry a
    /// valid one. Malformed payloads are logged and dropped.
    ///
    /// # Errors
    /// A desynchronized peer lifecycle. The caller should check
    /// [`SessionError::is_fatal`] and stop the peer.
    pub fn handle_event(
        &mut self,
        event: TransportEvent,
    ) -> Result<Option<Message>, SessionError> {
        match event {
            TransportEvent::PeerFound(peer) => {
                if self.mode() != Mode::Browsing {
                    tracing::debug!(%peer, "found peer reported outside browsing mode, ignoring");
                    return Ok(None);
                }
                tracing::debug!(%peer, "peer found");
                self.add_found_peer(&peer);
                self.apply_peer_action(|pc| pc.peer_was_found(&peer))?;
            }
            TransportEvent::PeerLost(peer) => {
                if self.mode() != Mode::Browsing {
                    tracing::debug!(%peer, "lost peer reported outside browsing mode, ignoring");
                    return Ok(None);
                }
                // Queued before a mode change purged the found list.
                if !self.found_peers.contains(&peer) {
                    tracing::debug!(%peer, "lost peer was never found in this mode, ignoring");
                    return Ok(None);
                }
                tracing::debug!(%peer, "peer lost");
                self.remove_found_peer(&peer)?;
                self.apply_peer_action(|pc| pc.peer_was_lost(&peer))?;
            }
            TransportEvent::InvitationReceived { from, reply } => {
                self.on_invitation(from, reply)?;
            }
            TransportEvent::PeerStateChanged { peer, state } => {
                self.on_state_changed(peer, state)?;
            }
            TransportEvent::DataReceived { from, data } => {
                return Ok(self.on_data(&from, &data));
            }
            TransportEvent::BrowsingFailed(reason) => {
                tracing::warn!(%reason, "browsing failed to start");
            }
            TransportEvent::AdvertisingFailed(reason) => {
                tracing::warn!(%reason, "advertising failed to start");
            }
        }
        Ok(None)
    }

    fn on_invitation(
        &mut self,
        from: PeerId,
        reply: InvitationReply,
    ) -> Result<(), SessionError> {
        if self.mode() != Mode::Advertising {
            tracing::debug!(peer = %from, mode = %self.mode(), "invitation outside advertising mode, declining");
            reply.decline();
            return Ok(());
        }

        self.apply_peer_action(|pc| pc.peer_did_receive_invitation(&from))?;
        let local = self.local_peer().clone();
        self.add_peer_invite(&local);
        self.add_peer_invite(&from);

        if self.config.auto_accept_invitations {
            tracing::info!(peer = %from, "invitation received, accepting");
            reply.accept();
        } else {
            tracing::info!(peer = %from, "invitation received, waiting for answer");
            self.unanswered.insert(from, reply);
        }
        Ok(())
    }

    fn on_state_changed(
        &mut self,
        peer: PeerId,
        state: PeerConnectionState,
    ) -> Result<(), SessionError> {
        match state {
            PeerConnectionState::Connecting => {
                tracing::debug!(%peer, "peer connecting");
                self.apply_peer_action(|pc| pc.peer_is_connecting(&peer))?;
                self.update_peer_invite(&peer, InviteStatus::Connecting);
            }
            PeerConnectionState::Connected => {
                tracing::info!(%peer, "peer connected");
                self.apply_peer_action(|pc| pc.peer_did_connect(&peer))?;
                self.update_peer_invite(&peer, InviteStatus::Connected);
            }
            PeerConnectionState::NotConnected => {
                tracing::info!(%peer, "peer not connected");
                self.unanswered.remove(&peer);
                self.apply_peer_action(|pc| pc.peer_did_not_connect(&peer))?;
                self.update_peer_invite(&peer, InviteStatus::NotConnected);
            }
        }
        self.sync_local_invite();
        Ok(())
    }

    /// Mirrors the local peer's lifecycle status into its own invite entry.
    fn sync_local_invite(&mut self) {
        let status = match self.peers.local_status() {
            PeerStatus::Connecting => InviteStatus::Connecting,
            PeerStatus::Connected => InviteStatus::Connected,
            PeerStatus::Joining | PeerStatus::Accepting => InviteStatus::Pending,
            _ => InviteStatus::NotConnected,
        };
        let local = self.local_peer().clone();
        if self.invites.iter().any(|i| i.peer == local) {
            self.update_peer_invite(&local, status);
        }
    }

    fn on_data(&self, from: &PeerId, data: &[u8]) -> Option<Message> {
        let message = match Message::decode(&self.codec, data) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(peer = %from, error = %e, "dropping undecodable message");
                return None;
            }
        };
        if message.sender() != from {
            tracing::warn!(
                peer = %from,
                claimed = %message.sender(),
                event = %message.event(),
                "dropping message with mismatched sender"
            );
            return None;
        }
        if !self.connected_peers().contains(from) {
            tracing::warn!(peer = %from, event = %message.event(), "message from a peer outside the session");
        }
        tracing::trace!(peer = %from, event = %message.event(), "message received");
        Some(message)
    }

    fn apply_peer_action(
        &mut self,
        action: impl FnOnce(&mut PeerController) -> Result<Transition, SessionError>,
    ) -> Result<(), SessionError> {
        if action(&mut self.peers)? == Transition::Applied {
            self.notify(SessionNotification::PeersChanged);
        }
        Ok(())
    }

    fn notify(&self, notification: SessionNotification) {
        // No subscribers is fine.
        let _ = self.notifications.send(notification);
    }
}
