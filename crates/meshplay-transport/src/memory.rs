//! In-process mesh transport.
//!
//! A [`MemoryNetwork`] is a registry of nodes living in the same process.
//! Each node gets a [`MemoryTransport`] plus an unbounded event channel.
//! Sessions are full meshes: when an invitation is accepted, every member
//! of the inviter's session is linked to every member of the invitee's.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::{
    InvitationReply, MeshTransport, PeerConnectionState, PeerId,
    TransportError, TransportEvent,
};

struct Node {
    events: mpsc::UnboundedSender<TransportEvent>,
    /// Service type this node browses for, if browsing.
    browsing: Option<String>,
    /// Service type this node advertises, if advertising.
    advertising: Option<String>,
    links: BTreeSet<PeerId>,
}

impl Node {
    fn emit(&self, event: TransportEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<PeerId, Node>,
    /// Outstanding invitations as `(inviter, invitee)`.
    pending: HashSet<(PeerId, PeerId)>,
}

impl NetworkState {
    fn emit(&self, to: &PeerId, event: TransportEvent) {
        if let Some(node) = self.nodes.get(to) {
            node.emit(event);
        }
    }

    fn state_changed(
        &self,
        to: &PeerId,
        peer: &PeerId,
        state: PeerConnectionState,
    ) {
        self.emit(
            to,
            TransportEvent::PeerStateChanged {
                peer: peer.clone(),
                state,
            },
        );
    }

    fn unlink_all(&mut self, peer: &PeerId) {
        let links = match self.nodes.get_mut(peer) {
            Some(node) => std::mem::take(&mut node.links),
            None => return,
        };
        for other in &links {
            if let Some(node) = self.nodes.get_mut(other) {
                node.links.remove(peer);
            }
            self.state_changed(other, peer, PeerConnectionState::NotConnected);
        }
    }

    fn connect(&mut self, inviter: &PeerId, invitee: &PeerId) {
        let (Some(a), Some(b)) =
            (self.nodes.get(inviter), self.nodes.get(invitee))
        else {
            self.state_changed(
                inviter,
                invitee,
                PeerConnectionState::NotConnected,
            );
            return;
        };

        let mut group_a: Vec<PeerId> = a.links.iter().cloned().collect();
        group_a.push(inviter.clone());
        let mut group_b: Vec<PeerId> = b.links.iter().cloned().collect();
        group_b.push(invitee.clone());

        self.state_changed(inviter, invitee, PeerConnectionState::Connecting);
        self.state_changed(invitee, inviter, PeerConnectionState::Connecting);

        for x in &group_a {
            for y in &group_b {
                if x == y {
                    continue;
                }
                let newly_linked = self
                    .nodes
                    .get_mut(x)
                    .is_some_and(|node| node.links.insert(y.clone()));
                if !newly_linked {
                    continue;
                }
                if let Some(node) = self.nodes.get_mut(y) {
                    node.links.insert(x.clone());
                }
                self.state_changed(x, y, PeerConnectionState::Connected);
                self.state_changed(y, x, PeerConnectionState::Connected);
            }
        }

        tracing::debug!(%inviter, %invitee, "mesh sessions merged");
    }
}

/// Shared registry of in-process nodes. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node and returns its transport and event stream.
    ///
    /// Joining with an identity that is already registered replaces the
    /// earlier node.
    pub fn join(
        &self,
        peer: PeerId,
    ) -> (MemoryTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();
        if state.nodes.contains_key(&peer) {
            tracing::warn!(%peer, "peer rejoined, replacing previous node");
            state.unlink_all(&peer);
        }
        state.nodes.insert(
            peer.clone(),
            Node {
                events: tx,
                browsing: None,
                advertising: None,
                links: BTreeSet::new(),
            },
        );
        drop(state);

        tracing::debug!(%peer, "node joined memory network");
        let transport = MemoryTransport {
            local: peer,
            network: self.clone(),
        };
        (transport, rx)
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn answer(&self, inviter: &PeerId, invitee: &PeerId, accepted: bool) {
        let mut state = self.lock();
        if !state.pending.remove(&(inviter.clone(), invitee.clone())) {
            tracing::debug!(%inviter, %invitee, "late answer to expired invitation");
            return;
        }
        if accepted {
            state.connect(inviter, invitee);
        } else {
            tracing::debug!(%inviter, %invitee, "invitation declined");
            state.state_changed(
                inviter,
                invitee,
                PeerConnectionState::NotConnected,
            );
        }
    }

    fn expire(&self, inviter: &PeerId, invitee: &PeerId) {
        let mut state = self.lock();
        if state.pending.remove(&(inviter.clone(), invitee.clone())) {
            tracing::debug!(%inviter, %invitee, "invitation timed out");
            state.state_changed(
                inviter,
                invitee,
                PeerConnectionState::NotConnected,
            );
            state.state_changed(
                invitee,
                inviter,
                PeerConnectionState::NotConnected,
            );
        }
    }

    fn leave(&self, peer: &PeerId) {
        let mut state = self.lock();
        state.unlink_all(peer);
        if let Some(node) = state.nodes.remove(peer) {
            if let Some(service) = &node.advertising {
                for other in state
                    .nodes
                    .values()
                    .filter(|n| n.browsing.as_ref() == Some(service))
                {
                    other.emit(TransportEvent::PeerLost(peer.clone()));
                }
            }
        }
        state.pending.retain(|(a, b)| a != peer && b != peer);
        tracing::debug!(%peer, "node left memory network");
    }
}

/// One node's endpoint on a [`MemoryNetwork`]. Leaves the network on drop.
pub struct MemoryTransport {
    local: PeerId,
    network: MemoryNetwork,
}

impl MeshTransport for MemoryTransport {
    fn local_peer(&self) -> &PeerId {
        &self.local
    }

    fn connected_peers(&self) -> Vec<PeerId> {
        self.network
            .lock()
            .nodes
            .get(&self.local)
            .map(|node| node.links.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn send(&self, data: &[u8], to: &[PeerId]) -> Result<(), TransportError> {
        let state = self.network.lock();
        let node =
            state.nodes.get(&self.local).ok_or(TransportError::Shutdown)?;
        // One unlinked recipient fails the whole send, even when the link
        // dropped a moment ago and the others are still reachable.
        if let Some(missing) = to.iter().find(|p| !node.links.contains(*p)) {
            return Err(TransportError::NotConnected(missing.clone()));
        }
        for peer in to {
            state.emit(
                peer,
                TransportEvent::DataReceived {
                    from: self.local.clone(),
                    data: data.to_vec(),
                },
            );
        }
        Ok(())
    }

    fn start_browsing(&self, service_type: &str) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let node = state
            .nodes
            .get_mut(&self.local)
            .ok_or(TransportError::Shutdown)?;
        node.browsing = Some(service_type.to_string());

        let advertisers: Vec<PeerId> = state
            .nodes
            .iter()
            .filter(|(id, n)| {
                n.advertising.as_deref() == Some(service_type) && **id != self.local
            })
            .map(|(id, _)| id.clone())
            .collect();
        for peer in advertisers {
            state.emit(&self.local, TransportEvent::PeerFound(peer));
        }
        tracing::debug!(peer = %self.local, service = service_type, "browsing started");
        Ok(())
    }

    fn stop_browsing(&self) {
        if let Some(node) = self.network.lock().nodes.get_mut(&self.local) {
            node.browsing = None;
        }
    }

    fn start_advertising(&self, service_type: &str) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        let node = state
            .nodes
            .get_mut(&self.local)
            .ok_or(TransportError::Shutdown)?;
        node.advertising = Some(service_type.to_string());

        for (id, other) in &state.nodes {
            if other.browsing.as_deref() == Some(service_type) && *id != self.local {
                other.emit(TransportEvent::PeerFound(self.local.clone()));
            }
        }
        tracing::debug!(peer = %self.local, service = service_type, "advertising started");
        Ok(())
    }

    fn stop_advertising(&self) {
        let mut state = self.network.lock();
        let advertised = state
            .nodes
            .get_mut(&self.local)
            .and_then(|node| node.advertising.take());
        if let Some(service) = advertised {
            for (id, other) in &state.nodes {
                if other.browsing.as_ref() == Some(&service) && *id != self.local {
                    other.emit(TransportEvent::PeerLost(self.local.clone()));
                }
            }
        }
    }

    fn invite(
        &self,
        peer: &PeerId,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.network.lock();
        if !state.nodes.contains_key(&self.local) {
            return Err(TransportError::Shutdown);
        }
        let invitee = state
            .nodes
            .get(peer)
            .ok_or_else(|| TransportError::UnknownPeer(peer.clone()))?;
        if invitee.advertising.is_none() {
            return Err(TransportError::NotAdvertising(peer.clone()));
        }

        let inviter = self.local.clone();
        let network = self.network.clone();
        let (from, to) = (inviter.clone(), peer.clone());
        let reply = InvitationReply::new(move |accepted| {
            network.answer(&from, &to, accepted);
        });
        invitee.emit(TransportEvent::InvitationReceived {
            from: inviter.clone(),
            reply,
        });
        state.pending.insert((inviter.clone(), peer.clone()));
        drop(state);

        if let Ok(handle) = Handle::try_current() {
            let network = self.network.clone();
            let invitee = peer.clone();
            handle.spawn(async move {
                tokio::time::sleep(timeout).await;
                network.expire(&inviter, &invitee);
            });
        }
        Ok(())
    }

    fn disconnect(&self) {
        self.network.lock().unlink_all(&self.local);
        tracing::debug!(peer = %self.local, "left session");
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.network.leave(&self.local);
    }
}
