//! Integration tests for `SessionManager` over the in-process mesh.
//!
//! Each test builds real managers on a `MemoryNetwork` and pumps their
//! transport event streams by hand, so every step is deterministic.

use std::time::Duration;

use meshplay_protocol::{EventKind, Message};
use meshplay_session::{
    InviteStatus, Mode, PeerStatus, SessionConfig, SessionError,
    SessionManager, SessionNotification,
};
use meshplay_transport::{
    MemoryNetwork, MemoryTransport, MeshTransport, PeerId, TransportEvent,
};
use tokio::sync::mpsc::UnboundedReceiver;

// =========================================================================
// Helpers
// =========================================================================

struct Node {
    session: SessionManager<MemoryTransport>,
    events: UnboundedReceiver<TransportEvent>,
    inbox: Vec<Message>,
}

impl Node {
    fn join(net: &MemoryNetwork, name: &str, uid: u64) -> Self {
        Self::join_with(net, name, uid, SessionConfig::default())
    }

    fn join_with(
        net: &MemoryNetwork,
        name: &str,
        uid: u64,
        config: SessionConfig,
    ) -> Self {
        let (transport, events) = net.join(PeerId::new(name, uid));
        Self {
            session: SessionManager::new(transport, config),
            events,
            inbox: Vec::new(),
        }
    }

    fn id(&self) -> PeerId {
        self.session.local_peer().clone()
    }

    /// Handles every queued event. Returns how many were handled.
    fn pump_once(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            if let Some(msg) = self.session.handle_event(event).unwrap() {
                self.inbox.push(msg);
            }
            handled += 1;
        }
        handled
    }
}

/// Pumps all nodes until none of them has queued events left.
fn settle(nodes: &mut [&mut Node]) {
    loop {
        let handled: usize = nodes.iter_mut().map(|n| n.pump_once()).sum();
        if handled == 0 {
            break;
        }
    }
}

fn host_and_browser(net: &MemoryNetwork) -> (Node, Node) {
    let mut host = Node::join(net, "host", 1);
    let mut browser = Node::join(net, "browser", 2);
    host.session.set_mode(Mode::Advertising);
    host.session.start_advertising().unwrap();
    browser.session.set_mode(Mode::Browsing);
    browser.session.start_browsing().unwrap();
    settle(&mut [&mut host, &mut browser]);
    (host, browser)
}

fn connect(host: &mut Node, browser: &mut Node) {
    let host_id = host.id();
    browser.session.invite_peer(&host_id).unwrap();
    settle(&mut [host, browser]);
}

// =========================================================================
// Discovery
// =========================================================================

#[test]
fn test_start_browsing_records_found_peer() {
    let net = MemoryNetwork::new();
    let (host, browser) = host_and_browser(&net);

    assert_eq!(browser.session.found_peers(), &[host.id()]);
    assert_eq!(
        browser.session.peer_status(&host.id()),
        Some(PeerStatus::Found)
    );
    assert_eq!(browser.session.peers().local_status(), PeerStatus::Browsing);
    assert_eq!(host.session.peers().local_status(), PeerStatus::Hosting);
}

#[test]
fn test_stop_advertising_removes_found_peer() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);

    host.session.stop_advertising().unwrap();
    settle(&mut [&mut host, &mut browser]);

    assert!(browser.session.found_peers().is_empty());
    assert_eq!(browser.session.peer_status(&host.id()), None);
}

#[test]
fn test_start_browsing_other_service_type_finds_nothing() {
    let net = MemoryNetwork::new();
    let mut host = Node::join(&net, "host", 1);
    let mut browser = Node::join_with(
        &net,
        "browser",
        2,
        SessionConfig {
            service_type: "other-game".to_string(),
            ..SessionConfig::default()
        },
    );

    host.session.set_mode(Mode::Advertising);
    host.session.start_advertising().unwrap();
    browser.session.set_mode(Mode::Browsing);
    browser.session.start_browsing().unwrap();
    settle(&mut [&mut host, &mut browser]);

    assert!(browser.session.found_peers().is_empty());
    assert_eq!(browser.session.peer_status(&host.id()), None);
}

#[test]
fn test_start_browsing_without_mode_is_fatal() {
    let net = MemoryNetwork::new();
    let mut node = Node::join(&net, "solo", 1);

    let err = node.session.start_browsing().unwrap_err();

    assert!(matches!(err, SessionError::ModeNotSet { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_start_advertising_in_browsing_mode_is_wrong_mode() {
    let net = MemoryNetwork::new();
    let mut node = Node::join(&net, "solo", 1);
    node.session.set_mode(Mode::Browsing);

    let err = node.session.start_advertising().unwrap_err();

    assert!(matches!(
        err,
        SessionError::WrongMode {
            expected: Mode::Advertising,
            actual: Mode::Browsing,
            ..
        }
    ));
}

#[test]
fn test_remove_found_peer_unknown_is_fatal() {
    let net = MemoryNetwork::new();
    let mut node = Node::join(&net, "solo", 1);

    let err = node
        .session
        .remove_found_peer(&PeerId::new("ghost", 9))
        .unwrap_err();

    assert!(matches!(err, SessionError::UnknownFoundPeer(_)));
    assert!(err.is_fatal());
}

#[test]
fn test_add_found_peer_twice_keeps_one_entry() {
    let net = MemoryNetwork::new();
    let mut node = Node::join(&net, "solo", 1);
    let peer = PeerId::new("other", 2);

    assert!(node.session.add_found_peer(&peer));
    assert!(!node.session.add_found_peer(&peer));
    assert_eq!(node.session.found_peers().len(), 1);
}

// =========================================================================
// Invitations
// =========================================================================

#[test]
fn test_invite_peer_connects_both_sides() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);

    connect(&mut host, &mut browser);

    assert_eq!(browser.session.connected_peers(), vec![host.id()]);
    assert_eq!(host.session.connected_peers(), vec![browser.id()]);
    assert_eq!(
        browser.session.peer_status(&host.id()),
        Some(PeerStatus::Connected)
    );
    assert_eq!(host.session.peers().local_status(), PeerStatus::Connected);
    assert!(
        host.session
            .peer_invites()
            .iter()
            .all(|i| i.status == InviteStatus::Connected)
    );
}

#[test]
fn test_invite_peer_not_found_is_rejected() {
    let net = MemoryNetwork::new();
    let (_host, mut browser) = host_and_browser(&net);

    let err = browser
        .session
        .invite_peer(&PeerId::new("stranger", 7))
        .unwrap_err();

    assert!(matches!(err, SessionError::NotFound(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_invite_peer_twice_is_desync() {
    let net = MemoryNetwork::new();
    let (host, mut browser) = host_and_browser(&net);

    browser.session.invite_peer(&host.id()).unwrap();
    let err = browser.session.invite_peer(&host.id()).unwrap_err();

    assert!(matches!(err, SessionError::Desync { .. }));
}

#[test]
fn test_manual_answer_decline_resets_both_sides() {
    let net = MemoryNetwork::new();
    let config = SessionConfig {
        auto_accept_invitations: false,
        ..SessionConfig::default()
    };
    let mut host = Node::join_with(&net, "host", 1, config);
    let mut browser = Node::join(&net, "browser", 2);
    host.session.set_mode(Mode::Advertising);
    host.session.start_advertising().unwrap();
    browser.session.set_mode(Mode::Browsing);
    browser.session.start_browsing().unwrap();
    settle(&mut [&mut host, &mut browser]);

    browser.session.invite_peer(&host.id()).unwrap();
    settle(&mut [&mut host, &mut browser]);
    assert_eq!(
        host.session.unanswered_invitations().collect::<Vec<_>>(),
        vec![&browser.id()]
    );

    host.session.answer_invitation(&browser.id(), false).unwrap();
    settle(&mut [&mut host, &mut browser]);

    assert!(host.session.connected_peers().is_empty());
    assert_eq!(host.session.peers().local_status(), PeerStatus::Hosting);
    assert_eq!(browser.session.peers().local_status(), PeerStatus::Browsing);
}

#[tokio::test(start_paused = true)]
async fn test_invite_peer_unanswered_expires_after_timeout() {
    let net = MemoryNetwork::new();
    let config = SessionConfig {
        auto_accept_invitations: false,
        invite_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    };
    let mut host = Node::join_with(&net, "host", 1, config.clone());
    let mut browser = Node::join_with(&net, "browser", 2, config);
    host.session.set_mode(Mode::Advertising);
    host.session.start_advertising().unwrap();
    browser.session.set_mode(Mode::Browsing);
    browser.session.start_browsing().unwrap();
    settle(&mut [&mut host, &mut browser]);

    browser.session.invite_peer(&host.id()).unwrap();
    settle(&mut [&mut host, &mut browser]);
    assert_eq!(browser.session.peers().local_status(), PeerStatus::Joining);

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle(&mut [&mut host, &mut browser]);

    assert_eq!(browser.session.peers().local_status(), PeerStatus::Browsing);
    assert_eq!(browser.session.peer_status(&host.id()), None);
    assert_eq!(host.session.peers().local_status(), PeerStatus::Hosting);
}

// =========================================================================
// Mode changes
// =========================================================================

#[test]
fn test_reset_mode_keeps_connected_peers() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);
    connect(&mut host, &mut browser);

    browser.session.reset_mode();

    assert_eq!(browser.session.mode(), Mode::Idle);
    assert!(browser.session.found_peers().is_empty());
    assert_eq!(
        browser.session.peer_status(&host.id()),
        Some(PeerStatus::Connected)
    );
    assert_eq!(browser.session.peers().local_status(), PeerStatus::Connected);
}

#[test]
fn test_set_mode_notifies_subscribers() {
    let net = MemoryNetwork::new();
    let mut node = Node::join(&net, "solo", 1);
    let mut rx = node.session.subscribe();

    node.session.set_mode(Mode::Browsing);

    assert_eq!(rx.try_recv().unwrap(), SessionNotification::PeersChanged);
}

#[test]
fn test_handle_event_peer_lost_queued_across_mode_change_is_ignored() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);

    // The host leaves while the browser is switching modes.
    host.session.stop_advertising().unwrap();
    browser.session.reset_mode();
    browser.session.set_mode(Mode::Browsing);

    let event = browser.events.try_recv().unwrap();
    assert!(matches!(&event, TransportEvent::PeerLost(peer) if *peer == host.id()));
    assert!(browser.session.handle_event(event).unwrap().is_none());

    assert!(browser.session.found_peers().is_empty());
    assert_eq!(browser.session.peer_status(&host.id()), None);
    assert_eq!(browser.session.mode(), Mode::Browsing);
}

#[test]
fn test_disconnect_leaves_other_side_alone() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);
    connect(&mut host, &mut browser);

    browser.session.disconnect();
    settle(&mut [&mut host, &mut browser]);

    assert!(host.session.connected_peers().is_empty());
    assert_eq!(host.session.peer_status(&browser.id()), None);
    assert_eq!(host.session.peers().local_status(), PeerStatus::Hosting);
}

// =========================================================================
// Precedence
// =========================================================================

#[test]
fn test_precedence_agrees_across_three_peers() {
    let net = MemoryNetwork::new();
    let mut host = Node::join(&net, "bravo", 1);
    let mut a = Node::join(&net, "alpha", 2);
    let mut c = Node::join(&net, "charlie", 3);
    host.session.set_mode(Mode::Advertising);
    host.session.start_advertising().unwrap();
    for node in [&mut a, &mut c] {
        node.session.set_mode(Mode::Browsing);
        node.session.start_browsing().unwrap();
    }
    settle(&mut [&mut host, &mut a, &mut c]);

    let host_id = host.id();
    a.session.invite_peer(&host_id).unwrap();
    settle(&mut [&mut host, &mut a, &mut c]);
    c.session.invite_peer(&host_id).unwrap();
    settle(&mut [&mut host, &mut a, &mut c]);

    let order = host.session.precedence_order();
    assert_eq!(order, a.session.precedence_order());
    assert_eq!(order, c.session.precedence_order());
    assert_eq!(order, vec![a.id(), host.id(), c.id()]);

    assert!(a.session.is_highest_precedence());
    assert_eq!(host.session.precedence(), 1);
    assert_eq!(c.session.precedence(), 2);
    assert_eq!(c.session.coordinator(), a.id());
    assert_eq!(
        a.session.peer_status(&c.id()),
        Some(PeerStatus::Connected)
    );
}

#[test]
fn test_precedence_alone_is_coordinator() {
    let net = MemoryNetwork::new();
    let node = Node::join(&net, "solo", 1);
    assert_eq!(node.session.precedence(), 0);
    assert_eq!(node.session.coordinator(), node.id());
}

// =========================================================================
// Messaging
// =========================================================================

#[test]
fn test_send_delivers_decoded_message() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);
    connect(&mut host, &mut browser);

    let msg = browser.session.messages().test("hello");
    browser.session.send(&msg);
    settle(&mut [&mut host, &mut browser]);

    assert_eq!(host.inbox.len(), 1);
    assert_eq!(host.inbox[0].event(), EventKind::TestMsg);
    assert_eq!(host.inbox[0].test_body(), Some("hello"));
    assert_eq!(host.inbox[0].sender(), &browser.id());
}

#[test]
fn test_handle_event_garbage_payload_is_dropped() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);
    connect(&mut host, &mut browser);

    let out = host
        .session
        .handle_event(TransportEvent::DataReceived {
            from: browser.id(),
            data: b"\x00\x00\x00\x02{}".to_vec(),
        })
        .unwrap();

    assert!(out.is_none());
}

#[test]
fn test_handle_event_spoofed_sender_is_dropped() {
    let net = MemoryNetwork::new();
    let (mut host, mut browser) = host_and_browser(&net);
    connect(&mut host, &mut browser);

    // Encoded by the host itself, so the envelope names the host.
    let msg = host.session.messages().game_did_end();
    let bytes = msg
        .encode(&meshplay_protocol::WireCodec::default())
        .unwrap();
    let out = host
        .session
        .handle_event(TransportEvent::DataReceived {
            from: browser.id(),
            data: bytes,
        })
        .unwrap();

    assert!(out.is_none());
}
