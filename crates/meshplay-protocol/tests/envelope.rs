//! Integration tests for the message envelope: wire shape, round trips
//! through the framed codec, and dispatch.

use meshplay_protocol::{
    Codec, Direction, ElementVector, EventKind, GameMessages, JsonCodec,
    Location, Message, MessageFactory, PlayerConfiguration, PlayerType,
    ProtocolError, TargetConfiguration, TargetMode, WireCodec, keys,
};
use meshplay_transport::PeerId;

// =========================================================================
// Helpers
// =========================================================================

fn factory() -> MessageFactory {
    MessageFactory::new(PeerId::new("alpha", 1))
}

fn wire() -> WireCodec {
    WireCodec::default()
}

/// Records which handler ran for each dispatched message.
#[derive(Default)]
struct Recorder {
    calls: Vec<&'static str>,
}

impl GameMessages for Recorder {
    type Output = &'static str;

    fn test_message(&mut self, _: &Message) -> &'static str {
        self.record("test_message")
    }
    fn did_show_game_view_controller(&mut self, _: &Message) -> &'static str {
        self.record("did_show_game_view_controller")
    }
    fn schedule_game(&mut self, _: &Message) -> &'static str {
        self.record("schedule_game")
    }
    fn did_schedule_game(&mut self, _: &Message) -> &'static str {
        self.record("did_schedule_game")
    }
    fn init_target(&mut self, _: &Message) -> &'static str {
        self.record("init_target")
    }
    fn init_player(&mut self, _: &Message) -> &'static str {
        self.record("init_player")
    }
    fn element_did_move(&mut self, _: &Message) -> &'static str {
        self.record("element_did_move")
    }
    fn player_did_change_direction(&mut self, _: &Message) -> &'static str {
        self.record("player_did_change_direction")
    }
    fn player_did_crash(&mut self, _: &Message) -> &'static str {
        self.record("player_did_crash")
    }
    fn player_did_secure_target(&mut self, _: &Message) -> &'static str {
        self.record("player_did_secure_target")
    }
    fn target_was_secured(&mut self, _: &Message) -> &'static str {
        self.record("target_was_secured")
    }
    fn target_did_update_location(&mut self, _: &Message) -> &'static str {
        self.record("target_did_update_location")
    }
    fn game_did_end(&mut self, _: &Message) -> &'static str {
        self.record("game_did_end")
    }
}

impl Recorder {
    fn record(&mut self, name: &'static str) -> &'static str {
        self.calls.push(name);
        name
    }
}

// =========================================================================
// Wire shape
// =========================================================================

#[test]
fn test_encode_uses_keyed_field_names() {
    let msg = factory().schedule_game("1700000000.000000");
    let bytes = msg.encode(&JsonCodec).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(value[keys::EVENT], 2);
    assert_eq!(value[keys::SENDER]["name"], "alpha");
    assert_eq!(
        value[keys::BODY][keys::GAME_START_DATE]["Text"],
        "1700000000.000000"
    );
}

#[test]
fn test_encode_without_body_omits_body_key() {
    let msg = factory().show_game_view_controller();
    let bytes = msg.encode(&JsonCodec).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(value.get(keys::BODY).is_none());
}

// =========================================================================
// Round trips
// =========================================================================

#[test]
fn test_schedule_game_round_trip_preserves_date_string() {
    let original = factory().schedule_game("1700000000.000000");

    let bytes = original.encode(&wire()).unwrap();
    let decoded = Message::decode(&wire(), &bytes).unwrap();

    assert_eq!(decoded.event(), EventKind::ScheduleGame);
    assert_eq!(decoded.sender(), original.sender());
    assert_eq!(decoded.game_start_date(), Some("1700000000.000000"));
    assert_eq!(decoded, original);
}

#[test]
fn test_decode_missing_body_yields_none() {
    let bytes = br#"{"evtK":12,"sndK":{"name":"bravo","uid":2}}"#;
    let msg = Message::decode(&JsonCodec, bytes).unwrap();
    assert_eq!(msg.event(), EventKind::GameDidEnd);
    assert!(msg.body().is_none());
}

#[test]
fn test_init_player_round_trip_keeps_configuration() {
    let config = PlayerConfiguration {
        locations: vec![Location::new(4, 4), Location::new(4, 5)],
        direction: Direction::Up,
        player_type: PlayerType(1),
    };
    let msg = factory().init_player(config.clone());

    let decoded =
        Message::decode(&wire(), &msg.encode(&wire()).unwrap()).unwrap();
    assert_eq!(decoded.player_config(), Some(&config));
}

#[test]
fn test_init_target_round_trip_keeps_mode() {
    let config = TargetConfiguration {
        locations: vec![Location::new(9, 9)],
        mode: TargetMode::NoUpdate,
    };
    let decoded = Message::decode(
        &wire(),
        &factory().init_target(config.clone()).encode(&wire()).unwrap(),
    )
    .unwrap();
    assert_eq!(decoded.target_config(), Some(&config));
}

#[test]
fn test_decode_unknown_event_tag_is_rejected() {
    let bytes = br#"{"evtK":99,"sndK":{"name":"bravo","uid":2}}"#;
    let err = Message::decode(&JsonCodec, bytes).unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownEvent(99)));
}

#[test]
fn test_decode_truncated_frame_is_rejected() {
    let mut bytes = factory().game_did_end().encode(&wire()).unwrap();
    bytes.truncate(bytes.len() - 1);
    let err = Message::decode(&wire(), &bytes).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidMessage(_)));
}

#[test]
fn test_decode_unframed_json_with_framed_codec_fails() {
    let bytes = factory().game_did_end().encode(&JsonCodec).unwrap();
    assert!(Message::decode(&wire(), &bytes).is_err());
}

// =========================================================================
// Dispatch
// =========================================================================

#[test]
fn test_dispatch_routes_each_event_to_one_handler() {
    let f = factory();
    let vector = ElementVector::heading(Direction::Left);
    let messages = vec![
        f.test("hello"),
        f.show_game_view_controller(),
        f.schedule_game("1.000000"),
        f.did_schedule_game(),
        f.init_target(TargetConfiguration {
            locations: vec![],
            mode: TargetMode::NoUpdate,
        }),
        f.init_player(PlayerConfiguration {
            locations: vec![],
            direction: Direction::Down,
            player_type: PlayerType(0),
        }),
        f.element_did_move(vector.clone()),
        f.player_did_change_direction(vector.clone()),
        f.player_did_crash(),
        f.player_did_secure_target(),
        f.target_was_secured(vector.clone()),
        f.target_did_update_location(vector),
        f.game_did_end(),
    ];

    let mut recorder = Recorder::default();
    for msg in &messages {
        msg.dispatch(&mut recorder);
    }

    assert_eq!(
        recorder.calls,
        vec![
            "test_message",
            "did_show_game_view_controller",
            "schedule_game",
            "did_schedule_game",
            "init_target",
            "init_player",
            "element_did_move",
            "player_did_change_direction",
            "player_did_crash",
            "player_did_secure_target",
            "target_was_secured",
            "target_did_update_location",
            "game_did_end",
        ]
    );
}

#[test]
fn test_dispatch_returns_handler_output() {
    let mut recorder = Recorder::default();
    let out = factory().test("ping").dispatch(&mut recorder);
    assert_eq!(out, "test_message");
}

#[test]
fn test_codec_trait_is_usable_generically() {
    fn encode_twice<C: Codec>(codec: &C, msg: &Message) -> (Vec<u8>, Vec<u8>) {
        (msg.encode(codec).unwrap(), msg.encode(codec).unwrap())
    }
    let (a, b) = encode_twice(&wire(), &factory().test("same"));
    assert_eq!(a, b);
}
