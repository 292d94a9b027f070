//! The message envelope and its dispatch onto a receiver-side protocol.
//!
//! A [`Message`] is `{event, sender, body?}`. Messages are only built by a
//! [`MessageFactory`] bound to the local peer, so the sender can never be
//! forged by calling code. On arrival, [`Message::dispatch`] routes the
//! message to exactly one [`GameMessages`] handler.

use std::collections::BTreeMap;
use std::fmt;

use meshplay_transport::PeerId;
use serde::{Deserialize, Serialize};

use crate::types::keys;
use crate::{
    Codec, ElementVector, PlayerConfiguration, ProtocolError,
    TargetConfiguration,
};

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Every event the game protocol can carry. The discriminants are the
/// wire tags and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EventKind {
    TestMsg = 0,
    ShowGameViewController = 1,
    ScheduleGame = 2,
    DidScheduleGame = 3,
    InitTarget = 4,
    InitPlayer = 5,
    ElementDidMove = 6,
    PlayerDidChangeDirection = 7,
    PlayerDidCrash = 8,
    PlayerDidSecureTarget = 9,
    TargetWasSecured = 10,
    TargetDidUpdateLocation = 11,
    GameDidEnd = 12,
}

impl EventKind {
    pub const ALL: [EventKind; 13] = [
        Self::TestMsg,
        Self::ShowGameViewController,
        Self::ScheduleGame,
        Self::DidScheduleGame,
        Self::InitTarget,
        Self::InitPlayer,
        Self::ElementDidMove,
        Self::PlayerDidChangeDirection,
        Self::PlayerDidCrash,
        Self::PlayerDidSecureTarget,
        Self::TargetWasSecured,
        Self::TargetDidUpdateLocation,
        Self::GameDidEnd,
    ];

    /// The `int32` tag used on the wire.
    pub fn tag(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for EventKind {
    type Error = ProtocolError;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.tag() == tag)
            .ok_or(ProtocolError::UnknownEvent(tag))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// Named fields a message body may carry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BodyKey {
    #[serde(rename = "tstMsgBdyK")]
    TestMsgBody,
    #[serde(rename = "gamStrDatK")]
    GameStartDate,
    #[serde(rename = "trgCfgK")]
    TargetConfig,
    #[serde(rename = "plyCfgK")]
    PlayerConfig,
    #[serde(rename = "elmVecK")]
    ElementVector,
}

impl BodyKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TestMsgBody => keys::TEST_MSG_BODY,
            Self::GameStartDate => keys::GAME_START_DATE,
            Self::TargetConfig => keys::TARGET_CONFIG,
            Self::PlayerConfig => keys::PLAYER_CONFIG,
            Self::ElementVector => keys::ELEMENT_VECTOR,
        }
    }
}

/// A typed value stored under a [`BodyKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyValue {
    Text(String),
    TargetConfig(TargetConfiguration),
    PlayerConfig(PlayerConfiguration),
    ElementVector(ElementVector),
}

pub type Body = BTreeMap<BodyKey, BodyValue>;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// An immutable protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    event: EventKind,
    sender: PeerId,
    body: Option<Body>,
}

/// Serialized shape of a message. The event stays a raw tag here so an
/// unknown value surfaces as [`ProtocolError::UnknownEvent`] rather than
/// a generic decode failure.
#[derive(Serialize)]
struct WireRef<'a> {
    #[serde(rename = "evtK")]
    event: i32,
    #[serde(rename = "sndK")]
    sender: &'a PeerId,
    #[serde(rename = "bdyK", skip_serializing_if = "Option::is_none")]
    body: Option<&'a Body>,
}

#[derive(Deserialize)]
struct Wire {
    #[serde(rename = "evtK")]
    event: i32,
    #[serde(rename = "sndK")]
    sender: PeerId,
    #[serde(rename = "bdyK", default)]
    body: Option<Body>,
}

impl Message {
    pub fn event(&self) -> EventKind {
        self.event
    }

    pub fn sender(&self) -> &PeerId {
        &self.sender
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    pub fn get(&self, key: BodyKey) -> Option<&BodyValue> {
        self.body.as_ref()?.get(&key)
    }

    /// The start timestamp of a `ScheduleGame` message.
    pub fn game_start_date(&self) -> Option<&str> {
        match self.get(BodyKey::GameStartDate)? {
            BodyValue::Text(date) => Some(date),
            _ => None,
        }
    }

    pub fn test_body(&self) -> Option<&str> {
        match self.get(BodyKey::TestMsgBody)? {
            BodyValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn target_config(&self) -> Option<&TargetConfiguration> {
        match self.get(BodyKey::TargetConfig)? {
            BodyValue::TargetConfig(config) => Some(config),
            _ => None,
        }
    }

    pub fn player_config(&self) -> Option<&PlayerConfiguration> {
        match self.get(BodyKey::PlayerConfig)? {
            BodyValue::PlayerConfig(config) => Some(config),
            _ => None,
        }
    }

    pub fn element_vector(&self) -> Option<&ElementVector> {
        match self.get(BodyKey::ElementVector)? {
            BodyValue::ElementVector(vector) => Some(vector),
            _ => None,
        }
    }

    pub fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, ProtocolError> {
        codec.encode(&WireRef {
            event: self.event.tag(),
            sender: &self.sender,
            body: self.body.as_ref(),
        })
    }

    /// Decodes a message, rejecting unknown event tags.
    pub fn decode<C: Codec>(codec: &C, data: &[u8]) -> Result<Self, ProtocolError> {
        let wire: Wire = codec.decode(data)?;
        Ok(Self {
            event: EventKind::try_from(wire.event)?,
            sender: wire.sender,
            body: wire.body,
        })
    }

    /// Routes this message to the one handler for its event.
    pub fn dispatch<H: GameMessages + ?Sized>(&self, handler: &mut H) -> H::Output {
        match self.event {
            EventKind::TestMsg => handler.test_message(self),
            EventKind::ShowGameViewController => {
                handler.did_show_game_view_controller(self)
            }
            EventKind::ScheduleGame => handler.schedule_game(self),
            EventKind::DidScheduleGame => handler.did_schedule_game(self),
            EventKind::InitTarget => handler.init_target(self),
            EventKind::InitPlayer => handler.init_player(self),
            EventKind::ElementDidMove => handler.element_did_move(self),
            EventKind::PlayerDidChangeDirection => {
                handler.player_did_change_direction(self)
            }
            EventKind::PlayerDidCrash => handler.player_did_crash(self),
            EventKind::PlayerDidSecureTarget => {
                handler.player_did_secure_target(self)
            }
            EventKind::TargetWasSecured => handler.target_was_secured(self),
            EventKind::TargetDidUpdateLocation => {
                handler.target_did_update_location(self)
            }
            EventKind::GameDidEnd => handler.game_did_end(self),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.event, self.sender)
    }
}

/// Receiver side of the game protocol: one method per [`EventKind`].
///
/// Adding an event without a handler is a compile error in
/// [`Message::dispatch`].
pub trait GameMessages {
    type Output;

    fn test_message(&mut self, message: &Message) -> Self::Output;
    fn did_show_game_view_controller(&mut self, message: &Message) -> Self::Output;
    fn schedule_game(&mut self, message: &Message) -> Self::Output;
    fn did_schedule_game(&mut self, message: &Message) -> Self::Output;
    fn init_target(&mut self, message: &Message) -> Self::Output;
    fn init_player(&mut self, message: &Message) -> Self::Output;
    fn element_did_move(&mut self, message: &Message) -> Self::Output;
    fn player_did_change_direction(&mut self, message: &Message) -> Self::Output;
    fn player_did_crash(&mut self, message: &Message) -> Self::Output;
    fn player_did_secure_target(&mut self, message: &Message) -> Self::Output;
    fn target_was_secured(&mut self, message: &Message) -> Self::Output;
    fn target_did_update_location(&mut self, message: &Message) -> Self::Output;
    fn game_did_end(&mut self, message: &Message) -> Self::Output;
}

// ---------------------------------------------------------------------------
// MessageFactory
// ---------------------------------------------------------------------------

/// Builds messages stamped with the local peer as sender.
#[derive(Debug, Clone)]
pub struct MessageFactory {
    sender: PeerId,
}

fn body(key: BodyKey, value: BodyValue) -> Option<Body> {
    Some(Body::from([(key, value)]))
}

impl MessageFactory {
    pub fn new(sender: PeerId) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> &PeerId {
        &self.sender
    }

    /// Builds a message with an arbitrary body.
    pub fn message(&self, event: EventKind, body: Option<Body>) -> Message {
        Message {
            event,
            sender: self.sender.clone(),
            body,
        }
    }

    pub fn test(&self, text: impl Into<String>) -> Message {
        self.message(
            EventKind::TestMsg,
            body(BodyKey::TestMsgBody, BodyValue::Text(text.into())),
        )
    }

    pub fn show_game_view_controller(&self) -> Message {
        self.message(EventKind::ShowGameViewController, None)
    }

    pub fn schedule_game(&self, start_date: impl Into<String>) -> Message {
        self.message(
            EventKind::ScheduleGame,
            body(BodyKey::GameStartDate, BodyValue::Text(start_date.into())),
        )
    }

    pub fn did_schedule_game(&self) -> Message {
        self.message(EventKind::DidScheduleGame, None)
    }

    pub fn init_target(&self, config: TargetConfiguration) -> Message {
        self.message(
            EventKind::InitTarget,
            body(BodyKey::TargetConfig, BodyValue::TargetConfig(config)),
        )
    }

    pub fn init_player(&self, config: PlayerConfiguration) -> Message {
        self.message(
            EventKind::InitPlayer,
            body(BodyKey::PlayerConfig, BodyValue::PlayerConfig(config)),
        )
    }

    pub fn element_did_move(&self, vector: ElementVector) -> Message {
        self.vector_message(EventKind::ElementDidMove, vector)
    }

    pub fn player_did_change_direction(&self, vector: ElementVector) -> Message {
        self.vector_message(EventKind::PlayerDidChangeDirection, vector)
    }

    pub fn player_did_crash(&self) -> Message {
        self.message(EventKind::PlayerDidCrash, None)
    }

    pub fn player_did_secure_target(&self) -> Message {
        self.message(EventKind::PlayerDidSecureTarget, None)
    }

    pub fn target_was_secured(&self, vector: ElementVector) -> Message {
        self.vector_message(EventKind::TargetWasSecured, vector)
    }

    pub fn target_did_update_location(&self, vector: ElementVector) -> Message {
        self.vector_message(EventKind::TargetDidUpdateLocation, vector)
    }

    pub fn game_did_end(&self) -> Message {
        self.message(EventKind::GameDidEnd, None)
    }

    fn vector_message(&self, event: EventKind, vector: ElementVector) -> Message {
        self.message(
            event,
            body(BodyKey::ElementVector, BodyValue::ElementVector(vector)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_tags_are_stable() {
        assert_eq!(EventKind::TestMsg.tag(), 0);
        assert_eq!(EventKind::ScheduleGame.tag(), 2);
        assert_eq!(EventKind::GameDidEnd.tag(), 12);
        for kind in EventKind::ALL {
            assert_eq!(EventKind::try_from(kind.tag()).unwrap(), kind);
        }
    }

    #[test]
    fn test_event_kind_unknown_tag_is_rejected() {
        let err = EventKind::try_from(42).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownEvent(42)));
    }

    #[test]
    fn test_factory_stamps_sender() {
        let factory = MessageFactory::new(PeerId::new("alpha", 1));
        let msg = factory.player_did_crash();
        assert_eq!(msg.sender(), &PeerId::new("alpha", 1));
        assert_eq!(msg.event(), EventKind::PlayerDidCrash);
        assert!(msg.body().is_none());
    }

    #[test]
    fn test_accessor_with_wrong_value_type_returns_none() {
        let factory = MessageFactory::new(PeerId::new("alpha", 1));
        let msg = factory.message(
            EventKind::ScheduleGame,
            body(
                BodyKey::GameStartDate,
                BodyValue::ElementVector(ElementVector::new(vec![], None)),
            ),
        );
        assert_eq!(msg.game_start_date(), None);
    }

    #[test]
    fn test_body_key_as_str_matches_serde_name() {
        let json = serde_json::to_string(&BodyKey::GameStartDate).unwrap();
        assert_eq!(json, format!("\"{}\"", BodyKey::GameStartDate.as_str()));
    }
}
