//! Game payload types carried in message bodies.
//!
//! Field names on the wire are the short keyed names listed in [`keys`];
//! the Rust names are the readable ones.

use serde::{Deserialize, Serialize};

/// Well-known key names used on the wire.
pub mod keys {
    pub const SENDER: &str = "sndK";
    pub const RECEIVER: &str = "rxrK";
    pub const EVENT: &str = "evtK";
    pub const BODY: &str = "bdyK";
    pub const TEST_MSG_BODY: &str = "tstMsgBdyK";
    pub const GAME_START_DATE: &str = "gamStrDatK";
    pub const TARGET_CONFIG: &str = "trgCfgK";
    pub const PLAYER_CONFIG: &str = "plyCfgK";
    pub const ELEMENT_VECTOR: &str = "elmVecK";
    pub const LOCATIONS: &str = "locK";
    pub const LOCATION_X: &str = "locXK";
    pub const LOCATION_Y: &str = "locY";
    pub const PLAYER_DIRECTION: &str = "dirK";
    pub const PLAYER_TYPE: &str = "typK";
    pub const TARGET_MODE: &str = "modK";
}

/// A cell on the stage grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    #[serde(rename = "locXK")]
    pub x: i32,
    #[serde(rename = "locY")]
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The neighbouring cell one step in `direction`.
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Heading of a player. `Up` decreases `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] =
        [Direction::Up, Direction::Down, Direction::Left, Direction::Right];

    pub fn opposite(self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Grid delta for one step.
    pub fn offset(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

/// Position (and optionally heading) of a stage element.
///
/// Applied verbatim by the receiver; there is no merging with local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementVector {
    #[serde(rename = "locK")]
    pub locations: Vec<Location>,
    #[serde(rename = "dirK", default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl ElementVector {
    pub fn new(locations: Vec<Location>, direction: Option<Direction>) -> Self {
        Self { locations, direction }
    }

    /// A vector that only carries a heading change.
    pub fn heading(direction: Direction) -> Self {
        Self::new(Vec::new(), Some(direction))
    }
}

/// Visual variant of a player, equal to its owner's precedence rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerType(pub u8);

/// Everything a replica needs to create a player identical to the owner's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerConfiguration {
    #[serde(rename = "locK")]
    pub locations: Vec<Location>,
    #[serde(rename = "dirK")]
    pub direction: Direction,
    #[serde(rename = "typK")]
    pub player_type: PlayerType,
}

/// Who moves the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TargetMode {
    /// Mirrors location updates sent by the coordinator.
    #[default]
    NoUpdate,
    /// Relocates itself periodically and broadcasts the new location.
    SelfUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfiguration {
    #[serde(rename = "locK")]
    pub locations: Vec<Location>,
    #[serde(rename = "modK", default)]
    pub mode: TargetMode,
}
