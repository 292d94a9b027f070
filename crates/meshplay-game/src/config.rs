//! Game and stage configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings every peer in a game must agree on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    /// How far ahead of "now" the coordinator schedules the start.
    pub start_delay: Duration,

    /// Initial length of each player.
    pub player_size: usize,

    /// Number of cells the target occupies.
    pub target_size: usize,

    /// World steps per second once playing.
    pub step_rate_hz: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_secs(3),
            player_size: 5,
            target_size: 1,
            step_rate_hz: 4,
        }
    }
}

/// Layout of the reference [`GridStage`](crate::GridStage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub width: i32,
    pub height: i32,

    /// A self-updating target jumps elsewhere after this many steps.
    /// 0 keeps it in place until captured.
    pub target_relocate_steps: u32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            width: 40,
            height: 30,
            target_relocate_steps: 40,
        }
    }
}
