//! Room and game configuration.

use std::time::Duration;

use crate::words::DEFAULT_WORDS;

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Registry-level limits shared by every room.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Maximum participants per room.
    pub max_players: usize,

    /// A room whose last round start is older than this is swept, even if
    /// it still lists participants.
    pub idle_timeout: Duration,

    /// How often the idle sweep runs.
    pub sweep_interval: Duration,

    /// Chat and system lines kept per room.
    pub max_chat_log: usize,

    /// Length of generated room codes.
    pub room_code_len: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            idle_timeout: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(2 * 60),
            max_chat_log: 100,
            room_code_len: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// GameConfig
// ---------------------------------------------------------------------------

/// Rules for one game of rounds.
#[derive(Debug, Clone)]
pub struct GameConfig {
    pub max_rounds: u32,

    /// Length of the round clock.
    pub round_duration: Duration,

    /// Period of the letter-reveal scheduler.
    pub reveal_interval: Duration,

    /// Pause between `round-end` and the next round.
    pub next_round_delay: Duration,

    /// How long a disconnected drawer keeps the role.
    pub drawer_grace: Duration,

    /// Base points for a correct guess before the reveal penalty.
    pub guess_points: u32,

    /// Extra points for a guess made with the whole clock remaining.
    pub time_bonus: u32,

    /// Points for the drawer when anyone guessed.
    pub draw_points: u32,

    /// Connected participants needed to start a round.
    pub min_players: usize,

    pub words: Vec<String>,
}

impl GameConfig {
    /// The round clock in whole seconds.
    pub fn round_secs(&self) -> u32 {
        self.round_duration.as_secs().min(u64::from(u32::MAX)) as u32
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            round_duration: Duration::from_secs(80),
            reveal_interval: Duration::from_secs(15),
            next_round_delay: Duration::from_secs(5),
            drawer_grace: Duration::from_secs(30),
            guess_points: 100,
            time_bonus: 50,
            draw_points: 50,
            min_players: 2,
            words: DEFAULT_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}
