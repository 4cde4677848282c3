//! Runtime configuration handed to the server components at construction.

use shared::{ACTION_POINTS_PER_TURN, DEFAULT_GRID_HEIGHT, DEFAULT_GRID_WIDTH};
use std::time::Duration;

/// Rules that shape every match created by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub grid_width: i32,
    pub grid_height: i32,
    pub action_points_per_turn: u32,
    /// Pick the opening player at random instead of always starting with player1.
    pub random_turn_order: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_width: DEFAULT_GRID_WIDTH,
            grid_height: DEFAULT_GRID_HEIGHT,
            action_points_per_turn: ACTION_POINTS_PER_TURN,
            random_turn_order: false,
        }
    }
}

impl GameConfig {
    /// Opposite corners must be distinct cells, so both sides need at least 2.
    pub fn validate(&self) -> Result<(), String> {
        if self.grid_width < 2 || self.grid_height < 2 {
            return Err(format!(
                "grid must be at least 2x2, got {}x{}",
                self.grid_width, self.grid_height
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub max_connections: usize,
    /// Zero disables the turn watchdog.
    pub turn_timeout: Duration,
    /// Zero disables idle-connection eviction.
    pub idle_timeout: Duration,
    pub game: GameConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            max_connections: 256,
            turn_timeout: Duration::from_secs(45),
            idle_timeout: Duration::from_secs(300),
            game: GameConfig::default(),
        }
    }
}
