//! Synchronization configuration

use serde::{Deserialize, Serialize};

/// Standard chess starting position (FEN)
pub const STARTING_POSITION: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Configuration for a [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Capacity of the outbound event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Length of generated session codes
    #[serde(default = "default_code_length")]
    pub code_length: usize,

    /// Serialized board position written to new sessions
    #[serde(default = "default_starting_position")]
    pub starting_position: String,
}

fn default_event_capacity() -> usize {
    100
}

fn default_code_length() -> usize {
    6
}

fn default_starting_position() -> String {
    STARTING_POSITION.to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            code_length: default_code_length(),
            starting_position: default_starting_position(),
        }
    }
}
