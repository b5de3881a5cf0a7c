//! Session management and synchronization components

pub mod actions;
pub mod chat;
pub mod manager;
pub mod moves;
pub mod presence;

// Re-export key types for convenience
pub use actions::ActionChannel;
pub use chat::ChatRelay;
pub use manager::SessionManager;
pub use moves::MoveSynchronizer;
pub use presence::PresenceTracker;

use crate::types::Role;

/// Store paths for the fields of one session document
pub(crate) mod paths {
    use super::Role;

    pub fn session(code: &str) -> String {
        format!("sessions/{code}")
    }

    pub fn moves(code: &str) -> String {
        format!("sessions/{code}/moves")
    }

    pub fn actions(code: &str) -> String {
        format!("sessions/{code}/actions")
    }

    pub fn chat(code: &str) -> String {
        format!("sessions/{code}/chat")
    }

    pub fn board(code: &str) -> String {
        format!("sessions/{code}/board")
    }

    pub fn presence(code: &str, role: Role) -> String {
        format!("sessions/{code}/{}", role.presence_key())
    }
}
