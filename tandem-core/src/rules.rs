//! Rules engine abstraction
//!
//! Move legality lives outside this crate. The synchronizer calls
//! `apply_move` once per confirmed remote move and trusts the result;
//! remote moves are never pre-validated (two cooperative peers). A
//! rejection therefore means the peers have diverged, not that an
//! illegal move was filtered out.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::types::Color;

/// External rules engine collaborator
#[async_trait]
pub trait RulesEngine: Send + Sync {
    /// Apply a confirmed move to the local position. Returns false if
    /// the engine rejects it.
    async fn apply_move(&self, from: &str, to: &str, promotion: Option<&str>) -> bool;

    /// Serialized current position
    async fn current_position(&self) -> String;

    /// Side to move
    async fn turn(&self) -> Color;

    /// Whether the game has ended by the rules of the game
    async fn is_game_over(&self) -> bool;
}

/// A move as recorded by [`RecordingRules`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMove {
    pub from: String,
    pub to: String,
    pub promotion: Option<String>,
}

/// Recording implementation of [`RulesEngine`] for tests
///
/// Accepts every move unless primed with `reject_next()`, records the
/// applied sequence, and alternates the side to move.
pub struct RecordingRules {
    applied: Mutex<Vec<AppliedMove>>,
    turn: Mutex<Color>,
    position: Mutex<String>,
    reject_next: AtomicBool,
    game_over: AtomicBool,
}

impl RecordingRules {
    pub fn new() -> Self {
        Self {
            applied: Mutex::new(Vec::new()),
            turn: Mutex::new(Color::White),
            position: Mutex::new(String::new()),
            reject_next: AtomicBool::new(false),
            game_over: AtomicBool::new(false),
        }
    }

    /// Moves applied so far, in application order
    pub fn applied(&self) -> Vec<AppliedMove> {
        self.applied.lock().unwrap().clone()
    }

    /// Make the next apply_move call fail (for desync tests)
    pub fn reject_next(&self) {
        self.reject_next.store(true, Ordering::SeqCst);
    }

    /// Override the reported position
    pub fn set_position(&self, position: impl Into<String>) {
        *self.position.lock().unwrap() = position.into();
    }

    /// Mark the game as over
    pub fn finish_game(&self) {
        self.game_over.store(true, Ordering::SeqCst);
    }
}

impl Default for RecordingRules {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RulesEngine for RecordingRules {
    async fn apply_move(&self, from: &str, to: &str, promotion: Option<&str>) -> bool {
        if self.reject_next.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.applied.lock().unwrap().push(AppliedMove {
            from: from.to_string(),
            to: to.to_string(),
            promotion: promotion.map(str::to_string),
        });
        let mut turn = self.turn.lock().unwrap();
        *turn = match *turn {
            Color::White => Color::Black,
            Color::Black => Color::White,
        };
        true
    }

    async fn current_position(&self) -> String {
        self.position.lock().unwrap().clone()
    }

    async fn turn(&self) -> Color {
        *self.turn.lock().unwrap()
    }

    async fn is_game_over(&self) -> bool {
        self.game_over.load(Ordering::SeqCst)
    }
}
