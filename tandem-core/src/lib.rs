//! tandem-core: peer-session synchronization for two-player games
//!
//! Two independent clients keep one consistent shared game state
//! (moves, chat, control actions, presence) through an
//! eventually-consistent keyed document store that offers only get,
//! set, push, change-subscriptions, and disconnect hooks — no
//! server-side game logic, no transactions, no central arbiter.
//!
//! The crate provides:
//!
//! - **Session lifecycle** - [`SessionManager`] creates/joins sessions,
//!   assigns roles and colors, and wires the components below
//! - **Move sync** - [`MoveSynchronizer`](session::MoveSynchronizer)
//!   applies each remote move exactly once via a watermark over the
//!   append-only move log, with echo suppression and late-joiner
//!   catch-up
//! - **Control signals** - [`ActionChannel`](session::ActionChannel)
//!   for resign, draw offers/responses, and rematch requests
//! - **Presence** - [`PresenceTracker`](session::PresenceTracker) over
//!   store disconnect hooks
//! - **Store seam** - [`SessionStore`] trait with [`MemoryStore`] for
//!   tests and local play
//! - **Rules seam** - [`RulesEngine`] trait; legality checking lives
//!   outside this crate
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tandem_core::{
//!     MemoryStore, RecordingRules, RulesEngine, SessionEvent, SessionManager, SessionStore,
//!     SyncConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! let conn: Arc<dyn SessionStore> = Arc::new(store.connect());
//! let rules: Arc<dyn RulesEngine> = Arc::new(RecordingRules::new());
//!
//! let manager = SessionManager::new(conn, rules, SyncConfig::default());
//! let mut events = manager.subscribe();
//!
//! let code = manager.create_session().await?;
//! println!("share this code: {code}");
//!
//! manager.send_move("e2", "e4", None, None).await?;
//! while let Ok(event) = events.recv().await {
//!     if let SessionEvent::MoveApplied { from, to, .. } = event {
//!         println!("opponent played {from}{to}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod code;
pub mod config;
pub mod error;
pub mod rules;
pub mod session;
pub mod store;
pub mod types;

// Re-export key types for convenience
pub use config::{STARTING_POSITION, SyncConfig};
pub use error::{SessionError, StoreError, TandemError};
pub use rules::{AppliedMove, RecordingRules, RulesEngine};
pub use session::SessionManager;
pub use store::{MemoryConnection, MemoryStore, SessionStore};
pub use types::{
    ActionKind, ActionRecord, ChatRecord, Color, MoveRecord, Role, SessionDoc, SessionEvent,
};
