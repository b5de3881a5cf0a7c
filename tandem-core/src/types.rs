//! Shared record types for the session document
//!
//! These types define the shape of everything written to the store:
//! the session document itself plus the move, action, and chat records
//! appended underneath it. All records are immutable once written.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which of the two peers a record originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// The other peer in the session
    pub fn opponent(&self) -> Role {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }

    /// The board color assigned to this role (host=white, guest=black,
    /// fixed policy with no renegotiation)
    pub fn color(&self) -> Color {
        match self {
            Self::Host => Color::White,
            Self::Guest => Color::Black,
        }
    }

    /// Field name of this role's presence flag in the session document
    pub fn presence_key(&self) -> &'static str {
        match self {
            Self::Host => "host_present",
            Self::Guest => "guest_present",
        }
    }
}

/// Side of the board a peer plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    White,
    Black,
}

/// One move in the append-only move log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Origin-generated UUID, unique per session
    pub id: String,
    pub from: String,
    pub to: String,
    pub promotion: Option<String>,
    pub origin: Role,
    /// Milliseconds since epoch, strictly monotonic per origin
    pub timestamp: i64,
}

/// One-shot session-control signal kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Resign,
    DrawOffer,
    DrawAccept,
    DrawDecline,
    Rematch,
}

/// One entry in the append-only action log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: String,
    pub kind: ActionKind,
    pub origin: Role,
    pub timestamp: i64,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub text: String,
    pub sender: Role,
    pub timestamp: i64,
}

/// The shared session document, created by the host and mutated by
/// either peer. Never explicitly deleted.
///
/// The keyed maps hold store-generated keys whose natural ordering is
/// the append order, so map iteration yields canonical history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDoc {
    pub code: String,
    pub host_present: bool,
    pub guest_present: bool,
    #[serde(default)]
    pub moves: BTreeMap<String, MoveRecord>,
    #[serde(default)]
    pub actions: BTreeMap<String, ActionRecord>,
    #[serde(default)]
    pub chat: BTreeMap<String, ChatRecord>,
    pub board: String,
    pub created_at: i64,
}

impl SessionDoc {
    /// Initial document as written by `create_session`
    pub fn new(code: impl Into<String>, board: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            host_present: true,
            guest_present: false,
            moves: BTreeMap::new(),
            actions: BTreeMap::new(),
            chat: BTreeMap::new(),
            board: board.into(),
            created_at: now_millis(),
        }
    }
}

/// Events broadcast to the embedding application
///
/// This is the Rust rendition of per-concern callback registrations:
/// callers subscribe once and match on the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A remote move was confirmed and applied via the rules engine
    MoveApplied {
        from: String,
        to: String,
        promotion: Option<String>,
    },

    /// The chat list changed; carries the full timestamp-ordered list
    ChatUpdated { messages: Vec<ChatRecord> },

    /// The opponent's presence flag flipped
    OpponentPresence { connected: bool },

    /// A remote control signal arrived (resign, draw offer, ...)
    ActionReceived { kind: ActionKind },

    /// A board snapshot was loaded at join time instead of replaying
    /// the historical move log
    BoardLoaded { board: String },

    /// The rules engine rejected a supposedly-confirmed remote move.
    /// Not auto-repaired; the record is carried for diagnostics.
    Desync { record: MoveRecord },
}

/// Current wall-clock time in milliseconds since epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Milliseconds-since-epoch clamped to be strictly greater than the
/// last value issued through `last`. Keeps per-origin record
/// timestamps monotonic even when the wall clock stalls or steps back.
pub fn monotonic_millis(last: &AtomicI64) -> i64 {
    let now = now_millis();
    let prev = last.fetch_max(now, Ordering::SeqCst);
    if prev >= now {
        last.fetch_add(1, Ordering::SeqCst) + 1
    } else {
        now
    }
}

/// Decode a keyed list as delivered by the store into records in key
/// order. A missing node (null) is an empty list; an undecodable node
/// is treated the same after a warning, so one malformed write cannot
/// wedge a consumer task.
pub(crate) fn keyed_records<T: serde::de::DeserializeOwned>(value: Value) -> Vec<T> {
    if value.is_null() {
        return Vec::new();
    }
    match serde_json::from_value::<BTreeMap<String, T>>(value) {
        Ok(map) => map.into_values().collect(),
        Err(e) => {
            tracing::warn!(error = %e, "undecodable keyed list from store, ignoring");
            Vec::new()
        }
    }
}
