//! Opponent presence tracking
//!
//! Watches the remote peer's presence flag and emits an event on every
//! flip. Presence is eventually consistent: after a real network loss
//! the flag only turns false once the store executes the peer's
//! disconnect hook. Disconnection never ends the game; only an
//! explicit resign does.

use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use crate::types::SessionEvent;

pub struct PresenceTracker {
    events: broadcast::Sender<SessionEvent>,
    code: String,
    last: Mutex<Option<bool>>,
}

impl PresenceTracker {
    pub fn new(events: broadcast::Sender<SessionEvent>, code: impl Into<String>) -> Self {
        Self {
            events,
            code: code.into(),
            last: Mutex::new(None),
        }
    }

    /// Last observed opponent connectivity, if any notification has
    /// arrived yet
    pub fn opponent_connected(&self) -> Option<bool> {
        *self.last.lock().unwrap()
    }

    /// Consume presence-flag notifications until the subscription ends
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Value>) {
        while let Some(value) = rx.recv().await {
            self.process(value);
        }
        debug!(code = %self.code, "presence subscription ended");
    }

    fn process(&self, value: Value) {
        // An absent flag reads as disconnected
        let connected = value.as_bool().unwrap_or(false);
        let mut last = self.last.lock().unwrap();
        if *last == Some(connected) {
            return;
        }
        *last = Some(connected);
        info!(code = %self.code, connected, "opponent connectivity changed");
        let _ = self
            .events
            .send(SessionEvent::OpponentPresence { connected });
    }
}
