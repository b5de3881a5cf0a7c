//! Session-control signal channel
//!
//! Resign, draw offers/responses, and rematch requests travel through
//! an append-only action log consumed with the same watermark strategy
//! as moves. The historical single-slot shape allowed a rapid second
//! action to clobber an unobserved first one; the log shape removes
//! that overwrite window entirely. A seen-id set remains as a
//! defensive layer: a correctly-advancing watermark makes duplicate
//! dispatch unreachable, and if it ever happens it is a silent no-op.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error};
use uuid::Uuid;

use super::paths;
use crate::error::StoreError;
use crate::store::SessionStore;
use crate::types::{ActionKind, ActionRecord, Role, SessionEvent, keyed_records, monotonic_millis};

pub struct ActionChannel {
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
    code: String,
    role: Role,
    watermark: AtomicUsize,
    seen: Mutex<HashSet<String>>,
    last_timestamp: AtomicI64,
}

impl ActionChannel {
    /// Create a channel with its initial watermark (action-log length
    /// at join time, so stale historical actions are not replayed)
    pub fn new(
        store: Arc<dyn SessionStore>,
        events: broadcast::Sender<SessionEvent>,
        code: impl Into<String>,
        role: Role,
        initial_watermark: usize,
    ) -> Self {
        Self {
            store,
            events,
            code: code.into(),
            role,
            watermark: AtomicUsize::new(initial_watermark),
            seen: Mutex::new(HashSet::new()),
            last_timestamp: AtomicI64::new(0),
        }
    }

    /// Entries already consumed
    pub fn watermark(&self) -> usize {
        self.watermark.load(Ordering::SeqCst)
    }

    /// Broadcast a control signal to the opponent
    pub async fn send_action(&self, kind: ActionKind) -> Result<(), StoreError> {
        let record = ActionRecord {
            id: Uuid::new_v4().to_string(),
            kind,
            origin: self.role,
            timestamp: monotonic_millis(&self.last_timestamp),
        };
        debug!(code = %self.code, ?kind, "publishing action");

        self.store
            .push(&paths::actions(&self.code), serde_json::to_value(&record)?)
            .await?;
        Ok(())
    }

    /// Consume action-log notifications until the subscription ends
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Value>) {
        while let Some(value) = rx.recv().await {
            self.process(value);
        }
        debug!(code = %self.code, "action subscription ended");
    }

    fn process(&self, value: Value) {
        let log: Vec<ActionRecord> = keyed_records(value);
        let mark = self.watermark.load(Ordering::SeqCst);

        if log.len() < mark {
            error!(
                code = %self.code,
                log_len = log.len(),
                watermark = mark,
                "out-of-order action log delivery"
            );
            return;
        }

        for record in &log[mark..] {
            if record.origin != self.role && self.seen.lock().unwrap().insert(record.id.clone()) {
                debug!(code = %self.code, kind = ?record.kind, "received remote action");
                let _ = self
                    .events
                    .send(SessionEvent::ActionReceived { kind: record.kind });
            }
            self.watermark.fetch_add(1, Ordering::SeqCst);
        }
    }
}
