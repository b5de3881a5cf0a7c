//! Move synchronization
//!
//! MoveSynchronizer publishes local moves to the append-only move log
//! and applies remote moves exactly once. Exactly-once hinges on the
//! watermark: the count of log entries already consumed, whether
//! applied (remote origin) or self-originated (echo). Every
//! notification replays the log from the watermark forward, so
//! re-delivered or full-history notifications fast-forward silently.
//!
//! All watermark advancement happens on the single consumer task that
//! owns this subscription (plus the one-time initialization at join),
//! which is what makes suppression by origin role race-free.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error};
use uuid::Uuid;

use super::paths;
use crate::error::StoreError;
use crate::rules::RulesEngine;
use crate::store::SessionStore;
use crate::types::{MoveRecord, Role, SessionEvent, keyed_records, monotonic_millis};

pub struct MoveSynchronizer {
    store: Arc<dyn SessionStore>,
    rules: Arc<dyn RulesEngine>,
    events: broadcast::Sender<SessionEvent>,
    code: String,
    role: Role,
    /// Count of move-log entries already consumed
    watermark: AtomicUsize,
    last_timestamp: AtomicI64,
}

impl MoveSynchronizer {
    /// Create a synchronizer with its initial watermark.
    ///
    /// The watermark must be captured from the session document read
    /// at join time, before subscribing, so that history already
    /// reflected in the loaded board snapshot is never re-applied.
    pub fn new(
        store: Arc<dyn SessionStore>,
        rules: Arc<dyn RulesEngine>,
        events: broadcast::Sender<SessionEvent>,
        code: impl Into<String>,
        role: Role,
        initial_watermark: usize,
    ) -> Self {
        Self {
            store,
            rules,
            events,
            code: code.into(),
            role,
            watermark: AtomicUsize::new(initial_watermark),
            last_timestamp: AtomicI64::new(0),
        }
    }

    /// Entries already consumed
    pub fn watermark(&self) -> usize {
        self.watermark.load(Ordering::SeqCst)
    }

    /// Publish a local move, optionally persisting a board snapshot
    /// for fast rejoin.
    ///
    /// Fire-and-forget beyond the store write: a rejected write
    /// surfaces here synchronously and nothing is retried; remote
    /// application is only observable through the subscription.
    pub async fn send_move(
        &self,
        from: &str,
        to: &str,
        promotion: Option<&str>,
        snapshot: Option<&str>,
    ) -> Result<(), StoreError> {
        let record = MoveRecord {
            id: Uuid::new_v4().to_string(),
            from: from.to_string(),
            to: to.to_string(),
            promotion: promotion.map(str::to_string),
            origin: self.role,
            timestamp: monotonic_millis(&self.last_timestamp),
        };
        debug!(code = %self.code, from, to, "publishing local move");

        self.store
            .push(&paths::moves(&self.code), serde_json::to_value(&record)?)
            .await?;

        if let Some(board) = snapshot {
            self.store
                .set(&paths::board(&self.code), Value::String(board.to_string()))
                .await?;
        }
        Ok(())
    }

    /// Consume move-log notifications until the subscription ends
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Value>) {
        while let Some(value) = rx.recv().await {
            self.process(value).await;
        }
        debug!(code = %self.code, "move subscription ended");
    }

    /// Process one delivered snapshot of the move log, strictly in
    /// order, no gap-skipping
    async fn process(&self, value: Value) {
        let log: Vec<MoveRecord> = keyed_records(value);
        let mark = self.watermark.load(Ordering::SeqCst);

        if log.len() < mark {
            // The store must deliver notifications in mutation order;
            // a log shorter than what we already consumed violates
            // that contract. Logged, not recovered.
            error!(
                code = %self.code,
                log_len = log.len(),
                watermark = mark,
                "out-of-order move log delivery"
            );
            return;
        }

        for record in &log[mark..] {
            if record.origin == self.role {
                debug!(code = %self.code, id = %record.id, "echo of local move suppressed");
            } else {
                self.apply_remote(record).await;
            }
            self.watermark.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn apply_remote(&self, record: &MoveRecord) {
        let applied = self
            .rules
            .apply_move(&record.from, &record.to, record.promotion.as_deref())
            .await;

        if applied {
            debug!(code = %self.code, id = %record.id, "applied remote move");
            let _ = self.events.send(SessionEvent::MoveApplied {
                from: record.from.clone(),
                to: record.to.clone(),
                promotion: record.promotion.clone(),
            });
        } else {
            // The peers have diverged. Surface it and move past the
            // record so it is reported exactly once.
            error!(code = %self.code, id = %record.id, "rules engine rejected confirmed remote move");
            let _ = self.events.send(SessionEvent::Desync {
                record: record.clone(),
            });
        }
    }
}
