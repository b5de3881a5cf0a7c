//! Chat relay
//!
//! Messages live under store-generated keys, so no de-duplication is
//! needed; every change re-sorts the full list by timestamp and
//! republishes it.

use std::sync::Arc;
use std::sync::atomic::AtomicI64;
use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use super::paths;
use crate::error::StoreError;
use crate::store::SessionStore;
use crate::types::{ChatRecord, Role, SessionEvent, keyed_records, monotonic_millis};

pub struct ChatRelay {
    store: Arc<dyn SessionStore>,
    events: broadcast::Sender<SessionEvent>,
    code: String,
    role: Role,
    messages: Mutex<Vec<ChatRecord>>,
    last_timestamp: AtomicI64,
}

impl ChatRelay {
    pub fn new(
        store: Arc<dyn SessionStore>,
        events: broadcast::Sender<SessionEvent>,
        code: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            store,
            events,
            code: code.into(),
            role,
            messages: Mutex::new(Vec::new()),
            last_timestamp: AtomicI64::new(0),
        }
    }

    /// Send a chat message
    pub async fn send_chat(&self, text: &str) -> Result<(), StoreError> {
        let record = ChatRecord {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            sender: self.role,
            timestamp: monotonic_millis(&self.last_timestamp),
        };
        self.store
            .push(&paths::chat(&self.code), serde_json::to_value(&record)?)
            .await?;
        Ok(())
    }

    /// The current timestamp-ordered message list
    pub fn messages(&self) -> Vec<ChatRecord> {
        self.messages.lock().unwrap().clone()
    }

    /// Consume chat notifications until the subscription ends
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Value>) {
        while let Some(value) = rx.recv().await {
            self.process(value);
        }
        debug!(code = %self.code, "chat subscription ended");
    }

    fn process(&self, value: Value) {
        let mut list: Vec<ChatRecord> = keyed_records(value);
        list.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        *self.messages.lock().unwrap() = list.clone();
        let _ = self.events.send(SessionEvent::ChatUpdated { messages: list });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn make_relay(
        conn: Arc<crate::store::MemoryConnection>,
        role: Role,
    ) -> (Arc<ChatRelay>, broadcast::Receiver<SessionEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (Arc::new(ChatRelay::new(conn, tx, "AB12CD", role)), rx)
    }

    #[tokio::test]
    async fn send_chat_appends_record() {
        let store = MemoryStore::new();
        let conn = Arc::new(store.connect());
        let (relay, _rx) = make_relay(conn.clone(), Role::Host);

        relay.send_chat("good luck").await.unwrap();

        let value = conn.get("sessions/AB12CD/chat").await.unwrap().unwrap();
        let list: Vec<ChatRecord> = keyed_records(value);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].text, "good luck");
        assert_eq!(list[0].sender, Role::Host);
    }

    #[tokio::test]
    async fn process_sorts_by_timestamp() {
        let store = MemoryStore::new();
        let conn = Arc::new(store.connect());
        let (relay, mut rx) = make_relay(conn, Role::Host);

        // Arrival (key) order differs from timestamp order
        relay.process(json!({
            "k1": { "id": "b", "text": "second", "sender": "guest", "timestamp": 20 },
            "k2": { "id": "a", "text": "first", "sender": "host", "timestamp": 10 },
        }));

        let event = rx.recv().await.unwrap();
        let SessionEvent::ChatUpdated { messages } = event else {
            panic!("expected ChatUpdated, got {event:?}");
        };
        assert_eq!(messages[0].text, "first");
        assert_eq!(messages[1].text, "second");
        assert_eq!(relay.messages().len(), 2);
    }

    #[tokio::test]
    async fn messages_empty_before_any_notification() {
        let store = MemoryStore::new();
        let conn = Arc::new(store.connect());
        let (relay, _rx) = make_relay(conn, Role::Guest);

        assert!(relay.messages().is_empty());
    }

    #[tokio::test]
    async fn equal_timestamps_break_ties_by_id() {
        let store = MemoryStore::new();
        let conn = Arc::new(store.connect());
        let (relay, _rx) = make_relay(conn, Role::Host);

        relay.process(json!({
            "k1": { "id": "z", "text": "tie-z", "sender": "host", "timestamp": 5 },
            "k2": { "id": "a", "text": "tie-a", "sender": "guest", "timestamp": 5 },
        }));

        let messages = relay.messages();
        assert_eq!(messages[0].id, "a");
        assert_eq!(messages[1].id, "z");
    }
}
