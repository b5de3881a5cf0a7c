//! In-process SessionStore implementation
//!
//! MemoryStore holds one shared JSON tree; each peer talks to it
//! through its own [`MemoryConnection`] handle, so tests can drive two
//! SessionManagers against one store and sever a single peer's
//! connection to simulate abrupt loss.
//!
//! Mutation and watcher notification happen under the same lock, which
//! gives every subscriber notifications in mutation order — the
//! ordering contract the synchronizer depends on.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::debug;

use super::adapter::SessionStore;
use crate::error::StoreError;

struct Watcher {
    segments: Vec<String>,
    tx: mpsc::UnboundedSender<Value>,
}

struct Hub {
    root: RwLock<Value>,
    watchers: Mutex<Vec<Watcher>>,
    next_key: AtomicU64,
}

impl Hub {
    async fn write(&self, path: &str, value: Value) {
        let segments = split_path(path);
        let mut root = self.root.write().await;
        set_at(&mut root, &segments, value);

        // Notify while still holding the root lock so no two writes
        // can race their notifications out of order. Watchers whose
        // receiver is gone are dropped here.
        let mut watchers = self.watchers.lock().await;
        watchers.retain(|w| {
            if paths_overlap(&w.segments, &segments) {
                w.tx.send(value_at(&root, &w.segments)).is_ok()
            } else {
                !w.tx.is_closed()
            }
        });
    }

    async fn read(&self, path: &str) -> Value {
        let segments = split_path(path);
        value_at(&*self.root.read().await, &segments)
    }

    async fn watch(&self, path: &str) -> mpsc::UnboundedReceiver<Value> {
        let segments = split_path(path);
        let (tx, rx) = mpsc::unbounded_channel();

        // Root lock first (same order as write) so the initial value
        // and the registration are atomic with respect to writers.
        let root = self.root.read().await;
        let _ = tx.send(value_at(&root, &segments));
        self.watchers.lock().await.push(Watcher { segments, tx });
        rx
    }
}

/// Shared in-memory document store
pub struct MemoryStore {
    hub: Arc<Hub>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Hub {
                root: RwLock::new(Value::Null),
                watchers: Mutex::new(Vec::new()),
                next_key: AtomicU64::new(0),
            }),
        }
    }

    /// Open a connection handle for one peer
    pub fn connect(&self) -> MemoryConnection {
        MemoryConnection {
            hub: Arc::clone(&self.hub),
            hooks: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One peer's connection to a [`MemoryStore`]
pub struct MemoryConnection {
    hub: Arc<Hub>,
    hooks: Mutex<Vec<(String, Value)>>,
    offline: AtomicBool,
}

impl MemoryConnection {
    /// Toggle transient unavailability; while offline every operation
    /// fails synchronously
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Simulate abrupt connection loss: the connection goes offline
    /// and the store executes all registered disconnect writes
    pub async fn sever(&self) {
        self.offline.store(true, Ordering::SeqCst);
        let hooks: Vec<_> = self.hooks.lock().await.drain(..).collect();
        for (path, value) in hooks {
            debug!(path = %path, "executing disconnect hook");
            self.hub.write(&path, value).await;
        }
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SessionStore for MemoryConnection {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_online()?;
        let value = self.hub.read(path).await;
        Ok(if value.is_null() { None } else { Some(value) })
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.hub.write(path, value).await;
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        self.ensure_online()?;
        // Zero-padded counter keys sort in append order
        let key = format!("k{:010}", self.hub.next_key.fetch_add(1, Ordering::SeqCst));
        self.hub.write(&format!("{path}/{key}"), value).await;
        Ok(key)
    }

    async fn subscribe(&self, path: &str) -> Result<mpsc::UnboundedReceiver<Value>, StoreError> {
        self.ensure_online()?;
        Ok(self.hub.watch(path).await)
    }

    async fn register_on_disconnect(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_online()?;
        self.hooks.lock().await.push((path.to_string(), value));
        Ok(())
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// True if one path is a (non-strict) prefix of the other; a write to
/// either notifies a watcher of the other
fn paths_overlap(a: &[String], b: &[String]) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| x == y)
}

fn value_at(root: &Value, segments: &[String]) -> Value {
    let mut node = root;
    for segment in segments {
        match node.get(segment) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

fn set_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for segment in parents {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        node = node
            .as_object_mut()
            .unwrap()
            .entry(segment.clone())
            .or_insert(Value::Null);
    }
    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }
    node.as_object_mut().unwrap().insert(last.clone(), value);
}
