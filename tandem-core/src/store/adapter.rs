//! SessionStore trait definition
//!
//! The store abstraction is the seam to the shared document store: a
//! keyed JSON document tree with change subscriptions and
//! compensating disconnect writes. Paths are slash-separated segment
//! strings (`sessions/AB12CD/moves`).
//!
//! The synchronizer's exactly-once, in-order guarantees depend on one
//! external contract: change notifications for a given path must reach
//! each subscriber in the same order the document was mutated.
//! Implementations that can reorder notifications break the protocol.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::StoreError;

/// Adapter over the shared keyed document store
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read the value at a path. `None` if nothing was ever written.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Overwrite the value at a path
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Atomically append under a path with a store-generated key whose
    /// natural ordering is the append order. Returns the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Subscribe to a path. The current value is delivered immediately,
    /// then the value at the path is re-delivered after every mutation
    /// that overlaps it (the path itself, an ancestor, or a descendant).
    /// Dropping the receiver cancels the subscription.
    async fn subscribe(&self, path: &str) -> Result<mpsc::UnboundedReceiver<Value>, StoreError>;

    /// Register a compensating write executed by the store if this
    /// connection terminates abruptly
    async fn register_on_disconnect(&self, path: &str, value: Value) -> Result<(), StoreError>;
}
