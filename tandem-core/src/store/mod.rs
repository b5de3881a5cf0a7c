//! Session store abstraction and implementations

pub mod adapter;
pub mod memory;

// Re-export key types for convenience
pub use adapter::SessionStore;
pub use memory::{MemoryConnection, MemoryStore};
