use crate::core::ent::CheckSet;
use crate::core::error::WatchError;
use async_trait::async_trait;
use std::time::Duration;

/// A value read from the coordination store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub modify_index: u64,
}

/// Capabilities the watcher needs from the coordination service.
///
/// Sessions are created with delete-on-expire behaviour: when a session is
/// destroyed or its TTL lapses, every key it guards is removed.
#[async_trait]
pub trait Coordinator: Send + Sync {
    async fn create_session(&self, name: &str, ttl: Duration) -> Result<String, WatchError>;
    async fn renew_session(&self, session: &str) -> Result<(), WatchError>;
    async fn destroy_session(&self, session: &str) -> Result<(), WatchError>;

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, WatchError>;
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), WatchError>;

    /// Writes `value` and ties the key to `session` if no other session
    /// holds it. Returns whether this session now holds the key.
    async fn acquire(&self, key: &str, value: &[u8], session: &str) -> Result<bool, WatchError>;

    /// Unties the key from `session`. Returns false if the session did not hold it.
    async fn release(&self, key: &str, session: &str) -> Result<bool, WatchError>;

    /// Checks currently in the critical state.
    async fn failing_checks(&self) -> Result<CheckSet, WatchError>;
}
