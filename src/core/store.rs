use crate::core::coordinator::Coordinator;
use crate::core::ent::CheckSet;
use crate::core::error::WatchError;
use serde::Serialize;
use std::sync::Arc;

/// Persists the set of currently failing checks under one key.
pub struct StateStore {
    coordinator: Arc<dyn Coordinator>,
    key: String,
}

impl StateStore {
    pub fn new(coordinator: Arc<dyn Coordinator>, key: impl Into<String>) -> StateStore {
        StateStore {
            coordinator,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the last snapshot. A missing key is a first run and yields an
    /// empty set; undecodable contents are never discarded.
    pub async fn load(&self) -> Result<CheckSet, WatchError> {
        let entry = match self.coordinator.get(&self.key).await? {
            Some(entry) => entry,
            None => {
                tracing::info!(key = %self.key, "no stored state, starting empty");
                return Ok(CheckSet::new());
            }
        };
        serde_json::from_slice(&entry.value).map_err(|e| WatchError::CorruptState {
            key: self.key.clone(),
            reason: e.to_string(),
        })
    }

    /// Overwrites the snapshot. On failure the previous snapshot stays intact.
    pub async fn dump(&self, checks: &CheckSet) -> Result<(), WatchError> {
        let body = encode(&self.key, checks)?;
        self.coordinator.put(&self.key, &body).await
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Vec<u8>, WatchError> {
    serde_json::to_vec(value).map_err(|e| WatchError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
