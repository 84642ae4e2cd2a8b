//! Session-guarded mutual exclusion.
//!
//! The lock key is tied to the holder's session, so the coordination service
//! drops it when that session is destroyed or lapses. Acquisition polls with
//! a fixed back-off and stays responsive to stop requests between attempts.

use crate::core::coordinator::Coordinator;
use crate::core::error::WatchError;
use crate::core::session::SessionKeeper;
use crate::core::signal::StopSignal;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`DistributedLock`].
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Wait between acquisition attempts in milliseconds.
    pub retry_ms: u64,
    /// Sentinel payload written to the lock key.
    pub value: Vec<u8>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_ms: 1_000,
            value: b"ok".to_vec(),
        }
    }
}

pub struct DistributedLock {
    coordinator: Arc<dyn Coordinator>,
    key: String,
    config: LockConfig,
    /// Session the lock is held under.
    held_by: Option<String>,
}

impl DistributedLock {
    pub fn new(coordinator: Arc<dyn Coordinator>, key: impl Into<String>, config: LockConfig) -> Self {
        Self {
            coordinator,
            key: key.into(),
            config,
            held_by: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_held(&self) -> bool {
        self.held_by.is_some()
    }

    /// One acquisition attempt. Returns whether the lock is now held.
    pub async fn try_acquire(&mut self, session: &SessionKeeper) -> Result<bool, WatchError> {
        if self.held_by.is_some() {
            return Err(WatchError::AlreadyLocked {
                key: self.key.clone(),
            });
        }
        session.ensure_alive()?;
        let acquired = self
            .coordinator
            .acquire(&self.key, &self.config.value, session.id())
            .await?;
        if acquired {
            self.held_by = Some(session.id().to_string());
            tracing::info!(key = %self.key, session = %session.id(), "lock acquired");
        }
        Ok(acquired)
    }

    /// Blocks until the lock is held.
    ///
    /// Contention and transient coordination failures are retried every
    /// `retry_ms`. Fails with `Interrupted` if `stop` fires first.
    pub async fn acquire(
        &mut self,
        session: &SessionKeeper,
        stop: &mut StopSignal,
    ) -> Result<(), WatchError> {
        let retry = Duration::from_millis(self.config.retry_ms);
        tracing::info!(key = %self.key, session = %session.id(), "waiting for lock");

        loop {
            if stop.is_stopped() {
                return Err(WatchError::Interrupted);
            }
            match self.try_acquire(session).await {
                Ok(true) => return Ok(()),
                Ok(false) => {
                    tracing::debug!(key = %self.key, retry_ms = self.config.retry_ms, "lock held elsewhere, backing off");
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(key = %self.key, error = %e, "lock attempt failed, retrying");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = stop.wait() => return Err(WatchError::Interrupted),
                _ = tokio::time::sleep(retry) => {}
            }
        }
    }

    /// Releases a lock previously taken with `session`.
    pub async fn release(&mut self, session: &SessionKeeper) -> Result<(), WatchError> {
        match self.held_by.as_deref() {
            Some(holder) if holder == session.id() => {}
            _ => {
                return Err(WatchError::NotLocked {
                    key: self.key.clone(),
                })
            }
        }
        self.held_by = None;

        if self.coordinator.release(&self.key, session.id()).await? {
            tracing::info!(key = %self.key, session = %session.id(), "lock released");
        } else {
            tracing::warn!(key = %self.key, session = %session.id(), "lock was no longer held by session");
        }
        Ok(())
    }
}
