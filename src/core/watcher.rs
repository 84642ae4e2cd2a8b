//! Composition of session, lock, state store and diff engine.
//!
//! A watcher moves through `Created -> Locking -> Polling -> Stopped`. Only
//! the instance holding the lock polls. Every tick persists the new snapshot
//! before its transitions are handed out, so a crash after persisting but
//! before the caller forwards a batch loses that batch: the restarted
//! watcher diffs against the already updated snapshot.

use crate::core::coordinator::Coordinator;
use crate::core::diff::DiffEngine;
use crate::core::ent::{Batch, CheckSet};
use crate::core::error::WatchError;
use crate::core::lock::{DistributedLock, LockConfig};
use crate::core::session::SessionKeeper;
use crate::core::signal::{StopHandle, StopSignal};
use crate::core::store::StateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Session name shown by the coordination service.
    pub name: String,
    pub lock_key: String,
    pub state_key: String,
    pub session_ttl: Duration,
    /// Delay between polls of the health registry.
    pub interval: Duration,
    pub lock: LockConfig,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        WatcherConfig {
            name: "health-watcher".to_string(),
            lock_key: "health-watcher/lock".to_string(),
            state_key: "health-watcher/state".to_string(),
            session_ttl: Duration::from_secs(15),
            interval: Duration::from_secs(10),
            lock: LockConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Locking,
    Polling,
    Stopped,
}

pub struct Watcher {
    coordinator: Arc<dyn Coordinator>,
    config: WatcherConfig,
    state: WatcherState,
    session: Option<SessionKeeper>,
    lock: DistributedLock,
    store: StateStore,
    engine: DiffEngine,
    /// Last persisted snapshot, loaded on the first poll.
    snapshot: Option<CheckSet>,
    next_tick: Instant,
    stopper: StopHandle,
    signal: StopSignal,
}

impl Watcher {
    pub fn new(coordinator: Arc<dyn Coordinator>, config: WatcherConfig) -> Watcher {
        let lock = DistributedLock::new(coordinator.clone(), &config.lock_key, config.lock.clone());
        let store = StateStore::new(coordinator.clone(), &config.state_key);
        let stopper = StopHandle::new();
        let signal = stopper.subscribe();
        Watcher {
            coordinator,
            config,
            state: WatcherState::Created,
            session: None,
            lock,
            store,
            engine: DiffEngine::new(),
            snapshot: None,
            next_tick: Instant::now(),
            stopper,
            signal,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Handle for requesting a stop from another task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stopper.clone()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.id())
    }

    /// Waits for the next non-empty batch of transitions.
    ///
    /// Returns `Ok(None)` once stopped. Any fatal error stops the watcher,
    /// releasing the lock and destroying the session, and is returned here.
    pub async fn next(&mut self) -> Result<Option<Batch>, WatchError> {
        match self.advance().await {
            Ok(Some(batch)) => Ok(Some(batch)),
            Ok(None) | Err(WatchError::Interrupted) => {
                self.stop().await?;
                Ok(None)
            }
            Err(e) => {
                tracing::error!(error = %e, "watcher failed");
                if let Err(teardown) = self.stop().await {
                    tracing::warn!(error = %teardown, "teardown after failure was incomplete");
                }
                Err(e)
            }
        }
    }

    /// Releases the lock if held and destroys the session if created.
    /// Calling it again is a no-op.
    pub async fn stop(&mut self) -> Result<(), WatchError> {
        if self.state == WatcherState::Stopped {
            return Ok(());
        }
        self.stopper.stop();
        self.state = WatcherState::Stopped;

        let mut result = Ok(());
        if let Some(session) = self.session.as_mut() {
            if self.lock.is_held() {
                if let Err(e) = self.lock.release(session).await {
                    tracing::warn!(error = %e, "lock release failed");
                    result = Err(e);
                }
            }
            if let Err(e) = session.destroy().await {
                tracing::warn!(error = %e, "session destroy failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        tracing::info!("watcher stopped");
        result
    }

    async fn advance(&mut self) -> Result<Option<Batch>, WatchError> {
        if self.state == WatcherState::Stopped || self.signal.is_stopped() {
            return Ok(None);
        }

        if self.state == WatcherState::Created {
            let session = SessionKeeper::create(
                self.coordinator.clone(),
                &self.config.name,
                self.config.session_ttl,
            )
            .await?;
            self.session = Some(session);
            self.state = WatcherState::Locking;
        }

        if let (WatcherState::Locking, Some(session)) = (self.state, self.session.as_ref()) {
            self.lock.acquire(session, &mut self.signal).await?;
            self.state = WatcherState::Polling;
            self.next_tick = Instant::now();
        }

        self.poll().await
    }

    async fn poll(&mut self) -> Result<Option<Batch>, WatchError> {
        let session = match self.session.as_ref() {
            Some(session) => session,
            None => return Ok(None),
        };

        let mut snapshot = match self.snapshot.take() {
            Some(snapshot) => snapshot,
            None => {
                let loaded = self.store.load().await?;
                tracing::info!(key = %self.store.key(), failing = loaded.len(), "initial state loaded");
                loaded
            }
        };

        // A session lost while the previous batch was persisted surfaces here.
        if let Err(e) = session.ensure_alive() {
            self.snapshot = Some(snapshot);
            return Err(e);
        }

        loop {
            tokio::select! {
                _ = self.signal.wait() => {
                    self.snapshot = Some(snapshot);
                    return Ok(None);
                }
                _ = tokio::time::sleep_until(self.next_tick) => {}
            }
            self.next_tick = Instant::now() + self.config.interval;

            session.ensure_alive()?;
            let live = self.coordinator.failing_checks().await?;
            let tick = self.engine.tick(&live, snapshot);
            self.store.dump(&tick.snapshot).await?;

            // Once persisted, the batch is handed out even if the session
            // lapsed meanwhile; the next call reports the expiry.
            snapshot = tick.snapshot.clone();
            if !tick.is_empty() {
                tracing::debug!(
                    passing = tick.passing.len(),
                    critical = tick.critical.len(),
                    "transitions found"
                );
                self.snapshot = Some(snapshot);
                return Ok(Some(tick.into_batch()));
            }
            session.ensure_alive()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ent::{CheckStatus, HealthCheck, Transition};
    use crate::core::memory::MemoryCoordinator;

    fn set(ids: &[&str]) -> CheckSet {
        ids.iter()
            .map(|id| HealthCheck::new("node-1", id, CheckStatus::Critical))
            .collect()
    }

    fn config() -> WatcherConfig {
        WatcherConfig {
            session_ttl: Duration::from_secs(10),
            interval: Duration::from_millis(10),
            lock: LockConfig {
                retry_ms: 10,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn first_batch_after_lock() {
        let coord = Arc::new(MemoryCoordinator::new());
        coord.set_failing(set(&["svc1"]));
        let mut watcher = Watcher::new(coord.clone(), config());
        assert_eq!(watcher.state(), WatcherState::Created);

        let batch = watcher.next().await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert!(matches!(&batch[0], Transition::BecameCritical(c) if c.service_id == "svc1"));
        assert_eq!(watcher.state(), WatcherState::Polling);
        assert_eq!(coord.holder("health-watcher/lock").as_deref(), watcher.session_id());
    }

    #[tokio::test]
    async fn stop_releases_everything() {
        let coord = Arc::new(MemoryCoordinator::new());
        coord.set_failing(set(&["svc1"]));
        let mut watcher = Watcher::new(coord.clone(), config());
        watcher.next().await.unwrap().unwrap();

        watcher.stop().await.unwrap();
        assert_eq!(watcher.state(), WatcherState::Stopped);
        assert_eq!(coord.holder("health-watcher/lock"), None);
        assert_eq!(coord.session_count(), 0);

        watcher.stop().await.unwrap();
        assert!(watcher.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_handle_interrupts_quiet_polling() {
        let coord = Arc::new(MemoryCoordinator::new());
        let mut watcher = Watcher::new(
            coord.clone(),
            WatcherConfig {
                interval: Duration::from_secs(3600),
                ..config()
            },
        );
        let handle = watcher.stop_handle();
        let task = tokio::spawn(async move {
            let batch = watcher.next().await;
            batch.map(|b| (b, watcher.state()))
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.stop();
        let (batch, state) = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(batch.is_none());
        assert_eq!(state, WatcherState::Stopped);
        assert_eq!(coord.session_count(), 0);
    }

    #[tokio::test]
    async fn session_create_failure_is_fatal() {
        let coord = Arc::new(MemoryCoordinator::new());
        coord.set_unavailable(true);
        let mut watcher = Watcher::new(coord, config());
        let err = watcher.next().await.unwrap_err();
        assert!(matches!(err, WatchError::CoordinationUnavailable(_)));
        assert_eq!(watcher.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn persist_failure_is_fatal() {
        let coord = Arc::new(MemoryCoordinator::new());
        coord.set_failing(set(&["svc1"]));
        let mut watcher = Watcher::new(coord.clone(), config());
        watcher.next().await.unwrap().unwrap();

        coord.fail_puts(true);
        coord.set_failing(set(&[]));
        let err = watcher.next().await.unwrap_err();
        assert!(matches!(err, WatchError::CoordinationUnavailable(_)));
        assert_eq!(watcher.state(), WatcherState::Stopped);
        assert_eq!(coord.session_count(), 0);
    }
}
