//! In-process coordination service.
//!
//! Honours session TTLs with delete-on-expire behaviour and conditional
//! acquire/release, and lets callers inject failures.

use crate::core::coordinator::{Coordinator, KvEntry};
use crate::core::ent::CheckSet;
use crate::core::error::WatchError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    modify_index: u64,
    session: Option<String>,
}

#[derive(Debug)]
struct Session {
    ttl: Duration,
    deadline: Instant,
}

#[derive(Debug, Default)]
struct Inner {
    kv: HashMap<String, Entry>,
    sessions: HashMap<String, Session>,
    failing: CheckSet,
    index: u64,
    renewals: usize,
    unavailable: bool,
    fail_renewals: bool,
    fail_puts: bool,
}

impl Inner {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }

    /// Drops lapsed sessions along with the keys they guard.
    fn expire_sessions(&mut self) {
        let now = Instant::now();
        let lapsed: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in lapsed {
            tracing::debug!(session = %id, "memory session lapsed");
            self.invalidate(&id);
        }
    }

    fn invalidate(&mut self, session: &str) {
        self.sessions.remove(session);
        self.kv
            .retain(|_, e| e.session.as_deref() != Some(session));
    }

    fn available(&mut self) -> Result<(), WatchError> {
        if self.unavailable {
            return Err(WatchError::CoordinationUnavailable(
                "memory coordinator offline".to_string(),
            ));
        }
        self.expire_sessions();
        Ok(())
    }

    fn live_session(&self, session: &str) -> Result<(), WatchError> {
        if self.sessions.contains_key(session) {
            Ok(())
        } else {
            Err(WatchError::SessionExpired {
                session: session.to_string(),
                reason: "invalid session".to_string(),
            })
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCoordinator {
    inner: Mutex<Inner>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replaces the set reported by `failing_checks`.
    pub fn set_failing(&self, checks: CheckSet) {
        self.inner().failing = checks;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner().unavailable = unavailable;
    }

    /// Makes renewals fail and invalidates the renewed session, as the
    /// service does once a TTL has lapsed.
    pub fn fail_renewals(&self, fail: bool) {
        self.inner().fail_renewals = fail;
    }

    pub fn fail_puts(&self, fail: bool) {
        self.inner().fail_puts = fail;
    }

    /// Writes bytes directly, bypassing failure injection.
    pub fn put_raw(&self, key: &str, value: &[u8]) {
        let mut inner = self.inner();
        let modify_index = inner.next_index();
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                modify_index,
                session: None,
            },
        );
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner().kv.get(key).map(|e| e.value.clone())
    }

    /// Session currently holding `key`, if any.
    pub fn holder(&self, key: &str) -> Option<String> {
        let mut inner = self.inner();
        inner.expire_sessions();
        inner.kv.get(key).and_then(|e| e.session.clone())
    }

    pub fn has_session(&self, session: &str) -> bool {
        let mut inner = self.inner();
        inner.expire_sessions();
        inner.sessions.contains_key(session)
    }

    pub fn session_count(&self) -> usize {
        let mut inner = self.inner();
        inner.expire_sessions();
        inner.sessions.len()
    }

    /// Number of renewal attempts seen so far.
    pub fn renewals(&self) -> usize {
        self.inner().renewals
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn create_session(&self, name: &str, ttl: Duration) -> Result<String, WatchError> {
        let mut inner = self.inner();
        inner.available()?;
        let id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(session = %id, name, "memory session created");
        inner.sessions.insert(
            id.clone(),
            Session {
                ttl,
                deadline: Instant::now() + ttl,
            },
        );
        Ok(id)
    }

    async fn renew_session(&self, session: &str) -> Result<(), WatchError> {
        let mut inner = self.inner();
        inner.renewals += 1;
        inner.available()?;
        if inner.fail_renewals {
            inner.invalidate(session);
        }
        inner.live_session(session)?;
        if let Some(s) = inner.sessions.get_mut(session) {
            s.deadline = Instant::now() + s.ttl;
        }
        Ok(())
    }

    async fn destroy_session(&self, session: &str) -> Result<(), WatchError> {
        let mut inner = self.inner();
        inner.available()?;
        inner.invalidate(session);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<KvEntry>, WatchError> {
        let mut inner = self.inner();
        inner.available()?;
        Ok(inner.kv.get(key).map(|e| KvEntry {
            value: e.value.clone(),
            modify_index: e.modify_index,
        }))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), WatchError> {
        let mut inner = self.inner();
        inner.available()?;
        if inner.fail_puts {
            return Err(WatchError::CoordinationUnavailable(format!(
                "kv put for '{}' was not applied",
                key
            )));
        }
        let modify_index = inner.next_index();
        let session = inner.kv.get(key).and_then(|e| e.session.clone());
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                modify_index,
                session,
            },
        );
        Ok(())
    }

    async fn acquire(&self, key: &str, value: &[u8], session: &str) -> Result<bool, WatchError> {
        let mut inner = self.inner();
        inner.available()?;
        inner.live_session(session)?;
        match inner.kv.get(key).and_then(|e| e.session.as_deref()) {
            Some(holder) if holder != session => return Ok(false),
            _ => {}
        }
        let modify_index = inner.next_index();
        inner.kv.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                modify_index,
                session: Some(session.to_string()),
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, session: &str) -> Result<bool, WatchError> {
        let mut inner = self.inner();
        inner.available()?;
        inner.live_session(session)?;
        let held = inner
            .kv
            .get(key)
            .map_or(false, |e| e.session.as_deref() == Some(session));
        if !held {
            return Ok(false);
        }
        let modify_index = inner.next_index();
        if let Some(e) = inner.kv.get_mut(key) {
            e.session = None;
            e.modify_index = modify_index;
        }
        Ok(true)
    }

    async fn failing_checks(&self) -> Result<CheckSet, WatchError> {
        let mut inner = self.inner();
        inner.available()?;
        Ok(inner.failing.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lapsed_session_drops_guarded_keys() {
        let coord = MemoryCoordinator::new();
        let s = coord
            .create_session("t", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(coord.acquire("lock", b"ok", &s).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(coord.get("lock").await.unwrap().is_none());
        assert!(!coord.has_session(&s));
    }

    #[tokio::test]
    async fn acquire_is_exclusive_per_session() {
        let coord = MemoryCoordinator::new();
        let a = coord.create_session("a", Duration::from_secs(10)).await.unwrap();
        let b = coord.create_session("b", Duration::from_secs(10)).await.unwrap();
        assert!(coord.acquire("lock", b"ok", &a).await.unwrap());
        assert!(!coord.acquire("lock", b"ok", &b).await.unwrap());
        assert!(!coord.release("lock", &b).await.unwrap());
        assert!(coord.release("lock", &a).await.unwrap());
        assert!(coord.acquire("lock", b"ok", &b).await.unwrap());
    }

    #[tokio::test]
    async fn failed_renewal_invalidates_session() {
        let coord = MemoryCoordinator::new();
        let s = coord.create_session("t", Duration::from_secs(10)).await.unwrap();
        coord.fail_renewals(true);
        let err = coord.renew_session(&s).await.unwrap_err();
        assert!(matches!(err, WatchError::SessionExpired { .. }));
        let err = coord.acquire("lock", b"ok", &s).await.unwrap_err();
        assert!(matches!(err, WatchError::SessionExpired { .. }));
    }
}
