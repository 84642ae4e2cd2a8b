use crate::core::coordinator::Coordinator;
use crate::core::error::WatchError;
use crate::core::signal::{StopHandle, StopSignal};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Liveness of a session as last seen by its renewal task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Alive,
    /// Renewal failed; the session is left to expire.
    Lost(String),
}

/// Owns one coordination-service session and keeps it renewed.
pub struct SessionKeeper {
    coordinator: Arc<dyn Coordinator>,
    id: String,
    status: Arc<RwLock<SessionStatus>>,
    stop: StopHandle,
    renewer: Option<JoinHandle<()>>,
}

impl SessionKeeper {
    /// Creates a session with `ttl` and starts renewing it every `ttl / 2`.
    pub async fn create(
        coordinator: Arc<dyn Coordinator>,
        name: &str,
        ttl: Duration,
    ) -> Result<SessionKeeper, WatchError> {
        let id = coordinator.create_session(name, ttl).await?;
        tracing::info!(session = %id, ttl_ms = ttl.as_millis() as u64, "session created");

        let status = Arc::new(RwLock::new(SessionStatus::Alive));
        let stop = StopHandle::new();
        let renewer = tokio::spawn(renew_loop(
            coordinator.clone(),
            id.clone(),
            ttl / 2,
            status.clone(),
            stop.subscribe(),
        ));

        Ok(SessionKeeper {
            coordinator,
            id,
            status,
            stop,
            renewer: Some(renewer),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Fails with `SessionExpired` once the renewal task has given up.
    pub fn ensure_alive(&self) -> Result<(), WatchError> {
        match self.status() {
            SessionStatus::Alive => Ok(()),
            SessionStatus::Lost(reason) => Err(WatchError::SessionExpired {
                session: self.id.clone(),
                reason,
            }),
        }
    }

    /// Stops renewal and destroys the session, which also drops any keys it guards.
    pub async fn destroy(&mut self) -> Result<(), WatchError> {
        self.stop.stop();
        if let Some(renewer) = self.renewer.take() {
            let _ = renewer.await;
        } else {
            return Ok(());
        }
        self.coordinator.destroy_session(&self.id).await?;
        tracing::info!(session = %self.id, "session destroyed");
        Ok(())
    }
}

impl Drop for SessionKeeper {
    fn drop(&mut self) {
        self.stop.stop();
    }
}

/// Renews `session` every `interval` until `stop` fires or a renewal fails.
///
/// A failure is recorded in `status` and ends the loop; no further attempt is made.
pub async fn renew_loop(
    coordinator: Arc<dyn Coordinator>,
    session: String,
    interval: Duration,
    status: Arc<RwLock<SessionStatus>>,
    mut stop: StopSignal,
) {
    loop {
        tokio::select! {
            _ = stop.wait() => break,
            _ = tokio::time::sleep(interval) => {
                if let Err(e) = coordinator.renew_session(&session).await {
                    tracing::warn!(session = %session, error = %e, "session renewal failed");
                    *status.write().unwrap_or_else(|p| p.into_inner()) =
                        SessionStatus::Lost(e.to_string());
                    break;
                }
                tracing::trace!(session = %session, "session renewed");
            }
        }
    }
}
