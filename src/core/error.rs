use thiserror::Error;

/// Errors surfaced by the watcher and its components.
#[derive(Debug, Error)]
pub enum WatchError {
    /// Transport or service failure talking to the coordination service.
    #[error("coordination service unavailable: {0}")]
    CoordinationUnavailable(String),

    /// The persisted snapshot exists but cannot be decoded.
    #[error("corrupt state in key '{key}': {reason}")]
    CorruptState { key: String, reason: String },

    /// The snapshot could not be encoded for writing.
    #[error("cannot encode state for key '{key}': {reason}")]
    Encode { key: String, reason: String },

    #[error("lock '{key}' is already held by this watcher")]
    AlreadyLocked { key: String },

    #[error("lock '{key}' is not held by this watcher")]
    NotLocked { key: String },

    /// The session guarding the lock is gone.
    #[error("session {session} expired: {reason}")]
    SessionExpired { session: String, reason: String },

    /// A stop request arrived while waiting.
    #[error("interrupted by stop request")]
    Interrupted,
}

impl WatchError {
    /// Errors worth retrying while waiting for the lock.
    pub fn is_transient(&self) -> bool {
        matches!(self, WatchError::CoordinationUnavailable(_))
    }
}

impl From<reqwest::Error> for WatchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return WatchError::CoordinationUnavailable(format!("request timed out: {}", err));
        }
        WatchError::CoordinationUnavailable(err.to_string())
    }
}

/// Errors from notification sinks.
#[derive(Debug, Error)]
pub enum AlarmError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not build mail: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("smtp delivery failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("mail task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
