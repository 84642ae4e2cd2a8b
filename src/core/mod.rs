pub mod alarm;
pub mod consul;
pub mod coordinator;
pub mod diff;
pub mod ent;
pub mod error;
pub mod lock;
pub mod logger;
pub mod memory;
pub mod session;
pub mod signal;
pub mod store;
pub mod watcher;
pub use alarm::{Level, MailAlarm, Notifier, SlackAlarm};
pub use consul::ConsulClient;
pub use coordinator::{Coordinator, KvEntry};
pub use diff::{DiffEngine, Tick};
pub use ent::*;
pub use error::{AlarmError, WatchError};
pub use lock::{DistributedLock, LockConfig};
pub use logger::Logger;
pub use memory::MemoryCoordinator;
pub use session::{SessionKeeper, SessionStatus};
pub use signal::{StopHandle, StopSignal};
pub use store::StateStore;
pub use watcher::{Watcher, WatcherConfig, WatcherState};
