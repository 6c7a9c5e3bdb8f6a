pub mod backup;
pub mod config;
pub mod file_lock;
pub mod lock_registry;
pub mod store;

pub use config::StoreConfig;
pub use file_lock::{AdvisoryLock, lock_path_for};
pub use lock_registry::LockRegistry;
pub use store::{PersistentStore, resolve_filename};
