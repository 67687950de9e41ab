use parking_lot::RwLock;
use std::sync::Arc;

/// Shared mutable state guarded by a poison-free read-write lock.
pub type Atomic<T> = Arc<RwLock<T>>;

pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}
