//! Atomically swappable shared handle.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

/// A single mutable cell shared by every clone of the handle.
///
/// Readers get an `Arc` snapshot and never hold the lock beyond the clone of
/// that `Arc`. Whoever calls [`SharedCell::swap`] changes what every holder
/// sees on its next [`SharedCell::load`]; snapshots already loaded stay valid.
pub struct SharedCell<T> {
    inner: Arc<RwLock<Arc<T>>>,
}

impl<T> SharedCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(value))),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.inner.read().clone()
    }

    /// Replace the value for all holders, returning the previous snapshot.
    pub fn swap(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        std::mem::replace(&mut *self.inner.write(), next)
    }

    /// Derive the next value from the current one under the write lock.
    pub fn update<F>(&self, f: F) -> Arc<T>
    where
        F: FnOnce(&T) -> T,
    {
        let mut guard = self.inner.write();
        let next = Arc::new(f(&guard));
        *guard = next.clone();
        next
    }

    /// Whether both handles refer to the same cell.
    pub fn same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for SharedCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Default> Default for SharedCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedCell").field(&self.load()).finish()
    }
}
