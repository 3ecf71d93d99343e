//! Named mutual exclusion.

use std::{
    collections::HashSet,
    sync::{Condvar, Mutex, PoisonError},
};

/// A service providing process-wide mutual exclusion by key.
///
/// At most one caller holds a given key at any instant. Acquisition blocks
/// until the key is free. Callers must release every key they acquire
/// exactly once.
pub trait Locker {
    /// Acquires the lock for a key, blocking while another caller holds it.
    fn acquire(&self, key: &str);

    /// Releases a previously acquired key.
    fn release(&self, key: &str);
}

/// A boxed locker that is safe to share between threads.
pub type BoxLocker = Box<dyn Locker + Send + Sync + 'static>;

impl<L> Locker for std::sync::Arc<L>
where
    L: Locker + ?Sized,
{
    fn acquire(&self, key: &str) {
        (**self).acquire(key)
    }

    fn release(&self, key: &str) {
        (**self).release(key)
    }
}

/// A locker backed by a table of currently held keys.
///
/// Entries only exist while a key is held.
#[derive(Debug, Default)]
pub struct TableLocker {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl TableLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether a key is currently held.
    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl Locker for TableLocker {
    fn acquire(&self, key: &str) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(key) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(key.to_owned());
    }

    fn release(&self, key: &str) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.remove(key) {
            tracing::warn!(%key, "released a key that was not held");
            return;
        }
        drop(held);
        self.released.notify_all();
    }
}

/// A held key, released when dropped.
pub(crate) struct KeyGuard<'a> {
    locker: &'a dyn Locker,
    key: String,
}

impl<'a> KeyGuard<'a> {
    pub(crate) fn acquire(locker: &'a dyn Locker, key: String) -> Self {
        locker.acquire(&key);
        Self { locker, key }
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.locker.release(&self.key);
    }
}
