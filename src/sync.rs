//! Locking helpers shared across the crate.

use std::sync::{Mutex, MutexGuard};

/// Lock `mutex`, taking the guard even if a previous holder panicked.
///
/// Everything locked this way (handler lists, join handles, queue slots) is left consistent by
/// every critical section.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
