pub mod clock;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod engine;
pub mod entrant;
pub mod error;
pub mod prom_metrics;
pub mod service;
pub mod status;
pub mod store;
pub mod timer;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering from poisoning.
///
/// The guarded queue state is only mutated through methods that validate
/// before they write, so a panic mid-request cannot leave it half-updated.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
