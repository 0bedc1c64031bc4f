//! The coarse population lock.
//!
//! All first-time mutations of the graph (lazy population and first-time instantiation)
//! run under one lock shared by every module of a [`crate::metadata::context::TypeContext`].
//! Population callbacks routinely touch other nodes that need population themselves, so the
//! lock is re-entrant for the thread that holds it: nested acquisitions on the owning thread
//! succeed immediately, every other thread blocks until the outermost guard is dropped.
//!
//! Releasing the lock establishes the happens-before edge that makes every value published
//! under it visible to later readers.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

/// Guard returned by [`PopulationLock::acquire`]
///
/// The lock is released once the outermost guard of the owning thread is dropped.
pub type PopulationGuard<'a> = ReentrantMutexGuard<'a, ()>;

/// Re-entrant coarse lock guarding graph mutation
#[derive(Debug, Default)]
pub struct PopulationLock {
    mutex: ReentrantMutex<()>,
}

impl PopulationLock {
    /// Create a new, unheld lock
    #[must_use]
    pub fn new() -> Self {
        PopulationLock {
            mutex: ReentrantMutex::new(()),
        }
    }

    /// Returns `true` if the current thread holds this lock
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.mutex.is_owned_by_current_thread()
    }

    /// Acquire the lock, blocking unless the current thread already holds it
    pub fn acquire(&self) -> PopulationGuard<'_> {
        self.mutex.lock()
    }
}
