// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;

use parking_lot::lock_api::RawMutex as _;

/// A failure reported by a [`RawLock`] primitive. Carries no detail; the
/// [`LockGuard`][crate::LockGuard] maps it to the matching [`Error`][crate::Error].
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("lock primitive failure")]
pub struct PrimitiveFailure;

/// A mutual-exclusion primitive that a [`LockGuard`][crate::LockGuard] wraps.
///
/// Every step may fail. The guard remembers a failed `init()` and never calls `lock()`
/// afterwards.
///
/// # Safety
///
/// Implementations must provide mutual exclusion: once `lock()` has returned `Ok` on one
/// thread, no other `lock()` call on the same instance may return `Ok` until that thread has
/// called `unlock()`. After `unlock()` returns, successfully or not, the calling thread must no
/// longer hold the lock.
///
/// `teardown()` may be called while other threads are still blocked in `lock()`; the
/// primitive must remain sound to use until it is dropped.
pub unsafe trait RawLock: Debug + Send + Sync {
    /// Prepares the primitive for use. Called once, before any other method.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveFailure`] if the primitive cannot be used.
    fn init(&self) -> Result<(), PrimitiveFailure>;

    /// Blocks until the lock is held by the calling thread.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveFailure`] if the lock was not acquired.
    fn lock(&self) -> Result<(), PrimitiveFailure>;

    /// Releases the lock.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveFailure`] if the primitive reported a failure while releasing.
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock, acquired through a successful `lock()` call.
    unsafe fn unlock(&self) -> Result<(), PrimitiveFailure>;

    /// Releases any resources held by the primitive.
    ///
    /// # Errors
    ///
    /// Returns [`PrimitiveFailure`] if the resources could not be released cleanly.
    fn teardown(&self) -> Result<(), PrimitiveFailure>;
}

// SAFETY: Forwards to the shared primitive, which upholds the contract itself.
unsafe impl<L: RawLock> RawLock for Arc<L> {
    fn init(&self) -> Result<(), PrimitiveFailure> {
        (**self).init()
    }

    fn lock(&self) -> Result<(), PrimitiveFailure> {
        (**self).lock()
    }

    unsafe fn unlock(&self) -> Result<(), PrimitiveFailure> {
        // SAFETY: Forwarding the caller's guarantee that the lock is held.
        unsafe { (**self).unlock() }
    }

    fn teardown(&self) -> Result<(), PrimitiveFailure> {
        (**self).teardown()
    }
}

/// The default lock primitive: a `parking_lot` raw mutex.
///
/// It cannot fail. Blocking waiters park in the operating system instead of spinning.
pub struct ParkingLotLock {
    raw: parking_lot::RawMutex,
}

impl ParkingLotLock {
    /// Creates an unlocked primitive.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: parking_lot::RawMutex::INIT,
        }
    }
}

impl Default for ParkingLotLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for ParkingLotLock {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParkingLotLock")
            .field("locked", &self.raw.is_locked())
            .finish()
    }
}

// SAFETY: `parking_lot::RawMutex` provides mutual exclusion and never fails.
unsafe impl RawLock for ParkingLotLock {
    fn init(&self) -> Result<(), PrimitiveFailure> {
        Ok(())
    }

    fn lock(&self) -> Result<(), PrimitiveFailure> {
        self.raw.lock();
        Ok(())
    }

    unsafe fn unlock(&self) -> Result<(), PrimitiveFailure> {
        // SAFETY: The caller guarantees that the lock is held by this thread.
        unsafe { self.raw.unlock() };
        Ok(())
    }

    fn teardown(&self) -> Result<(), PrimitiveFailure> {
        // Nothing to release, the mutex is plain memory.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(ParkingLotLock: Send, Sync);
    }

    #[test]
    fn lock_unlock_cycle() {
        let lock = ParkingLotLock::new();
        lock.init().unwrap();

        for _ in 0..3 {
            lock.lock().unwrap();
            assert!(lock.raw.is_locked());

            // SAFETY: Locked right above.
            unsafe { lock.unlock() }.unwrap();
            assert!(!lock.raw.is_locked());
        }

        lock.teardown().unwrap();
    }

    #[test]
    fn arc_forwards() {
        let lock = Arc::new(ParkingLotLock::new());
        let shared = Arc::clone(&lock);

        shared.lock().unwrap();
        assert!(lock.raw.is_locked());

        // SAFETY: Locked right above.
        unsafe { shared.unlock() }.unwrap();
        assert!(!lock.raw.is_locked());
    }
}
