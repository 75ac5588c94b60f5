// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::lock_api::RawMutex as _;

use crate::{PrimitiveFailure, RawAllocator, RawLock, SystemAllocator};

/// A lock primitive for tests, whose every step can be told to fail and which counts how
/// often each step was invoked.
///
/// Mutual exclusion is real: the fake wraps a `parking_lot` mutex. An injected unlock failure
/// still releases the mutex before reporting the failure, so a test cannot deadlock itself.
///
/// Share it with the code under test through an `Arc`, which also implements [`RawLock`].
pub struct FakeLock {
    raw: parking_lot::RawMutex,

    fail_init: AtomicBool,
    fail_lock: AtomicBool,
    fail_unlock: AtomicBool,
    fail_teardown: AtomicBool,

    init_calls: AtomicUsize,
    lock_calls: AtomicUsize,
    unlock_calls: AtomicUsize,
    teardown_calls: AtomicUsize,
}

impl FakeLock {
    /// Creates a fake that succeeds at everything.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: parking_lot::RawMutex::INIT,
            fail_init: AtomicBool::new(false),
            fail_lock: AtomicBool::new(false),
            fail_unlock: AtomicBool::new(false),
            fail_teardown: AtomicBool::new(false),
            init_calls: AtomicUsize::new(0),
            lock_calls: AtomicUsize::new(0),
            unlock_calls: AtomicUsize::new(0),
            teardown_calls: AtomicUsize::new(0),
        }
    }

    /// Makes `init()` fail from now on, or stop failing.
    pub fn fail_init(&self, fail: bool) {
        self.fail_init.store(fail, Ordering::Relaxed);
    }

    /// Makes `lock()` fail from now on, or stop failing.
    pub fn fail_lock(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::Relaxed);
    }

    /// Makes `unlock()` report failure from now on, or stop failing.
    pub fn fail_unlock(&self, fail: bool) {
        self.fail_unlock.store(fail, Ordering::Relaxed);
    }

    /// Makes `teardown()` fail from now on, or stop failing.
    pub fn fail_teardown(&self, fail: bool) {
        self.fail_teardown.store(fail, Ordering::Relaxed);
    }

    /// Number of `init()` calls so far.
    #[must_use]
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::Relaxed)
    }

    /// Number of `lock()` calls so far, failed ones included.
    #[must_use]
    pub fn lock_calls(&self) -> usize {
        self.lock_calls.load(Ordering::Relaxed)
    }

    /// Number of `unlock()` calls so far, failed ones included.
    #[must_use]
    pub fn unlock_calls(&self) -> usize {
        self.unlock_calls.load(Ordering::Relaxed)
    }

    /// Number of `teardown()` calls so far, failed ones included.
    #[must_use]
    pub fn teardown_calls(&self) -> usize {
        self.teardown_calls.load(Ordering::Relaxed)
    }

    /// Whether the wrapped mutex is currently held.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.raw.is_locked()
    }
}

impl Default for FakeLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for FakeLock {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeLock")
            .field("locked", &self.is_locked())
            .field("lock_calls", &self.lock_calls())
            .field("unlock_calls", &self.unlock_calls())
            .finish_non_exhaustive()
    }
}

// SAFETY: Exclusion comes from the wrapped `parking_lot` mutex, which is held exactly when
// `lock()` returned `Ok` and released by every `unlock()` call.
unsafe impl RawLock for FakeLock {
    fn init(&self) -> Result<(), PrimitiveFailure> {
        self.init_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_init.load(Ordering::Relaxed) {
            return Err(PrimitiveFailure);
        }

        Ok(())
    }

    fn lock(&self) -> Result<(), PrimitiveFailure> {
        self.lock_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_lock.load(Ordering::Relaxed) {
            return Err(PrimitiveFailure);
        }

        self.raw.lock();
        Ok(())
    }

    unsafe fn unlock(&self) -> Result<(), PrimitiveFailure> {
        self.unlock_calls.fetch_add(1, Ordering::Relaxed);

        // SAFETY: The caller guarantees that the lock is held by this thread.
        unsafe { self.raw.unlock() };

        if self.fail_unlock.load(Ordering::Relaxed) {
            return Err(PrimitiveFailure);
        }

        Ok(())
    }

    fn teardown(&self) -> Result<(), PrimitiveFailure> {
        self.teardown_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_teardown.load(Ordering::Relaxed) {
            return Err(PrimitiveFailure);
        }

        Ok(())
    }
}

/// An allocator for tests that can be told to fail and that keeps count of live allocations,
/// so tests can detect leaks and double frees.
///
/// Memory comes from [`SystemAllocator`]. Share it through an `Arc`, which also implements
/// [`RawAllocator`].
#[derive(Debug, Default)]
pub struct FakeAllocator {
    inner: SystemAllocator,

    fail_allocate: AtomicBool,
    fail_reallocate: AtomicBool,

    allocations: AtomicUsize,
    reallocations: AtomicUsize,
    deallocations: AtomicUsize,
}

impl FakeAllocator {
    /// Creates a fake that succeeds at everything.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: SystemAllocator,
            fail_allocate: AtomicBool::new(false),
            fail_reallocate: AtomicBool::new(false),
            allocations: AtomicUsize::new(0),
            reallocations: AtomicUsize::new(0),
            deallocations: AtomicUsize::new(0),
        }
    }

    /// Makes `allocate()` return nothing from now on, or stop failing.
    pub fn fail_allocate(&self, fail: bool) {
        self.fail_allocate.store(fail, Ordering::Relaxed);
    }

    /// Makes `reallocate()` return nothing from now on, or stop failing.
    pub fn fail_reallocate(&self, fail: bool) {
        self.fail_reallocate.store(fail, Ordering::Relaxed);
    }

    /// Number of successful allocations so far.
    #[must_use]
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of successful reallocations so far.
    #[must_use]
    pub fn reallocations(&self) -> usize {
        self.reallocations.load(Ordering::Relaxed)
    }

    /// Number of deallocations so far.
    #[must_use]
    pub fn deallocations(&self) -> usize {
        self.deallocations.load(Ordering::Relaxed)
    }

    /// Number of allocations that have not been deallocated yet.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.allocations().saturating_sub(self.deallocations())
    }
}

// SAFETY: Forwards to `SystemAllocator`, which upholds the contract, or returns `None`.
unsafe impl RawAllocator for FakeAllocator {
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        if self.fail_allocate.load(Ordering::Relaxed) {
            return None;
        }

        let data = self.inner.allocate(size)?;
        self.allocations.fetch_add(1, Ordering::Relaxed);
        Some(data)
    }

    unsafe fn reallocate(
        &self,
        data: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        if self.fail_reallocate.load(Ordering::Relaxed) {
            return None;
        }

        // SAFETY: Forwarding the caller's guarantees.
        let data = unsafe { self.inner.reallocate(data, old_size, new_size) }?;
        self.reallocations.fetch_add(1, Ordering::Relaxed);
        Some(data)
    }

    unsafe fn deallocate(&self, data: NonNull<u8>, size: NonZero<usize>) {
        self.deallocations.fetch_add(1, Ordering::Relaxed);

        // SAFETY: Forwarding the caller's guarantees.
        unsafe { self.inner.deallocate(data, size) };
    }
}
