// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{Level, event, warn};

use crate::{Error, ParkingLotLock, RawLock, Result, Status};

/// Wraps a [`RawLock`] primitive with an enabled flag and a validity flag.
///
/// A disabled guard never touches its primitive, which lets single-threaded users pay no
/// synchronization cost without changing call sites. A guard whose primitive failed to
/// initialize remembers this and fails every later acquisition fast, without touching the
/// primitive again.
///
/// Disabled guards still refuse overlapping use: acquiring a disabled guard that is already
/// held elsewhere returns [`Error::ConcurrentAccess`] instead of blocking.
///
/// Access is scoped: [`acquire()`][Self::acquire] returns a [`LockToken`] that gives the lock
/// back when released or dropped, so no exit path can leave it held.
#[derive(Debug)]
pub struct LockGuard<L: RawLock = ParkingLotLock> {
    enabled: AtomicBool,
    valid: AtomicBool,
    // Taken by tokens of a disabled guard.
    busy: AtomicBool,
    raw: L,
}

impl<L: RawLock> LockGuard<L> {
    /// Creates a guard, initializing the primitive if `enabled` is set.
    ///
    /// This never fails. If the primitive fails to initialize, the guard is permanently
    /// invalid; inspect [`init_status()`][Self::init_status] or use
    /// [`create()`][Self::create] to reject such guards up front.
    pub fn new(enabled: bool, raw: L) -> Self {
        let valid = !enabled || raw.init().is_ok();

        if !valid {
            event!(Level::ERROR, "lock primitive failed to initialize");
        }

        Self {
            enabled: AtomicBool::new(enabled),
            valid: AtomicBool::new(valid),
            busy: AtomicBool::new(false),
            raw,
        }
    }

    /// Creates a guard, failing if the primitive does not initialize.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockInitFailed`] if the primitive failed to initialize.
    pub fn create(enabled: bool, raw: L) -> Result<Self> {
        let guard = Self::new(enabled, raw);
        guard.init_status()?;
        Ok(guard)
    }

    /// Reports how construction went: [`Status::ConcurrencyDisabled`] for a disabled guard,
    /// [`Status::Completed`] for an enabled and usable one.
    ///
    /// A guard that has been torn down reports itself as disabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockInitFailed`] if the primitive failed to initialize.
    pub fn init_status(&self) -> Result<Status> {
        if !self.is_enabled() {
            Ok(Status::ConcurrencyDisabled)
        } else if self.is_valid() {
            Ok(Status::Completed)
        } else {
            Err(Error::LockInitFailed)
        }
    }

    /// Whether acquisitions go through the primitive.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Whether the primitive is usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Acquires the lock, blocking until the primitive is held. A disabled guard never blocks.
    ///
    /// # Errors
    ///
    /// * [`Error::LockInvalid`] if the primitive failed to initialize.
    /// * [`Error::LockAcquireFailed`] if the primitive refused to be acquired.
    /// * [`Error::ConcurrentAccess`] if the guard is disabled and already held elsewhere.
    pub fn acquire(&self) -> Result<LockToken<'_, L>> {
        if self.is_enabled() {
            if self.is_valid() {
                if self.raw.lock().is_err() {
                    return Err(Error::LockAcquireFailed);
                }

                return Ok(LockToken {
                    guard: self,
                    mode: Some(Mode::Locked),
                });
            }

            // `teardown()` clears `enabled` before `valid`, so a guard that still reads as
            // enabled here genuinely failed to initialize.
            if self.is_enabled() {
                return Err(Error::LockInvalid);
            }
        }

        if self.busy.swap(true, Ordering::Acquire) {
            return Err(Error::ConcurrentAccess);
        }

        Ok(LockToken {
            guard: self,
            mode: Some(Mode::Skipped),
        })
    }

    /// Tears down the primitive if the guard is enabled and valid, then resets the guard to
    /// the disabled and invalid state. Calling this again is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockTeardownFailed`] if the primitive failed to tear down. The guard
    /// is reset regardless.
    pub fn teardown(&self) -> Result<Status> {
        let was_enabled = self.enabled.swap(false, Ordering::AcqRel);
        let was_valid = self.valid.swap(false, Ordering::AcqRel);

        if was_enabled && was_valid && self.raw.teardown().is_err() {
            return Err(Error::LockTeardownFailed);
        }

        Ok(Status::Completed)
    }

    fn release(&self, mode: Mode) -> Result<Status> {
        match mode {
            Mode::Skipped => {
                self.busy.store(false, Ordering::Release);
                Ok(Status::ConcurrencyDisabled)
            }
            // A token that locked the primitive always unlocks it, even if the guard has been
            // torn down since, so that waiters blocked in `lock()` can proceed.
            Mode::Locked => {
                // SAFETY: The token that carried `Mode::Locked` acquired the primitive.
                if unsafe { self.raw.unlock() }.is_err() {
                    return Err(Error::LockReleaseFailed);
                }

                Ok(Status::Completed)
            }
        }
    }
}

impl<L: RawLock> Drop for LockGuard<L> {
    fn drop(&mut self) {
        if let Err(error) = self.teardown() {
            warn!(%error, "lock guard dropped with a failing teardown");
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Locked,
    Skipped,
}

/// Proof that a [`LockGuard`] is held. Gives the lock back when released or dropped.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the token is dropped"]
pub struct LockToken<'a, L: RawLock> {
    guard: &'a LockGuard<L>,
    // `None` once released.
    mode: Option<Mode>,
}

impl<L: RawLock> LockToken<'_, L> {
    /// How the lock was acquired: [`Status::Completed`] if the primitive is held,
    /// [`Status::ConcurrencyDisabled`] if the guard is disabled.
    #[must_use]
    pub fn status(&self) -> Status {
        match self.mode {
            Some(Mode::Skipped) => Status::ConcurrencyDisabled,
            _ => Status::Completed,
        }
    }

    /// Releases the lock and reports the primitive's outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockReleaseFailed`] if the primitive reported a failure. The guarded
    /// action has already happened by then, so callers treat this as a warning.
    pub fn release(mut self) -> Result<Status> {
        match self.mode.take() {
            Some(mode) => self.guard.release(mode),
            None => Ok(self.status()),
        }
    }

    pub(crate) fn belongs_to(&self, guard: &LockGuard<L>) -> bool {
        std::ptr::eq(self.guard, guard)
    }
}

impl<L: RawLock> Drop for LockToken<'_, L> {
    fn drop(&mut self) {
        if let Some(mode) = self.mode.take()
            && let Err(error) = self.guard.release(mode)
        {
            warn!(%error, "lock release failed on an early exit path");
        }
    }
}
