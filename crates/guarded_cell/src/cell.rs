// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::cell::UnsafeCell;
use std::fmt::{self, Debug};
use std::num::NonZero;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{Level, event, warn};

use crate::buffer::Buffer;
use crate::state::AtomicState;
use crate::{
    CellOptions, Completion, Error, LifecycleState, LockGuard, LockToken, Operation,
    ParkingLotLock, RawAllocator, RawLock, Result, SystemAllocator, Warning,
};

/// An owned heap byte buffer that tracks its own lifecycle and rejects every operation that is
/// not legal in its current state.
///
/// The lifecycle is:
///
/// ```text
///                  allocate            write
///   Unallocated ─────────────▶ Uninitialized ─────────▶ Initialized ◀─┐
///        ▲                        ▲     │                 │   │       │ write, resize(≤)
///        │                        │     │                 │   └───────┘
///        │ free, resize(0)        └─────┼── resize(>) ────┘
///        └──────────────────────────────┴─────────────────┘
///
///   any state except Destroyed ── destroy ──▶ Destroyed (terminal)
/// ```
///
/// Reading is only possible in the `Initialized` state, so memory is never read before it has
/// been written. Growing the buffer returns it to `Uninitialized` until it is written again.
///
/// Every operation is a critical section: it acquires the cell's [`LockGuard`], checks the state,
/// performs the memory action and releases the lock. Operations take `&self`, so a concurrent
/// cell can be shared between threads by reference.
///
/// # Outcomes
///
/// Operations return `Ok` with a [`Completion`] if their primary effect happened. The completion
/// is a [`Warning`] when a secondary expectation was not met, e.g. a copy was truncated or the
/// lock could not be released afterwards. An `Err` means the cell is exactly as it was before.
///
/// # Ownership
///
/// The buffer is owned exclusively by the cell. No method hands out a reference to it; bytes
/// are only copied in and out. The cell cannot be cloned.
///
/// # Contents
///
/// Memory is zero-filled when allocated and when grown. A write shorter than the buffer leaves
/// the remaining bytes as they were.
///
/// # Examples
///
/// ```
/// use guarded_cell::{CellOptions, Completion, Error, GuardedCell, LifecycleState};
///
/// let cell = GuardedCell::new(CellOptions::default())?;
/// cell.allocate(8)?;
/// cell.write(&[1, 2, 3, 4, 5, 6, 7, 8])?;
///
/// let mut out = [0; 8];
/// assert_eq!(cell.read(&mut out)?, Completion::COMPLETED);
/// assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
///
/// cell.destroy()?;
/// assert_eq!(cell.state(), LifecycleState::Destroyed);
/// assert!(matches!(cell.destroy(), Err(Error::InvalidState { .. })));
/// # Ok::<(), Error>(())
/// ```
pub struct GuardedCell<A: RawAllocator = SystemAllocator, L: RawLock = ParkingLotLock> {
    lock: LockGuard<L>,
    state: AtomicState,
    // Mirrors the buffer size for observers that do not take the lock.
    size: AtomicUsize,
    buffer: UnsafeCell<Option<Buffer>>,
    allocator: A,
    options: CellOptions,
}

// SAFETY: `buffer` is only accessed through `buffer_mut()`, which requires a token of `lock`,
// or through `&mut self`. The guard hands out one token at a time. The exception is after
// `destroy()` has torn the guard down, when tokens of both guard modes may coexist, but by then
// the state is `Destroyed` for good and no operation touches the buffer in that state.
unsafe impl<A: RawAllocator, L: RawLock> Sync for GuardedCell<A, L> {}

impl GuardedCell {
    /// Creates an unallocated cell that uses the global allocator and a `parking_lot` mutex.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockInitFailed`] if the lock cannot be initialized.
    pub fn new(options: CellOptions) -> Result<Self> {
        Self::with_parts(options, SystemAllocator, ParkingLotLock::new())
    }

    /// Creates a cell holding a zero-filled, uninitialized buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Fails like [`new()`][Self::new] and [`allocate()`][Self::allocate].
    pub fn with_size(options: CellOptions, size: usize) -> Result<Self> {
        let cell = Self::new(options)?;
        cell.allocate(size)?;
        Ok(cell)
    }

    /// Creates an initialized cell holding a copy of `data`.
    ///
    /// # Errors
    ///
    /// Fails like [`new()`][Self::new] and [`allocate()`][Self::allocate]; empty `data` is an
    /// [`Error::InvalidArgument`].
    pub fn from_bytes(options: CellOptions, data: &[u8]) -> Result<Self> {
        let cell = Self::with_size(options, data.len())?;
        cell.write(data)?;
        Ok(cell)
    }
}

impl<A: RawAllocator, L: RawLock> GuardedCell<A, L> {
    /// Creates an unallocated cell from a custom allocator and lock primitive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockInitFailed`] if the cell is concurrent and the lock primitive
    /// fails to initialize.
    pub fn with_parts(options: CellOptions, allocator: A, lock: L) -> Result<Self> {
        let lock = LockGuard::create(options.is_concurrent(), lock)?;

        Ok(Self {
            lock,
            state: AtomicState::new(LifecycleState::Unallocated),
            size: AtomicUsize::new(0),
            buffer: UnsafeCell::new(None),
            allocator,
            options,
        })
    }

    /// The current lifecycle state. Another thread may change it right after this returns.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state.load()
    }

    /// The current buffer size in bytes, zero when no buffer is held.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Whether the cell was created as managed.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.options.is_managed()
    }

    /// Whether operations on the cell take its lock.
    #[must_use]
    pub const fn is_concurrent(&self) -> bool {
        self.options.is_concurrent()
    }

    /// Allocates a zero-filled buffer of `size` bytes, moving the cell to `Uninitialized`.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `size` is zero.
    /// * [`Error::InvalidState`] unless the cell is `Unallocated`.
    /// * [`Error::AllocationFailed`] if the allocator has no memory to give.
    /// * Any lock acquisition error.
    pub fn allocate(&self, size: usize) -> Result<Completion> {
        let Some(size) = NonZero::new(size) else {
            return Err(Error::InvalidArgument("size must be greater than zero"));
        };

        let mut token = self.enter(Operation::Allocate)?;
        let state = self.require(Operation::Allocate, |state| {
            state == LifecycleState::Unallocated
        })?;

        let Some(buffer) = Buffer::allocate(&self.allocator, size) else {
            warn!(size = size.get(), "allocation failed");
            return Err(Error::AllocationFailed { size: size.get() });
        };

        *self.buffer_mut(&mut token) = Some(buffer);
        self.size.store(size.get(), Ordering::Release);
        self.transition(Operation::Allocate, state, LifecycleState::Uninitialized);

        Self::finish(Operation::Allocate, token, Completion::COMPLETED)
    }

    /// Copies `data` to the front of the buffer, moving the cell to `Initialized`.
    ///
    /// If `data` is longer than the buffer, only the bytes that fit are copied. If it is
    /// shorter, the rest of the buffer keeps its previous contents. Either way the write
    /// succeeds with [`Warning::Truncated`].
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `data` is empty.
    /// * [`Error::InvalidState`] unless the cell holds a buffer.
    /// * Any lock acquisition error.
    pub fn write(&self, data: &[u8]) -> Result<Completion> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("data must not be empty"));
        }

        let mut token = self.enter(Operation::Write)?;
        let state = self.require(Operation::Write, LifecycleState::has_buffer)?;

        let size = {
            let buffer = self.held_buffer(&mut token, Operation::Write, state)?;
            buffer.copy_from(data);
            buffer.size().get()
        };

        self.transition(Operation::Write, state, LifecycleState::Initialized);

        let completion = if data.len() == size {
            Completion::COMPLETED
        } else {
            warn!(requested = data.len(), size, "write truncated to the buffer size");
            Completion::Warning(Warning::Truncated)
        };

        Self::finish(Operation::Write, token, completion)
    }

    /// Copies the front of the buffer into `out`.
    ///
    /// If `out` and the buffer differ in length, only the shorter length is copied, any
    /// remaining bytes of `out` are left alone and the read succeeds with [`Warning::Truncated`].
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidArgument`] if `out` is empty.
    /// * [`Error::InvalidState`] unless the cell is `Initialized`.
    /// * Any lock acquisition error.
    pub fn read(&self, out: &mut [u8]) -> Result<Completion> {
        if out.is_empty() {
            return Err(Error::InvalidArgument("output buffer must not be empty"));
        }

        let mut token = self.enter(Operation::Read)?;
        let state = self.require(Operation::Read, |state| {
            state == LifecycleState::Initialized
        })?;

        let size = {
            let buffer = self.held_buffer(&mut token, Operation::Read, state)?;
            buffer.copy_to(out);
            buffer.size().get()
        };

        let completion = if out.len() == size {
            Completion::COMPLETED
        } else {
            warn!(requested = out.len(), size, "read truncated to the buffer size");
            Completion::Warning(Warning::Truncated)
        };

        Self::finish(Operation::Read, token, completion)
    }

    /// Copies the whole buffer into a new vector.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] unless the cell is `Initialized`.
    /// * Any lock acquisition error.
    pub fn read_to_vec(&self) -> Result<(Vec<u8>, Completion)> {
        let mut token = self.enter(Operation::Read)?;
        let state = self.require(Operation::Read, |state| {
            state == LifecycleState::Initialized
        })?;

        let bytes = self
            .held_buffer(&mut token, Operation::Read, state)?
            .as_slice()
            .to_vec();

        let completion = Self::finish(Operation::Read, token, Completion::COMPLETED)?;
        Ok((bytes, completion))
    }

    /// Changes the buffer size. A `new_size` of zero frees the buffer, exactly like
    /// [`free()`][Self::free].
    ///
    /// Growing zero-fills the new bytes and moves the cell to `Uninitialized`, as the new
    /// tail holds no caller data. Shrinking, or keeping the size, preserves the state.
    ///
    /// If the allocator cannot satisfy the request, the buffer keeps its old size and contents,
    /// the state is unchanged and the call succeeds with [`Warning::ResizeFailed`]. The cell
    /// remains fully usable.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] unless the cell holds a buffer.
    /// * Any lock acquisition error.
    pub fn resize(&self, new_size: usize) -> Result<Completion> {
        let Some(new_size) = NonZero::new(new_size) else {
            return self.free();
        };

        let mut token = self.enter(Operation::Resize)?;
        let state = self.require(Operation::Resize, LifecycleState::has_buffer)?;

        let (resized, old_size) = {
            let buffer = self.held_buffer(&mut token, Operation::Resize, state)?;
            let old_size = buffer.size();
            (buffer.resize(&self.allocator, new_size), old_size)
        };

        if !resized {
            warn!(
                old_size = old_size.get(),
                new_size = new_size.get(),
                "resize failed, keeping the previous buffer"
            );
            return Self::finish(
                Operation::Resize,
                token,
                Completion::Warning(Warning::ResizeFailed),
            );
        }

        self.size.store(new_size.get(), Ordering::Release);

        if new_size > old_size {
            self.transition(Operation::Resize, state, LifecycleState::Uninitialized);
        }

        Self::finish(Operation::Resize, token, Completion::COMPLETED)
    }

    /// Releases the buffer, moving the cell to `Unallocated`.
    ///
    /// Freeing is not idempotent: callers must know whether they already freed.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] unless the cell holds a buffer.
    /// * Any lock acquisition error.
    pub fn free(&self) -> Result<Completion> {
        let mut token = self.enter(Operation::Free)?;
        let state = self.require(Operation::Free, LifecycleState::has_buffer)?;

        if let Some(buffer) = self.buffer_mut(&mut token).take() {
            buffer.release(&self.allocator);
        }

        self.size.store(0, Ordering::Release);
        self.transition(Operation::Free, state, LifecycleState::Unallocated);

        Self::finish(Operation::Free, token, Completion::COMPLETED)
    }

    /// Releases the buffer if one is held, tears down the lock and moves the cell to the
    /// terminal `Destroyed` state, where every further operation is rejected.
    ///
    /// Once the lock is acquired, destruction always runs to the end. Failures to release or
    /// tear down the lock after that point are reported as [`Warning::LockReleaseFailed`] or
    /// [`Warning::LockTeardownFailed`], in that order of precedence.
    ///
    /// # Errors
    ///
    /// * [`Error::InvalidState`] if the cell is already destroyed.
    /// * Any lock acquisition error, in which case nothing happened.
    pub fn destroy(&self) -> Result<Completion> {
        let mut token = self.enter(Operation::Destroy)?;
        let state = self.require(Operation::Destroy, |state| {
            state != LifecycleState::Destroyed
        })?;

        if let Some(buffer) = self.buffer_mut(&mut token).take() {
            buffer.release(&self.allocator);
        }

        self.size.store(0, Ordering::Release);
        self.transition(Operation::Destroy, state, LifecycleState::Destroyed);

        // The memory is gone, so every remaining step runs regardless of earlier failures.
        let released = token.release();
        let torn_down = self.lock.teardown();

        if let Err(error) = &torn_down {
            warn!(%error, "cell destroyed but the lock failed to tear down");
        }

        match (released, torn_down) {
            (Err(error), _) => {
                warn!(%error, "cell destroyed but the lock was not released cleanly");
                Ok(Completion::Warning(Warning::LockReleaseFailed))
            }
            (Ok(_), Err(_)) => Ok(Completion::Warning(Warning::LockTeardownFailed)),
            (Ok(_), Ok(_)) => Ok(Completion::COMPLETED),
        }
    }

    fn enter(&self, operation: Operation) -> Result<LockToken<'_, L>> {
        // `Destroyed` is terminal, so it can be reported without the lock. A destroyed cell has
        // torn its lock down, and callers must not contend for what is left of it.
        if self.state.load() == LifecycleState::Destroyed {
            return Err(Error::invalid_state(operation, LifecycleState::Destroyed));
        }

        self.lock.acquire().map_err(|error| {
            // Lost a race with `destroy()`, which tore the lock down while we were entering.
            if self.state.load() == LifecycleState::Destroyed {
                Error::invalid_state(operation, LifecycleState::Destroyed)
            } else {
                error
            }
        })
    }

    fn require(
        &self,
        operation: Operation,
        allowed: fn(LifecycleState) -> bool,
    ) -> Result<LifecycleState> {
        let state = self.state.load();

        if allowed(state) {
            Ok(state)
        } else {
            event!(Level::DEBUG, %operation, %state, "operation rejected");
            Err(Error::invalid_state(operation, state))
        }
    }

    fn transition(&self, operation: Operation, from: LifecycleState, to: LifecycleState) {
        self.state.store(to);

        if from != to {
            event!(Level::DEBUG, %operation, %from, %to, "cell state changed");
        }
    }

    fn buffer_mut<'t>(&'t self, token: &'t mut LockToken<'_, L>) -> &'t mut Option<Buffer> {
        debug_assert!(token.belongs_to(&self.lock), "token was issued by another lock");

        // SAFETY: The token proves that our lock is held, see the `Sync` impl. The returned
        // reference borrows the token mutably, so it cannot be used to make a second one.
        unsafe { &mut *self.buffer.get() }
    }

    fn held_buffer<'t>(
        &'t self,
        token: &'t mut LockToken<'_, L>,
        operation: Operation,
        state: LifecycleState,
    ) -> Result<&'t mut Buffer> {
        // States that allow the operation always come with a buffer.
        self.buffer_mut(token)
            .as_mut()
            .ok_or(Error::invalid_state(operation, state))
    }

    fn finish(
        operation: Operation,
        token: LockToken<'_, L>,
        completion: Completion,
    ) -> Result<Completion> {
        match token.release() {
            Ok(_) => Ok(completion),
            Err(error) => {
                warn!(%operation, %error, "operation completed but the lock was not released cleanly");
                Ok(Completion::Warning(Warning::LockReleaseFailed))
            }
        }
    }
}

impl<A: RawAllocator, L: RawLock> Drop for GuardedCell<A, L> {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.get_mut().take() {
            buffer.release(&self.allocator);
            event!(Level::DEBUG, "cell dropped while holding a buffer");
        }

        self.state.store(LifecycleState::Destroyed);
    }
}

impl<A: RawAllocator, L: RawLock> Debug for GuardedCell<A, L> {
    #[cfg_attr(test, mutants::skip)] // No API contract.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedCell")
            .field("state", &self.state())
            .field("size", &self.size())
            .field("is_managed", &self.is_managed())
            .field("is_concurrent", &self.is_concurrent())
            .finish_non_exhaustive()
    }
}
