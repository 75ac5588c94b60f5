// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A heap memory cell that knows where it is in its lifecycle, with the most important types
//! being:
//!
//! * [`GuardedCell`] - owns at most one heap byte buffer and walks it through the
//!   `Unallocated`, `Uninitialized`, `Initialized` and `Destroyed` states, rejecting every
//!   operation that is not legal in the current state. Memory is never read before it is
//!   written, never freed twice and never touched after destruction.
//! * [`LockGuard`] - the optional lock around every cell operation. It can be disabled at
//!   construction time for single-threaded use, in which case it costs no system calls.
//!
//! Operations return a [`Result`] of [`Completion`]: an `Err` means nothing happened, while
//! `Ok` may still carry a [`Warning`] when the primary effect happened but a secondary
//! expectation did not hold, such as a truncated copy or a lock that failed to release.
//!
//! ```
//! use guarded_cell::{CellOptions, Completion, GuardedCell, LifecycleState, Warning};
//!
//! let cell = GuardedCell::new(CellOptions::default())?;
//! cell.allocate(4)?;
//!
//! // Reading before writing is rejected.
//! assert!(cell.read_to_vec().is_err());
//!
//! // Writing fewer bytes than the buffer holds succeeds with a warning.
//! assert_eq!(cell.write(&[9, 9])?, Completion::Warning(Warning::Truncated));
//! assert_eq!(cell.state(), LifecycleState::Initialized);
//!
//! let (bytes, _) = cell.read_to_vec()?;
//! assert_eq!(bytes, [9, 9, 0, 0]);
//!
//! cell.destroy()?;
//! # Ok::<(), guarded_cell::Error>(())
//! ```
//!
//! Memory and locking are pluggable through the [`RawAllocator`] and [`RawLock`] traits. The
//! defaults are [`SystemAllocator`], backed by the global allocator, and [`ParkingLotLock`],
//! backed by a `parking_lot` mutex. With the `test-util` feature the crate also exports
//! `FakeAllocator` and `FakeLock`, whose every step can be made to fail.

mod allocator;
mod buffer;
mod cell;
mod error;
mod lock_guard;
mod options;
mod outcome;
mod raw_lock;
mod state;
mod thread_safe;

pub(crate) use thread_safe::ThreadSafe;

pub use allocator::{RawAllocator, SystemAllocator};
pub use cell::GuardedCell;
pub use error::{Error, Result};
pub use lock_guard::{LockGuard, LockToken};
pub use options::CellOptions;
pub use outcome::{Completion, OutcomeExt, Severity, Status, Warning};
pub use raw_lock::{ParkingLotLock, PrimitiveFailure, RawLock};
pub use state::{LifecycleState, Operation};

#[cfg(any(feature = "test-util", test))]
mod fakes;

#[cfg(any(feature = "test-util", test))]
pub use fakes::{FakeAllocator, FakeLock};
