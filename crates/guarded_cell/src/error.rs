// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use thiserror::Error;

use crate::{LifecycleState, Operation};

/// A specialized `Result` for cell and lock operations. Successful operations yield a
/// [`Completion`][crate::Completion] unless stated otherwise.
pub type Result<T = crate::Completion> = std::result::Result<T, Error>;

/// An operation that did not complete.
///
/// Whenever one of these is returned, the cell is in exactly the state it was in before the
/// call. Secondary failures that happen after the primary effect took place are reported as a
/// [`Warning`][crate::Warning] instead.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied an argument the operation does not accept, e.g. a zero size or an
    /// empty slice.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The operation is not legal for the current lifecycle state of the cell.
    #[error("cannot {operation} a cell that is {state}")]
    InvalidState {
        /// The rejected operation.
        operation: Operation,
        /// The state the cell was in.
        state: LifecycleState,
    },

    /// The allocator could not provide the requested memory.
    #[error("failed to allocate {size} bytes")]
    AllocationFailed {
        /// The requested size in bytes.
        size: usize,
    },

    /// The lock primitive failed to initialize. The lock can never be used.
    #[error("lock primitive failed to initialize")]
    LockInitFailed,

    /// The lock is not usable, because its primitive failed to initialize.
    #[error("lock is invalid")]
    LockInvalid,

    /// The lock primitive refused to be acquired.
    #[error("failed to acquire lock")]
    LockAcquireFailed,

    /// The lock primitive refused to be released.
    ///
    /// Cell operations report this as [`Warning::LockReleaseFailed`][crate::Warning::LockReleaseFailed].
    #[error("failed to release lock")]
    LockReleaseFailed,

    /// The lock primitive failed to tear down.
    ///
    /// Cell operations report this as [`Warning::LockTeardownFailed`][crate::Warning::LockTeardownFailed].
    #[error("failed to tear down lock")]
    LockTeardownFailed,

    /// Concurrency is disabled for this cell but another thread is using it right now.
    #[error("cell is in use by another thread and concurrency is disabled")]
    ConcurrentAccess,
}

impl Error {
    pub(crate) const fn invalid_state(operation: Operation, state: LifecycleState) -> Self {
        Self::InvalidState { operation, state }
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn invalid_state_message() {
        let e = Error::invalid_state(Operation::Read, LifecycleState::Uninitialized);
        assert_eq!(e.to_string(), "cannot read a cell that is uninitialized");
    }

    #[test]
    fn allocation_failed_message() {
        let e = Error::AllocationFailed { size: 16 };
        assert_eq!(e.to_string(), "failed to allocate 16 bytes");
    }
}
