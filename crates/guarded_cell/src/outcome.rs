// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::Result;

/// Why an operation counts as a full success.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[non_exhaustive]
pub enum Status {
    /// The operation completed as requested.
    #[display("completed")]
    Completed,

    /// The operation was skipped because concurrency is disabled for this lock.
    #[display("skipped, concurrency disabled")]
    ConcurrencyDisabled,
}

/// A secondary expectation that was not met by an operation whose primary effect did happen.
///
/// The cell remains valid and usable after any warning.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[non_exhaustive]
pub enum Warning {
    /// The operation completed but the lock could not be released afterwards.
    #[display("lock release failed after the operation completed")]
    LockReleaseFailed,

    /// The cell was destroyed but the lock primitive failed to tear down.
    #[display("lock teardown failed after the cell was destroyed")]
    LockTeardownFailed,

    /// Reallocation failed. The buffer, its contents and its size are unchanged.
    #[display("resize failed, the buffer keeps its previous size")]
    ResizeFailed,

    /// The caller's slice length differed from the buffer size, so fewer bytes were copied
    /// than one side expected.
    #[display("copy truncated, requested length differs from the buffer size")]
    Truncated,
}

/// The value of a successful or degraded-but-safe operation.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
pub enum Completion {
    /// Everything the caller asked for happened.
    #[display("success ({_0})")]
    Success(Status),

    /// The primary effect happened, a secondary guarantee did not.
    #[display("warning ({_0})")]
    Warning(Warning),
}

impl Completion {
    /// Plain, fully successful completion.
    pub const COMPLETED: Self = Self::Success(Status::Completed);

    /// Severity of this completion: never [`Severity::Error`].
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Success(_) => Severity::Success,
            Self::Warning(_) => Severity::Warning,
        }
    }

    /// The warning carried by this completion, if any.
    #[must_use]
    pub const fn warning(&self) -> Option<Warning> {
        match self {
            Self::Success(_) => None,
            Self::Warning(warning) => Some(*warning),
        }
    }
}

/// The three outcome tiers, ordered from best to worst.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, derive_more::Display)]
pub enum Severity {
    /// The operation fully completed.
    #[display("success")]
    Success,

    /// The operation completed, the cell is usable, a secondary expectation was not met.
    #[display("warning")]
    Warning,

    /// The operation did not complete and the cell is unchanged.
    #[display("error")]
    Error,
}

/// Classification helpers for the result of a cell or lock operation.
///
/// ```
/// use guarded_cell::{CellOptions, GuardedCell, OutcomeExt};
///
/// let cell = GuardedCell::new(CellOptions::default()).unwrap();
/// cell.allocate(4).unwrap();
///
/// let outcome = cell.write(&[9, 9]);
/// assert!(outcome.is_warning());
/// assert!(outcome.is_success_or_warning());
/// ```
pub trait OutcomeExt {
    /// The severity tier of this outcome.
    fn severity(&self) -> Severity;

    /// Whether the outcome is strictly a success.
    fn is_success(&self) -> bool {
        self.severity() == Severity::Success
    }

    /// Whether the outcome is strictly a warning.
    fn is_warning(&self) -> bool {
        self.severity() == Severity::Warning
    }

    /// Whether the outcome is strictly an error.
    fn is_error(&self) -> bool {
        self.severity() == Severity::Error
    }

    /// Whether the operation's primary effect happened.
    fn is_success_or_warning(&self) -> bool {
        self.severity() <= Severity::Warning
    }

    /// Whether anything at all went wrong.
    fn is_error_or_warning(&self) -> bool {
        self.severity() >= Severity::Warning
    }
}

impl OutcomeExt for Result<Completion> {
    fn severity(&self) -> Severity {
        match self {
            Ok(completion) => completion.severity(),
            Err(_) => Severity::Error,
        }
    }
}

impl OutcomeExt for Result<Status> {
    fn severity(&self) -> Severity {
        match self {
            Ok(_) => Severity::Success,
            Err(_) => Severity::Error,
        }
    }
}
