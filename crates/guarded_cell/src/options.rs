// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Construction-time configuration of a [`GuardedCell`][crate::GuardedCell].
///
/// ```
/// use guarded_cell::CellOptions;
///
/// let options = CellOptions::new().concurrent(false).managed(true);
/// assert!(!options.is_concurrent());
/// assert!(options.is_managed());
/// ```
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CellOptions {
    is_managed: bool,
    is_concurrent: bool,
}

impl CellOptions {
    /// Unmanaged and concurrent, the same as [`CellOptions::default()`].
    #[must_use]
    pub const fn new() -> Self {
        Self {
            is_managed: false,
            is_concurrent: true,
        }
    }

    /// Marks the cell as managed. This is a bookkeeping flag that callers may query through
    /// [`GuardedCell::is_managed()`][crate::GuardedCell::is_managed]; the cell itself does not
    /// act on it.
    #[must_use]
    pub const fn managed(mut self, is_managed: bool) -> Self {
        self.is_managed = is_managed;
        self
    }

    /// Selects whether every operation takes the cell's lock.
    ///
    /// Without it, the cell never blocks and makes no system calls, but rejects overlapping
    /// use from several threads with [`Error::ConcurrentAccess`][crate::Error::ConcurrentAccess].
    #[must_use]
    pub const fn concurrent(mut self, is_concurrent: bool) -> Self {
        self.is_concurrent = is_concurrent;
        self
    }

    /// Whether the cell is marked as managed.
    #[must_use]
    pub const fn is_managed(&self) -> bool {
        self.is_managed
    }

    /// Whether the cell's lock is enabled.
    #[must_use]
    pub const fn is_concurrent(&self) -> bool {
        self.is_concurrent
    }
}

impl Default for CellOptions {
    fn default() -> Self {
        Self::new()
    }
}
