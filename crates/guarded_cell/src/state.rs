// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle state of a [`GuardedCell`][crate::GuardedCell], which decides the operations
/// that are legal on it.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[repr(u8)]
pub enum LifecycleState {
    /// No buffer is held.
    #[display("unallocated")]
    Unallocated = 0,

    /// A buffer is held but nothing has been written to it since it was allocated or grown.
    #[display("uninitialized")]
    Uninitialized = 1,

    /// A buffer is held and holds caller data.
    #[display("initialized")]
    Initialized = 2,

    /// The cell has been destroyed. Terminal.
    #[display("destroyed")]
    Destroyed = 3,
}

impl LifecycleState {
    /// Whether a cell in this state owns a buffer.
    #[must_use]
    pub const fn has_buffer(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Initialized)
    }

    const fn from_repr(value: u8) -> Self {
        match value {
            0 => Self::Unallocated,
            1 => Self::Uninitialized,
            2 => Self::Initialized,
            // Only values written by `AtomicState::store()` are ever observed.
            _ => Self::Destroyed,
        }
    }
}

/// Names a cell operation in errors and log events.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, derive_more::Display)]
#[non_exhaustive]
pub enum Operation {
    /// [`GuardedCell::allocate()`][crate::GuardedCell::allocate]
    #[display("allocate")]
    Allocate,

    /// [`GuardedCell::write()`][crate::GuardedCell::write]
    #[display("write")]
    Write,

    /// [`GuardedCell::read()`][crate::GuardedCell::read]
    #[display("read")]
    Read,

    /// [`GuardedCell::resize()`][crate::GuardedCell::resize]
    #[display("resize")]
    Resize,

    /// [`GuardedCell::free()`][crate::GuardedCell::free]
    #[display("free")]
    Free,

    /// [`GuardedCell::destroy()`][crate::GuardedCell::destroy]
    #[display("destroy")]
    Destroy,
}

/// Lifecycle state readable from any thread. Written only while the cell's lock is held.
#[derive(Debug)]
pub(crate) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(crate) const fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> LifecycleState {
        LifecycleState::from_repr(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_presence_by_state() {
        assert!(!LifecycleState::Unallocated.has_buffer());
        assert!(LifecycleState::Uninitialized.has_buffer());
        assert!(LifecycleState::Initialized.has_buffer());
        assert!(!LifecycleState::Destroyed.has_buffer());
    }

    #[test]
    fn atomic_state_stores_every_state() {
        let state = AtomicState::new(LifecycleState::Unallocated);

        for value in [
            LifecycleState::Uninitialized,
            LifecycleState::Initialized,
            LifecycleState::Unallocated,
            LifecycleState::Destroyed,
        ] {
            state.store(value);
            assert_eq!(state.load(), value);
        }
    }

    #[test]
    fn display() {
        assert_eq!(LifecycleState::Uninitialized.to_string(), "uninitialized");
        assert_eq!(Operation::Resize.to_string(), "resize");
    }
}
