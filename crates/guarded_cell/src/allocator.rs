// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::alloc::{Layout, alloc_zeroed, dealloc, realloc};
use std::fmt::Debug;
use std::num::NonZero;
use std::ptr::NonNull;
use std::sync::Arc;

/// Provides the raw memory a [`GuardedCell`][crate::GuardedCell] keeps its buffer in.
///
/// Failure is reported by returning `None`, never by panicking or aborting, so that the cell
/// can turn it into an error or a warning.
///
/// The crate provides [`SystemAllocator`] as the implementation backed by the Rust global
/// allocator.
///
/// # Safety
///
/// * `allocate()` must return memory that is valid for reads and writes of `size` bytes,
///   zero-filled, and that stays valid until it is passed to `reallocate()` or `deallocate()`.
/// * A successful `reallocate()` must preserve the first `min(old_size, new_size)` bytes. The
///   remaining bytes may be uninitialized. A failed `reallocate()` must leave the original
///   allocation valid and unchanged.
pub unsafe trait RawAllocator: Debug + Send + Sync {
    /// Allocates `size` zero-filled bytes.
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>>;

    /// Changes the size of an allocation, possibly moving it.
    ///
    /// # Safety
    ///
    /// `data` must be a live allocation of `old_size` bytes obtained from this allocator. If
    /// `Some` is returned, `data` must not be used anymore.
    unsafe fn reallocate(
        &self,
        data: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>>;

    /// Releases an allocation.
    ///
    /// # Safety
    ///
    /// `data` must be a live allocation of `size` bytes obtained from this allocator. It must
    /// not be used afterwards.
    unsafe fn deallocate(&self, data: NonNull<u8>, size: NonZero<usize>);
}

// SAFETY: Forwards to the shared allocator, which upholds the contract itself.
unsafe impl<A: RawAllocator> RawAllocator for Arc<A> {
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        (**self).allocate(size)
    }

    unsafe fn reallocate(
        &self,
        data: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe { (**self).reallocate(data, old_size, new_size) }
    }

    unsafe fn deallocate(&self, data: NonNull<u8>, size: NonZero<usize>) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe { (**self).deallocate(data, size) }
    }
}

/// Allocates from the Rust global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAllocator;

impl SystemAllocator {
    /// `None` if `size` exceeds `isize::MAX`, which no allocation may.
    fn layout(size: NonZero<usize>) -> Option<Layout> {
        Layout::array::<u8>(size.get()).ok()
    }
}

// SAFETY: Delegates to `std::alloc`, which hands out memory with exactly these guarantees.
unsafe impl RawAllocator for SystemAllocator {
    fn allocate(&self, size: NonZero<usize>) -> Option<NonNull<u8>> {
        let layout = Self::layout(size)?;

        // SAFETY: Layout has nonzero size, as guaranteed by the `NonZero` input.
        NonNull::new(unsafe { alloc_zeroed(layout) })
    }

    unsafe fn reallocate(
        &self,
        data: NonNull<u8>,
        old_size: NonZero<usize>,
        new_size: NonZero<usize>,
    ) -> Option<NonNull<u8>> {
        let layout = Self::layout(old_size)?;
        // The new size must also be a valid layout, `realloc()` does not check.
        Self::layout(new_size)?;

        // SAFETY: The caller guarantees `data` was allocated by us with `old_size`, which is
        // the layout we allocated it with. The new size is nonzero and fits a layout.
        NonNull::new(unsafe { realloc(data.as_ptr(), layout, new_size.get()) })
    }

    unsafe fn deallocate(&self, data: NonNull<u8>, size: NonZero<usize>) {
        // A live allocation of `size` bytes implies the layout is valid.
        if let Some(layout) = Self::layout(size) {
            // SAFETY: The caller guarantees `data` is a live allocation of this layout.
            unsafe { dealloc(data.as_ptr(), layout) };
        }
    }
}
