// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::num::NonZero;
use std::ptr::NonNull;

use crate::{RawAllocator, ThreadSafe};

/// The heap allocation owned by a cell: a bookkeeping structure around a contiguous chunk of
/// memory.
///
/// Every byte is always initialized. Fresh allocations come zero-filled from the allocator and
/// growth zero-fills the new tail, so the contents can be exposed as `&[u8]` at any time.
///
/// The buffer does not remember its allocator, so it cannot release itself on drop. Whoever
/// owns it must hand it back through [`release()`][Self::release]; the cell does this on
/// `free()`, `destroy()` and when dropped.
///
/// # Ownership
///
/// The buffer is never shared. The cell keeps it behind its lock and only ever copies bytes in
/// or out, so no reference to the memory outlives a single locked operation.
#[derive(Debug)]
pub(crate) struct Buffer {
    data: ThreadSafe<NonNull<u8>>,
    size: NonZero<usize>,
}

impl Buffer {
    /// Allocates a zero-filled buffer, or `None` if the allocator has no memory to give.
    pub(crate) fn allocate(allocator: &impl RawAllocator, size: NonZero<usize>) -> Option<Self> {
        let data = allocator.allocate(size)?;

        // SAFETY: It is just a pointer that we own exclusively. Access is serialized by the
        // lock of the cell that owns this buffer.
        let data = unsafe { ThreadSafe::new(data) };

        Some(Self { data, size })
    }

    pub(crate) const fn size(&self) -> NonZero<usize> {
        self.size
    }

    /// Changes the size of the buffer. Returns `false` and leaves the buffer untouched if the
    /// allocator cannot satisfy the request.
    pub(crate) fn resize(&mut self, allocator: &impl RawAllocator, new_size: NonZero<usize>) -> bool {
        if new_size == self.size {
            return true;
        }

        // SAFETY: We own a live allocation of `self.size` bytes from this allocator. On success
        // we replace the old pointer right away and never touch it again.
        let Some(data) = (unsafe { allocator.reallocate(*self.data, self.size, new_size) }) else {
            return false;
        };

        if new_size > self.size {
            let tail = new_size.get() - self.size.get();

            // SAFETY: The allocation is `new_size` bytes long, so an offset of `self.size`
            // stays in bounds.
            let tail_start = unsafe { data.add(self.size.get()) };

            // SAFETY: The `tail` bytes from `tail_start` are the end of the allocation. They are
            // uninitialized until now.
            unsafe { tail_start.write_bytes(0, tail) };
        }

        // SAFETY: Same reasoning as in `allocate()`.
        self.data = unsafe { ThreadSafe::new(data) };
        self.size = new_size;
        true
    }

    /// Copies as many bytes as fit from `source` to the front of the buffer.
    /// Returns the number of bytes copied.
    pub(crate) fn copy_from(&mut self, source: &[u8]) -> usize {
        let target = self.as_mut_slice();
        let count = source.len().min(target.len());
        target[..count].copy_from_slice(&source[..count]);
        count
    }

    /// Copies as many bytes as fit from the front of the buffer to `target`.
    /// Returns the number of bytes copied.
    pub(crate) fn copy_to(&self, target: &mut [u8]) -> usize {
        let source = self.as_slice();
        let count = source.len().min(target.len());
        target[..count].copy_from_slice(&source[..count]);
        count
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        // SAFETY: The allocation is live and `size` bytes long, all of them initialized. The
        // shared borrow of `self` prevents concurrent mutation through this buffer.
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.size.get()) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: As in `as_slice()`, and the exclusive borrow of `self` makes this the only
        // reference to the memory.
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.size.get()) }
    }

    /// Hands the memory back to the allocator it came from.
    pub(crate) fn release(self, allocator: &impl RawAllocator) {
        // SAFETY: We own a live allocation of `self.size` bytes from this allocator and are
        // consumed here, so nothing can use it afterwards.
        unsafe { allocator.deallocate(*self.data, self.size) };
    }
}
