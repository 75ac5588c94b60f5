// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ops::Deref;

/// A promise that a T is thread-safe (`Send` and `Sync`), even if the type `T` is not originally
/// so. Used for the raw buffer pointer, whose thread-safety follows from exclusive ownership by
/// the cell and from every access happening under the cell's lock.
#[derive(Clone, Copy, derive_more::Debug, Eq, PartialEq)]
#[debug("{inner:?}")]
#[repr(transparent)]
pub(crate) struct ThreadSafe<T> {
    inner: T,
}

#[expect(
    clippy::non_send_fields_in_send_ty,
    reason = "this is escape hatch used internally in this crate, the callers are responsible for ensuring that the inner type is correctly used"
)]
// SAFETY: Forwarding the guarantees received in new().
unsafe impl<T> Send for ThreadSafe<T> {}

// SAFETY: Forwarding the guarantees received in new().
unsafe impl<T> Sync for ThreadSafe<T> {}

impl<T> ThreadSafe<T> {
    /// # Safety
    ///
    /// The caller must ensure that the inner value truly is thread-safe,
    /// both for sending and for referencing (`Send` and `Sync`).
    pub(crate) const unsafe fn new(inner: T) -> Self {
        Self { inner }
    }
}

impl<T> Deref for ThreadSafe<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::ptr::NonNull;
    use std::thread;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    #[test]
    fn pointer_becomes_thread_safe() {
        assert_not_impl_any!(NonNull<u8>: Send, Sync);
        assert_impl_all!(ThreadSafe<NonNull<u8>>: Send, Sync);
    }

    #[test]
    fn smoke_test() {
        let mut value = 1234_u64;
        let pointer = NonNull::from(&mut value);

        // SAFETY: We only read through the pointer while `value` is alive, on one thread at a time.
        let pretend_safe = unsafe { ThreadSafe::new(pointer) };

        let address = thread::scope(|scope| {
            scope
                .spawn(move || {
                    let wrapper = pretend_safe;
                    wrapper.as_ptr() as usize
                })
                .join()
                .unwrap()
        });

        assert_eq!(address, pointer.as_ptr() as usize);
        assert_eq!(*pretend_safe, pointer);
    }
}
