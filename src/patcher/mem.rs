//! This module contains a patcher which adjusts memory permissions to patch read-only data,
//! along with the protection queries used to validate patch targets

use std::convert::Infallible;
use std::mem;

use region::Protection;
use thiserror::Error;

use super::{PatchGuard, Patcher};

/// Errors when using permission patching
#[derive(Debug, Error)]
pub enum PermissionError<E> {
    /// Error when setting memory protections
    #[error("Error setting memory protections: {0}")]
    ProtectionError(#[from] region::Error),
    /// Custom error type from the underlying patcher
    #[error("{0}")]
    CustomError(E),
}
impl From<Infallible> for PermissionError<Infallible> {
    fn from(e: Infallible) -> Self {
        match e {}
    }
}

/// This struct wraps patchers to allow them to write to memory that's normally unwritable, such as code.
/// It achieves this result by changing the memory permissions of the target memory, triggering the patch, and then reverting the permissions.
///
/// # Safety
///
/// `PermissionWrapper` relies on the size of the patch value to determine how many pages to change write permissions,
/// pairing `PermissionWrapper` with a patcher that writes more memory than the size of the patch is undefined behavior.
pub struct PermissionWrapper<P: Patcher> {
    /// Underlying patcher.
    patcher: P,
}
impl<P: Patcher> PermissionWrapper<P> {
    /// Creates a new PermissionWrapper
    pub const fn new(patcher: P) -> Self {
        Self { patcher }
    }
}

/// Converts a const pointer to a mutable pointer to be passed into our [`Patcher::patch`] implementation.
///
/// # Safety
///
/// **THIS FUNCTION DOES NOT CHANGE MEMORY PERMISSIONS.**
///
/// This function should **ONLY** be called in conjunction with our [`Patcher::patch`] implementation, which properly changes the memory permissions.
pub unsafe fn to_mut<T>(ptr: *const T) -> *mut T {
    ptr as _
}

unsafe impl<P> Patcher for PermissionWrapper<P>
where
    P: Patcher,
    PermissionError<P::Error>: From<P::Error>,
{
    type Error = PermissionError<P::Error>;
    type Guard<'a> = PermissionWrapperGuard<P::Guard<'a>> where Self: 'a;

    unsafe fn patch<'a>(
        &'a self,
        location: *mut u8,
        patch: &[u8],
    ) -> Result<Self::Guard<'a>, Self::Error> {
        let _guard = region::protect_with_handle(location, patch.len(), Protection::all())?;
        self.patcher
            .patch(location, patch)
            .map(|g| PermissionWrapperGuard::guard(g, location, patch.len()))
            .map_err(Into::into)
    }
}

/// Permission guard for the underlying patch guard
pub struct PermissionWrapperGuard<G: PatchGuard> {
    /// Underlying patch guard for the wrapped patcher. `Option` so that we can drop it in our [`Drop::drop`] impl
    guard: Option<G>,
    /// Location of the patch
    location: *const u8,
    /// Length of the patch
    len: usize,
}
impl<G: PatchGuard> PermissionWrapperGuard<G> {
    /// Wrap a patcher's guard. When this guard is dropped, the underlying guard will also be dropped with its target location made writable
    fn guard(guard: G, location: *const u8, len: usize) -> Self {
        Self {
            guard: Some(guard),
            location,
            len,
        }
    }
    /// Get the underlying patch guard in case info is needed
    pub fn inner(&self) -> Option<&G> {
        self.guard.as_ref()
    }
}
unsafe impl<G: PatchGuard> PatchGuard for PermissionWrapperGuard<G> {}

// SAFETY: the pointer is only used to re-protect the page being restored
unsafe impl<G: PatchGuard + Send> Send for PermissionWrapperGuard<G> {}

impl<G: PatchGuard> Drop for PermissionWrapperGuard<G> {
    fn drop(&mut self) {
        let Some(guard) = self.guard.take() else {
            return;
        };
        // SAFETY: the same range was made writable when the wrapper was constructed
        match unsafe { region::protect_with_handle(self.location, self.len, Protection::all()) } {
            Ok(_handle) => guard.restore(),
            Err(e) => {
                // writing now would fault, leaving the patch in place is the lesser evil
                tracing::error!(location = ?self.location, error = %e, "unable to unprotect patched memory, leaking patch");
                mem::forget(guard);
            }
        }
    }
}

/// Checks whether every page covering `len` bytes from `ptr` is mapped writable
pub fn is_writable<T>(ptr: *const T, len: usize) -> bool {
    if ptr.is_null() {
        return false;
    }
    match region::query_range(ptr, len.max(1)) {
        Ok(regions) => regions
            .into_iter()
            .all(|r| r.map_or(false, |r| r.protection().contains(Protection::WRITE))),
        Err(_) => false,
    }
}

/// Checks whether `ptr` points into executable memory
pub fn is_executable<T>(ptr: *const T) -> bool {
    !ptr.is_null()
        && region::query(ptr)
            .map(|r| r.protection().contains(Protection::EXECUTE))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::slice;

    use region::Protection;
    use serial_test::serial;

    use crate::patcher::byte::BytePatcher;
    use crate::patcher::mem::{is_executable, is_writable, to_mut, PermissionWrapper};
    use crate::patcher::PatchGuard;
    use crate::patcher::Patcher;

    /// Read-only data living in the binary's constant section
    static READ_ONLY: [u8; 4] = *b"1234";

    #[test]
    /// Test patch and revert functionality
    fn test_patch() {
        let mut data = Box::new([1u8, 2, 3, 4]);
        let ptr = data.as_mut_ptr();

        // create the patcher and wrapper
        let wrapper = PermissionWrapper::new(BytePatcher::new());

        let patch = unsafe { wrapper.patch(ptr, &[4, 3, 2, 1]).unwrap() };

        // make sure the data was actually changed
        assert_eq!(unsafe { slice::from_raw_parts(ptr, 4) }, [4, 3, 2, 1]);

        patch.restore();

        assert_eq!(*data, [1, 2, 3, 4]);
    }

    #[test]
    #[serial]
    /// Tests to ensure permissions are actually set
    fn test_perms() {
        let ptr = READ_ONLY.as_ptr();
        let size = READ_ONLY.len();

        // the data is definitely read-only
        for region in region::query_range(ptr, size).unwrap() {
            let region = region.unwrap();
            assert!(!region.is_guarded());
            assert_eq!(region.protection(), Protection::READ);
        }
        assert!(!is_writable(ptr, size));

        let wrapper = PermissionWrapper::new(BytePatcher::new());
        let patch = unsafe { wrapper.patch(to_mut(ptr), &[4, 3, 2, 1]).unwrap() };

        assert_eq!(unsafe { slice::from_raw_parts(ptr, size) }, [4, 3, 2, 1]);

        // make sure permissions reverted correctly after the patch
        for region in region::query_range(ptr, size).unwrap() {
            assert_eq!(region.unwrap().protection(), Protection::READ);
        }

        patch.restore();

        assert_eq!(unsafe { slice::from_raw_parts(ptr, size) }, *b"1234");
        for region in region::query_range(ptr, size).unwrap() {
            assert_eq!(region.unwrap().protection(), Protection::READ);
        }
    }

    #[test]
    fn test_protection_queries() {
        let mut local = 5u64;
        assert!(is_writable(&mut local as *mut u64, 8));
        assert!(!is_executable(&local as *const u64));

        let f: fn() -> bool = test_target;
        assert!(is_executable(f as *const ()));
        assert!(!is_writable(f as *const (), 1));

        assert!(!is_writable(std::ptr::null::<u8>(), 1));
        assert!(!is_executable(std::ptr::null::<u8>()));
    }

    #[inline(never)]
    fn test_target() -> bool {
        true
    }
}
