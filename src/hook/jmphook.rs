//! # Jump Hook
//!
//! Redirects a function by overwriting its entry point with an absolute `jmp` to another one.
//! The overwritten prologue is never executed elsewhere, so the hooked function cannot be called
//! through the hook; it runs again once the hook is reverted.

use crate::{
    code::x64::jmp_abs,
    patcher::{PatchGuard, Patcher},
};

/// Writes absolute `jmp` redirects through a [`Patcher`]
pub struct JmpHook<P> {
    /// Patcher writing the `jmp`
    patcher: P,
}

impl<P: Patcher> JmpHook<P> {
    /// Creates a jmp hook writing through `patcher`
    pub const fn new(patcher: P) -> Self {
        Self { patcher }
    }

    /// Redirects `source` to `destination` until the returned guard is dropped or unhooked.
    ///
    /// # Safety
    ///
    /// - `source` must be the entry point of a function at least [`JMP_ABS_LEN`](crate::code::x64::JMP_ABS_LEN) bytes long
    /// - `destination` must be a function with the same signature and calling convention as `source`
    /// - the patcher's own requirements apply to `source`
    pub unsafe fn hook(
        &self,
        source: *const u8,
        destination: *const u8,
    ) -> Result<JmpHookGuard<P::Guard<'_>>, P::Error> {
        let guard = self
            .patcher
            .patch(source as *mut u8, &jmp_abs(destination as usize))?;
        Ok(JmpHookGuard { guard })
    }
}

/// An active jmp redirect, reverted on drop
pub struct JmpHookGuard<G: PatchGuard> {
    /// Guard of the written `jmp`
    guard: G,
}

impl<G: PatchGuard> JmpHookGuard<G> {
    /// Guard of the written `jmp`, e.g. to look at the bytes it replaced
    pub fn patch(&self) -> &G {
        &self.guard
    }

    /// Reverts the redirect now rather than when the guard goes out of scope
    pub fn unhook(self) {
        self.guard.restore();
    }
}
