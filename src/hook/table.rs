//! # Hook Table
//!
//! Process-wide record of every redirected function.
//!
//! The table owns the guard of each active hook, keyed by the address of the hooked function.
//! Hooking a function that is already hooked reverts the previous hook first, so the bytes saved by
//! the table are always the function's original prologue.
//!
//! The table is global mutable state. Its lock keeps the table itself consistent, but two tests
//! redirecting the same function at the same time still race; tests that use it must run serially.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use thiserror::Error;
use tracing::debug;

use crate::patcher::byte::{BytePatchGuard, BytePatcher};
use crate::patcher::mem::{is_executable, PermissionError, PermissionWrapper, PermissionWrapperGuard};

use super::jmphook::{JmpHook, JmpHookGuard};

/// Concrete hook used for every table entry
type TableHook = JmpHook<PermissionWrapper<BytePatcher>>;
/// Guard stored for every table entry
type TableGuard = JmpHookGuard<PermissionWrapperGuard<BytePatchGuard>>;

/// Errors that can occur when redirecting a function
#[derive(Debug, Error)]
pub enum StubError {
    /// The target does not point into executable memory
    #[error("must be a function, `{type_name}` at {address:#x} is not executable")]
    NotExecutable {
        /// Name of the pointer type that was supplied
        type_name: &'static str,
        /// Address that was supplied
        address: usize,
    },
    /// The target and the replacement are the same function
    #[error("cannot redirect the function at {0:#x} to itself")]
    SelfRedirect(usize),
    /// Failure while writing the redirect
    #[error(transparent)]
    Permission(#[from] PermissionError<Infallible>),
}

/// Hook shared by every entry. Holding it in a static gives the guards a `'static` lifetime.
static HOOK: TableHook = JmpHook::new(PermissionWrapper::new(BytePatcher::new()));

lazy_static! {
    /// Active hooks, keyed by the address of the hooked function
    static ref TABLE: Mutex<HashMap<usize, TableGuard>> = Mutex::new(HashMap::new());
}

/// Locks the table, ignoring poisoning left behind by a panicking test
fn table() -> MutexGuard<'static, HashMap<usize, TableGuard>> {
    TABLE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Redirects every call of `target` to `replacement` until [`unpatch`] or [`unpatch_all`].
///
/// `type_name` only decorates the error returned for a non-executable target.
///
/// # Safety
///
/// - `target` must be the entry point of a function at least [`JMP_ABS_LEN`](crate::code::x64::JMP_ABS_LEN) bytes long
/// - `replacement` must be a function with the same signature and calling convention as `target`
/// - no thread may be executing the first bytes of `target` while it is being patched
pub unsafe fn patch(
    target: *const u8,
    replacement: *const u8,
    type_name: &'static str,
) -> Result<(), StubError> {
    let address = target as usize;
    if !is_executable(target) {
        return Err(StubError::NotExecutable { type_name, address });
    }
    if target == replacement {
        return Err(StubError::SelfRedirect(address));
    }

    let mut table = table();
    if let Some(previous) = table.remove(&address) {
        debug!(address = format_args!("{address:#x}"), "reverting previous redirect");
        previous.unhook();
    }
    let guard = HOOK.hook(target, replacement)?;
    table.insert(address, guard);
    debug!(
        address = format_args!("{address:#x}"),
        replacement = format_args!("{:#x}", replacement as usize),
        "redirected function"
    );
    Ok(())
}

/// Reverts the redirect of `target`, returning whether it was redirected
pub fn unpatch(target: *const u8) -> bool {
    let removed = table().remove(&(target as usize));
    match removed {
        Some(guard) => {
            guard.unhook();
            debug!(address = format_args!("{:#x}", target as usize), "reverted redirect");
            true
        }
        None => false,
    }
}

/// Reverts every redirect in the process
pub fn unpatch_all() {
    let mut table = table();
    let count = table.len();
    for (_, guard) in table.drain() {
        guard.unhook();
    }
    if count > 0 {
        debug!(count, "reverted all redirects");
    }
}

/// Checks whether `target` is currently redirected
pub fn is_patched(target: *const u8) -> bool {
    table().contains_key(&(target as usize))
}
