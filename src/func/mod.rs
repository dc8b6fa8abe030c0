//! # Function pointers
//!
//! Traits over the function pointer shapes that can be redirected.
//!
//! Functions are handed to the crate as function pointers rather than function items, e.g.
//! `add as fn(i32, i32) -> i32` or `Counter::get as fn(&Counter) -> u32`. Methods are named by
//! their path, so a method that does not exist is a compile error rather than a runtime failure.
//!
//! [`MockFn`] and [`MockMethod`] additionally generate a trampoline with the exact signature of the
//! mocked function. Every trampoline is monomorphized over a key type, which makes its address
//! unique and lets it find the [`Mock`](crate::mock::Mock) it reports to.

// `fn(A)` and `for<'s> fn(&'s S)` are distinct types; rustc only warns that they might unify
#![allow(coherence_leak_check)]

use crate::mock::{binding::dispatch, CallArgs, Receiver};

/// A function pointer whose entry point can be redirected
///
/// # Safety
///
/// `addr` must return the entry point of the function the pointer calls
pub unsafe trait FnPtr: Copy + 'static {
    /// Entry point of the function
    fn addr(self) -> *const u8;
}

/// A function pointer whose first argument is a borrowed receiver, i.e. a method
///
/// # Safety
///
/// Same as [`FnPtr`]
pub unsafe trait MethodPtr: FnPtr {}

/// A free function that can be replaced by a call to the mock tracker
pub trait MockFn: FnPtr {
    /// Argument tuple forwarded to the tracker
    type Args: CallArgs;
    /// Value the tracker has to return
    type Output: Send + 'static;

    /// Returns a function with the signature of `Self` that forwards its arguments to the mock bound to `K`
    fn trampoline<K: 'static>() -> Self;
}

/// A method that can be replaced by a call to the mock tracker
///
/// The tracker sees the receiver's [`Receiver`] identity followed by the remaining arguments.
pub trait MockMethod: MethodPtr {
    /// Argument tuple forwarded to the tracker, starting with the receiver
    type Args: CallArgs;
    /// Value the tracker has to return
    type Output: Send + 'static;

    /// Returns a function with the signature of `Self` that forwards its arguments to the mock bound to `K`
    fn trampoline<K: 'static>() -> Self;
}

/// Implements the function traits for every pointer shape of one arity
macro_rules! impl_fn_traits {
    ($($arg:ident $val:ident),*) => {
        unsafe impl<R: 'static, $($arg: 'static),*> FnPtr for fn($($arg),*) -> R {
            fn addr(self) -> *const u8 {
                self as *const u8
            }
        }
        unsafe impl<R: 'static, $($arg: 'static),*> FnPtr for unsafe fn($($arg),*) -> R {
            fn addr(self) -> *const u8 {
                self as *const u8
            }
        }
        unsafe impl<R: 'static, $($arg: 'static),*> FnPtr for extern "C" fn($($arg),*) -> R {
            fn addr(self) -> *const u8 {
                self as *const u8
            }
        }
        unsafe impl<R: 'static, $($arg: 'static),*> FnPtr for unsafe extern "C" fn($($arg),*) -> R {
            fn addr(self) -> *const u8 {
                self as *const u8
            }
        }
        unsafe impl<S: ?Sized + 'static, R: 'static, $($arg: 'static),*> FnPtr for for<'s> fn(&'s S, $($arg),*) -> R {
            fn addr(self) -> *const u8 {
                self as *const u8
            }
        }
        unsafe impl<S: ?Sized + 'static, R: 'static, $($arg: 'static),*> FnPtr for for<'s> fn(&'s mut S, $($arg),*) -> R {
            fn addr(self) -> *const u8 {
                self as *const u8
            }
        }
        unsafe impl<S: ?Sized + 'static, R: 'static, $($arg: 'static),*> MethodPtr for for<'s> fn(&'s S, $($arg),*) -> R {}
        unsafe impl<S: ?Sized + 'static, R: 'static, $($arg: 'static),*> MethodPtr for for<'s> fn(&'s mut S, $($arg),*) -> R {}

        impl<R, $($arg),*> MockFn for fn($($arg),*) -> R
        where
            R: Send + 'static,
            $($arg: 'static,)*
            ($($arg,)*): CallArgs,
        {
            type Args = ($($arg,)*);
            type Output = R;

            fn trampoline<K: 'static>() -> Self {
                fn trampoline<K: 'static, R: Send + 'static, $($arg),*>($($val: $arg),*) -> R
                where
                    ($($arg,)*): CallArgs,
                {
                    dispatch::<K, ($($arg,)*), R>(($($val,)*))
                }
                trampoline::<K, R, $($arg),*>
            }
        }

        impl<S, R, $($arg),*> MockMethod for for<'s> fn(&'s S, $($arg),*) -> R
        where
            S: ?Sized + 'static,
            R: Send + 'static,
            $($arg: 'static,)*
            (Receiver<S>, $($arg,)*): CallArgs,
        {
            type Args = (Receiver<S>, $($arg,)*);
            type Output = R;

            fn trampoline<K: 'static>() -> Self {
                fn trampoline<K: 'static, S: ?Sized + 'static, R: Send + 'static, $($arg),*>(receiver: &S, $($val: $arg),*) -> R
                where
                    (Receiver<S>, $($arg,)*): CallArgs,
                {
                    dispatch::<K, (Receiver<S>, $($arg,)*), R>((Receiver::of(receiver), $($val,)*))
                }
                trampoline::<K, S, R, $($arg),*>
            }
        }

        impl<S, R, $($arg),*> MockMethod for for<'s> fn(&'s mut S, $($arg),*) -> R
        where
            S: ?Sized + 'static,
            R: Send + 'static,
            $($arg: 'static,)*
            (Receiver<S>, $($arg,)*): CallArgs,
        {
            type Args = (Receiver<S>, $($arg,)*);
            type Output = R;

            fn trampoline<K: 'static>() -> Self {
                fn trampoline<K: 'static, S: ?Sized + 'static, R: Send + 'static, $($arg),*>(receiver: &mut S, $($val: $arg),*) -> R
                where
                    (Receiver<S>, $($arg,)*): CallArgs,
                {
                    dispatch::<K, (Receiver<S>, $($arg,)*), R>((Receiver::of(&*receiver), $($val,)*))
                }
                trampoline::<K, S, R, $($arg),*>
            }
        }
    };
}

impl_fn_traits!();
impl_fn_traits!(A a);
impl_fn_traits!(A a, B b);
impl_fn_traits!(A a, B b, C c);
impl_fn_traits!(A a, B b, C c, D d);
impl_fn_traits!(A a, B b, C c, D d, E e);
impl_fn_traits!(A a, B b, C c, D d, E e, F f);
