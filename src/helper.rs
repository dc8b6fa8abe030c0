//! # Test helper
//!
//! [`Test`] ties the value patches, the hook table and a [`Mock`] together for the length of one test.
//!
//! Everything a [`Test`] changes is reverted when it is closed or dropped, so a failing assertion
//! still leaves the process as it found it:
//!
//! ```
//! use std::hint::black_box;
//!
//! #[inline(never)]
//! fn greet(name: &str) -> String {
//!     format!("hello {}", black_box(name))
//! }
//!
//! #[inline(never)]
//! fn greet_loudly(name: &str) -> String {
//!     format!("HELLO {}!", black_box(name).to_uppercase())
//! }
//!
//! let mut t = libstub::Test::new();
//! unsafe {
//!     t.stub_func(
//!         greet as fn(&str) -> String,
//!         greet_loudly as fn(&str) -> String,
//!     )
//! };
//! assert_eq!(black_box(greet as fn(&str) -> String)("bob"), "HELLO BOB!");
//!
//! t.close();
//! assert_eq!(black_box(greet as fn(&str) -> String)("bob"), "hello bob");
//! ```
//!
//! The hook table and the mock bindings are shared by the whole process, and closing any
//! [`Test`] reverts every redirect. Tests using this helper must not run in parallel with each other.

use std::any::type_name;
use std::ops::Deref;

use tracing::{debug, warn};

use crate::func::{FnPtr, MethodPtr, MockFn, MockMethod};
use crate::hook::table;
use crate::mock::{binding, Mock};
use crate::value::ValuePatches;

/// Patches, stubs and mocks for one test, reverted on [`close`](Test::close) or drop.
///
/// Dereferences to its [`Mock`], which answers the calls of every function mocked through it.
#[derive(Default)]
pub struct Test {
    /// Tracker for mocked functions
    mock: Mock,
    /// Originals of patched values
    values: ValuePatches,
}

impl Test {
    /// Creates a helper with nothing patched
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites `*target` with `replace` until teardown.
    ///
    /// Patching the same location again only changes the value; teardown restores the value that
    /// was there before the first patch.
    ///
    /// ```
    /// static mut DEBUG: bool = false;
    ///
    /// let mut t = libstub::Test::new();
    /// unsafe {
    ///     t.patch_value(std::ptr::addr_of_mut!(DEBUG), true);
    ///     assert!(DEBUG);
    /// }
    /// t.close();
    /// assert!(!unsafe { DEBUG });
    /// ```
    ///
    /// # Safety
    ///
    /// - `target` must stay valid for reads and writes of `T` until teardown
    /// - nothing may hold a reference to `*target` while it is patched or restored
    ///
    /// # Panics
    ///
    /// Panics if `target` is not writable memory.
    pub unsafe fn patch_value<T: 'static>(&mut self, target: *mut T, replace: T) {
        self.values
            .patch(target, replace)
            .unwrap_or_else(|e| panic!("{e}"));
    }

    /// Redirects every call of `target` to `replacement` until teardown
    ///
    /// # Safety
    ///
    /// - `target` must not be inlined at the call sites that should see the stub (`#[inline(never)]`)
    /// - `target` must be at least [`JMP_ABS_LEN`](crate::code::x64::JMP_ABS_LEN) bytes of code long
    /// - no other thread may be running `target` while it is redirected or restored
    ///
    /// # Panics
    ///
    /// Panics if `target` does not point to code, or if `target` and `replacement` are the same function.
    pub unsafe fn stub_func<F: FnPtr>(&mut self, target: F, replacement: F) {
        redirect::<F>(target.addr(), replacement.addr());
    }

    /// Redirects every call of the method `target` to `replacement` until teardown.
    ///
    /// The method is named by its path, e.g. `Dialer::dial as fn(&Dialer, &str) -> Conn`.
    ///
    /// # Safety
    ///
    /// Same as [`stub_func`](Self::stub_func)
    ///
    /// # Panics
    ///
    /// Same as [`stub_func`](Self::stub_func)
    pub unsafe fn stub_method<F: MethodPtr>(&mut self, target: F, replacement: F) {
        redirect::<F>(target.addr(), replacement.addr());
    }

    /// Redirects every call of `target` to this helper's [`Mock`], recorded as `method` until teardown.
    ///
    /// `K` must be a type used for no other mock; the [`mock_func!`](crate::mock_func) macro declares one.
    /// The arguments are forwarded as a tuple and the mock's answer is returned.
    ///
    /// # Safety
    ///
    /// Same as [`stub_func`](Self::stub_func)
    ///
    /// # Panics
    ///
    /// Same as [`stub_func`](Self::stub_func). Calls the mock has no expectation for panic in the caller.
    pub unsafe fn mock_func<K: 'static, F: MockFn>(&mut self, method: &str, target: F) {
        binding::bind::<K>(&self.mock, method);
        redirect::<F>(target.addr(), F::trampoline::<K>().addr());
    }

    /// Redirects every call of the method `target` to this helper's [`Mock`], recorded as `method`.
    ///
    /// The receiver is forwarded as a [`Receiver`](crate::mock::Receiver) in front of the other
    /// arguments, so expectations are registered as `(Receiver::of(&value), args..)`.
    /// `K` must be a type used for no other mock; the [`mock_method!`](crate::mock_method) macro declares one.
    ///
    /// # Safety
    ///
    /// Same as [`stub_func`](Self::stub_func)
    ///
    /// # Panics
    ///
    /// Same as [`mock_func`](Self::mock_func)
    pub unsafe fn mock_method<K: 'static, F: MockMethod>(&mut self, method: &str, target: F) {
        binding::bind::<K>(&self.mock, method);
        redirect::<F>(target.addr(), F::trampoline::<K>().addr());
    }

    /// Reverts every redirect in the process and restores every value patched through this helper
    pub fn close(self) {
        // teardown runs in `Drop`
        drop(self);
    }

    /// Shared by [`close`](Self::close) and [`Drop`]
    fn teardown(&mut self) {
        if std::thread::panicking() {
            warn!("test is unwinding, reverting patches");
        }
        table::unpatch_all();
        binding::unbind_all();
        // SAFETY: `patch_value` requires its targets to live until teardown
        unsafe { self.values.restore_all() };
        debug!("test helper closed");
    }
}

impl Drop for Test {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Deref for Test {
    type Target = Mock;

    fn deref(&self) -> &Mock {
        &self.mock
    }
}

/// Writes the redirect through the hook table, panicking on failure
///
/// # Safety
///
/// See [`table::patch`]
unsafe fn redirect<F>(target: *const u8, replacement: *const u8) {
    table::patch(target, replacement, type_name::<F>()).unwrap_or_else(|e| panic!("{e}"));
}

#[cfg(test)]
mod tests {
    use std::hint::black_box;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::ptr::addr_of_mut;

    use serial_test::serial;

    use crate::hook::table::is_patched;
    use crate::mock::matcher::function;
    use crate::mock::Receiver;
    use crate::{mock_func, mock_method};

    use super::Test;

    static mut VERBOSE: bool = false;
    static mut LIMIT: u32 = 10;
    static READ_ONLY: u32 = 3;

    struct Adder {
        base: i64,
    }

    impl Adder {
        #[inline(never)]
        fn add(&self, value: i64) -> i64 {
            black_box(self.base).wrapping_add(black_box(value))
        }

        #[inline(never)]
        fn reset(&mut self, value: i64) -> i64 {
            let previous = black_box(self.base);
            self.base = black_box(value);
            previous
        }
    }

    #[inline(never)]
    fn add_one(value: i64) -> i64 {
        let adder = Adder { base: black_box(1) };
        adder.add(value)
    }

    #[inline(never)]
    fn add_hundred(value: i64) -> i64 {
        black_box(value).wrapping_add(black_box(100))
    }

    #[inline(never)]
    fn label(id: u32, name: String) -> String {
        format!("{}:{}", black_box(id), black_box(name))
    }

    fn add_one_ptr() -> fn(i64) -> i64 {
        black_box(add_one as fn(i64) -> i64)
    }

    #[test]
    #[serial]
    fn test_patch_value() {
        let mut value = 1;

        let mut t = Test::new();
        unsafe { t.patch_value(addr_of_mut!(value), 2) };
        assert_eq!(value, 2);

        t.close();
        assert_eq!(value, 1);
    }

    #[test]
    #[serial]
    fn test_patch_static_restores_first_original() {
        let mut t = Test::new();
        unsafe {
            t.patch_value(addr_of_mut!(LIMIT), 20);
            t.patch_value(addr_of_mut!(LIMIT), 30);
            t.patch_value(addr_of_mut!(VERBOSE), true);
            assert_eq!((LIMIT, VERBOSE), (30, true));
        }
        drop(t);
        assert_eq!(unsafe { (LIMIT, VERBOSE) }, (10, false));
    }

    #[test]
    #[serial]
    #[should_panic(expected = "target has to be a writable location")]
    fn test_patch_value_rejects_read_only() {
        let mut t = Test::new();
        unsafe { t.patch_value(&READ_ONLY as *const u32 as *mut u32, 4) };
    }

    #[test]
    #[serial]
    fn test_stub_func() {
        let mut t = Test::new();
        unsafe { t.stub_func(add_one as fn(i64) -> i64, add_hundred as fn(i64) -> i64) };
        assert_eq!(add_one_ptr()(1), 101);
        assert!(is_patched(add_one as *const u8));

        t.close();
        assert_eq!(add_one_ptr()(1), 2);
        assert!(!is_patched(add_one as *const u8));
    }

    #[test]
    #[serial]
    fn test_stub_method() {
        #[inline(never)]
        fn add_plus_one(adder: &Adder, value: i64) -> i64 {
            black_box(adder.base) + black_box(value) + 1
        }

        let adder = Adder { base: 1 };
        let mut t = Test::new();
        unsafe {
            t.stub_method(
                Adder::add as fn(&Adder, i64) -> i64,
                add_plus_one as fn(&Adder, i64) -> i64,
            )
        };
        let add = black_box(Adder::add as fn(&Adder, i64) -> i64);
        assert_eq!(add(&adder, 1), 3);

        t.close();
        assert_eq!(add(&adder, 1), 2);
    }

    #[test]
    #[serial]
    #[should_panic(expected = "cannot redirect the function at")]
    fn test_stub_to_itself_panics() {
        let mut t = Test::new();
        unsafe { t.stub_func(add_one as fn(i64) -> i64, add_one as fn(i64) -> i64) };
    }

    #[test]
    #[serial]
    fn test_mock_func() {
        let mut t = Test::new();
        unsafe { mock_func!(t, "AddOne", add_one as fn(i64) -> i64) };
        t.on("AddOne", (1i64,)).returns(2i64).once();

        assert_eq!(add_one_ptr()(1), 2);

        t.assert_expectations();
        t.assert_called("AddOne", (1i64,));
    }

    #[test]
    #[serial]
    fn test_mock_func_with_owned_arguments() {
        let mut t = Test::new();
        unsafe { mock_func!(t, "Label", label as fn(u32, String) -> String) };
        t.on("Label", (7u32, "seven".to_owned()))
            .returning(|(id, name): (u32, String)| format!("{name}#{id}"));

        let label = black_box(label as fn(u32, String) -> String);
        assert_eq!(label(7, "seven".to_owned()), "seven#7");
        t.assert_number_of_calls("Label", 1);
    }

    #[test]
    #[serial]
    fn test_mock_method() {
        let mut t = Test::new();
        unsafe { mock_method!(t, "Add", Adder::add as fn(&Adder, i64) -> i64) };
        let value_is_one = function(|(_, value): &(Receiver<Adder>, i64)| *value == 1);
        t.on_with::<(Receiver<Adder>, i64), _>("Add", value_is_one)
            .returns(2i64);

        // `add_one` reaches the mocked method through an adder of its own
        assert_eq!(add_one_ptr()(1), 2);
        t.assert_expectations();
    }

    #[test]
    #[serial]
    fn test_mock_method_tells_receivers_apart() {
        let mut t = Test::new();
        unsafe { mock_method!(t, "Add", Adder::add as fn(&Adder, i64) -> i64) };
        let (first, second) = (Adder { base: 1 }, Adder { base: 1 });
        t.on("Add", (Receiver::of(&first), 1i64)).returns(100i64).once();
        t.on("Add", (Receiver::of(&second), 1i64)).returns(200i64).once();

        let add = black_box(Adder::add as fn(&Adder, i64) -> i64);
        assert_eq!(add(&second, 1), 200);
        assert_eq!(add(&first, 1), 100);

        t.assert_expectations();
        t.assert_called("Add", (Receiver::of(&first), 1i64));
    }

    #[test]
    #[serial]
    fn test_mock_method_with_mutable_receiver() {
        let mut t = Test::new();
        unsafe { mock_method!(t, "Reset", Adder::reset as fn(&mut Adder, i64) -> i64) };
        let mut adder = Adder { base: 5 };
        t.on("Reset", (Receiver::of(&adder), 9i64)).returns(-1i64).maybe();

        let reset = black_box(Adder::reset as fn(&mut Adder, i64) -> i64);
        assert_eq!(reset(&mut adder, 9), -1);
        assert_eq!(adder.base, 5);

        t.close();
        assert_eq!(reset(&mut adder, 9), 5);
        assert_eq!(adder.base, 9);
    }

    #[test]
    #[serial]
    /// A failing test body must still leave nothing patched behind
    fn test_drop_reverts_while_unwinding() {
        let mut value = 1u8;
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut t = Test::new();
            unsafe {
                t.patch_value(addr_of_mut!(value), 2);
                mock_func!(t, "AddOne", add_one as fn(i64) -> i64);
            }
            // no expectation registered, the call panics
            add_one_ptr()(1)
        }));

        assert!(result.is_err());
        assert_eq!(value, 1);
        assert_eq!(add_one_ptr()(1), 2);
    }

    #[test]
    #[serial]
    #[should_panic(expected = "mock: AddOne(0,) was called from the returning closure answering it")]
    /// A mocked recursive function cannot answer itself, the call panics instead of hanging
    fn test_mocked_function_reentering_its_expectation_panics() {
        let mut t = Test::new();
        unsafe { mock_func!(t, "AddOne", add_one as fn(i64) -> i64) };
        t.on_any::<(i64,)>("AddOne")
            .returning(|(value,): (i64,)| if value == 0 { 1 } else { add_one_ptr()(value - 1) + 1 });

        add_one_ptr()(1);
    }

    #[test]
    #[serial]
    #[should_panic(expected = "mock: I don't know what to return because the method call was unexpected: AddOne(5,)")]
    fn test_unexpected_mock_call_panics() {
        let mut t = Test::new();
        unsafe { mock_func!(t, "AddOne", add_one as fn(i64) -> i64) };
        add_one_ptr()(5);
    }
}
