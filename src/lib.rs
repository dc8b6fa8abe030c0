#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod code;
pub mod func;
pub mod helper;
pub mod hook;
pub mod mock;
pub mod patcher;
pub mod value;

pub use helper::Test;
pub use mock::{Mock, Receiver};

/// Mocks a free function on a [`Test`], declaring the unique key the trampoline needs.
///
/// Expands to a call of [`Test::mock_func`], so it has to be used inside an `unsafe` block.
///
/// ```
/// use std::hint::black_box;
///
/// #[inline(never)]
/// fn fetch(id: u32) -> String {
///     format!("row {}", black_box(id))
/// }
///
/// let mut t = libstub::Test::new();
/// unsafe { libstub::mock_func!(t, "Fetch", fetch as fn(u32) -> String) };
/// t.on("Fetch", (1u32,)).returns(String::from("mocked")).once();
///
/// assert_eq!(black_box(fetch as fn(u32) -> String)(1), "mocked");
/// t.assert_expectations();
/// ```
#[macro_export]
macro_rules! mock_func {
    ($test:expr, $method:expr, $target:expr $(,)?) => {{
        enum MockKey {}
        $test.mock_func::<MockKey, _>($method, $target)
    }};
}

/// Mocks a method on a [`Test`], declaring the unique key the trampoline needs.
///
/// Expands to a call of [`Test::mock_method`], so it has to be used inside an `unsafe` block.
/// The recorded arguments start with the [`Receiver`] the method was called on.
///
/// ```
/// use std::hint::black_box;
///
/// use libstub::Receiver;
///
/// struct Account {
///     id: u32,
/// }
///
/// impl Account {
///     #[inline(never)]
///     fn balance(&self, month: u32) -> u32 {
///         black_box(self.id) * 1000 + black_box(month)
///     }
/// }
///
/// let (alice, bob) = (Account { id: 1 }, Account { id: 2 });
/// let mut t = libstub::Test::new();
/// unsafe { libstub::mock_method!(t, "Balance", Account::balance as fn(&Account, u32) -> u32) };
/// t.on("Balance", (Receiver::of(&alice), 3u32)).returns(100u32);
/// t.on("Balance", (Receiver::of(&bob), 3u32)).returns(5u32);
///
/// let balance = black_box(Account::balance as fn(&Account, u32) -> u32);
/// assert_eq!(balance(&alice, 3), 100);
/// assert_eq!(balance(&bob, 3), 5);
/// t.assert_expectations();
/// ```
#[macro_export]
macro_rules! mock_method {
    ($test:expr, $method:expr, $target:expr $(,)?) => {{
        enum MockKey {}
        $test.mock_method::<MockKey, _>($method, $target)
    }};
}
