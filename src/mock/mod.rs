//! # Mock
//!
//! Call-expectation tracker.
//!
//! A [`Mock`] records which calls are expected and what they return, answers calls as they happen,
//! and checks afterwards that every expectation was met:
//!
//! ```
//! use libstub::mock::Mock;
//!
//! let mock = Mock::new();
//! mock.on("Add", (1, 2)).returns(3).once();
//!
//! let sum: i32 = mock.method_called("Add", (1, 2));
//! assert_eq!(sum, 3);
//! mock.assert_expectations();
//! ```
//!
//! Arguments are always passed as a tuple, `()` for a call without arguments. An expectation only
//! answers calls whose argument tuple and return type are exactly the ones it was registered with.

pub(crate) mod binding;
mod expectation;
pub mod matcher;
mod receiver;

use std::any::{type_name, Any};
use std::fmt::{Debug, Write};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use self::expectation::{Expectation, Rfunc, Times};
use self::matcher::{any, eq, Matcher};

pub use self::receiver::Receiver;

/// Argument tuples the tracker can record
pub trait CallArgs: Clone + Debug + Send + 'static {}
impl<T: Clone + Debug + Send + 'static> CallArgs for T {}

/// A call that reached the tracker
struct CallRecord {
    /// Method that was called
    method: String,
    /// Argument tuple of the call
    args: Box<dyn Any + Send>,
    /// `Debug` rendering of `args`
    rendered: String,
}

/// Expectations and calls of one tracker
#[derive(Default)]
struct State {
    /// Expectations, in registration order
    expectations: Vec<Expectation>,
    /// Calls answered so far, in call order
    calls: Vec<CallRecord>,
}

/// Call-expectation tracker. Clones share the same expectations and calls.
#[derive(Clone, Default)]
pub struct Mock {
    /// Shared state
    state: Arc<Mutex<State>>,
}

impl Mock {
    /// Creates a tracker with no expectations
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, ignoring poisoning left behind by a failed assertion
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts an expectation for `method` called with exactly `args`
    pub fn on<I>(&self, method: &str, args: I) -> OnCall<'_, I>
    where
        I: CallArgs + PartialEq,
    {
        self.on_with(method, eq(args))
    }

    /// Starts an expectation for `method` called with any arguments of type `I`
    pub fn on_any<I: CallArgs>(&self, method: &str) -> OnCall<'_, I> {
        self.on_with(method, any())
    }

    /// Starts an expectation for `method` called with arguments accepted by `matcher`
    pub fn on_with<I, M>(&self, method: &str, matcher: M) -> OnCall<'_, I>
    where
        I: CallArgs,
        M: Matcher<I> + 'static,
    {
        OnCall {
            mock: self,
            method: method.to_owned(),
            matcher: Box::new(matcher),
            _args: PhantomData,
        }
    }

    /// Records a call of `method` and returns the value of the first expectation that answers it.
    ///
    /// Expectations are tried in registration order; one registered with [`Call::times`] stops
    /// answering once its calls are used up.
    ///
    /// # Panics
    ///
    /// Panics if no expectation answers the call.
    pub fn method_called<I, O>(&self, method: &str, args: I) -> O
    where
        I: CallArgs,
        O: Send + 'static,
    {
        let rendered = format!("{args:?}");
        let rfunc = {
            let mut state = self.lock();
            let found = state
                .expectations
                .iter_mut()
                .find(|e| e.method == method && !e.exhausted() && e.accepts::<I, O>(&args))
                .and_then(|e| e.take_call::<I, O>());
            match found {
                Some(rfunc) => {
                    state.calls.push(CallRecord {
                        method: method.to_owned(),
                        args: Box::new(args.clone()),
                        rendered: rendered.clone(),
                    });
                    Ok(rfunc)
                }
                None => Err(unexpected_call::<I, O>(&state, method, &args)),
            }
        };
        let rfunc = rfunc.unwrap_or_else(|message| panic!("{message}"));

        trace!(method, args = %rendered, "mocked call");
        rfunc.produce(args).unwrap_or_else(|| {
            panic!(
                "mock: {method}{rendered} was called from the returning closure answering it\n\
                 \tthe closure cannot answer its own calls, register another expectation for the inner call"
            )
        })
    }

    /// Whether every mandatory expectation has been met
    pub fn expectations_met(&self) -> bool {
        self.lock().expectations.iter().all(Expectation::satisfied)
    }

    /// Asserts that every mandatory expectation has been met
    ///
    /// # Panics
    ///
    /// Panics listing the unmet expectations.
    pub fn assert_expectations(&self) {
        let state = self.lock();
        let unmet: Vec<String> = state
            .expectations
            .iter()
            .filter(|e| !e.satisfied())
            .map(Expectation::describe)
            .collect();
        drop(state);
        if !unmet.is_empty() {
            panic!(
                "mock: {} expectation(s) were not met:\n\t{}",
                unmet.len(),
                unmet.join("\n\t")
            );
        }
    }

    /// Number of calls of `method` answered so far
    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.method == method).count()
    }

    /// Whether `method` has been called with exactly `args`
    pub fn was_called<I: CallArgs + PartialEq>(&self, method: &str, args: &I) -> bool {
        self.lock().calls.iter().any(|c| {
            c.method == method && c.args.downcast_ref::<I>().map_or(false, |a| a == args)
        })
    }

    /// Asserts that `method` has been called with exactly `args`
    ///
    /// # Panics
    ///
    /// Panics listing the calls that were made.
    pub fn assert_called<I: CallArgs + PartialEq>(&self, method: &str, args: I) {
        if !self.was_called(method, &args) {
            panic!(
                "mock: expected a call to {method}{args:?}, calls made:\n\t{}",
                self.rendered_calls()
            );
        }
    }

    /// Asserts that `method` has never been called with exactly `args`
    ///
    /// # Panics
    ///
    /// Panics if such a call was made.
    pub fn assert_not_called<I: CallArgs + PartialEq>(&self, method: &str, args: I) {
        if self.was_called(method, &args) {
            panic!("mock: unexpected call to {method}{args:?} was made");
        }
    }

    /// Asserts that `method` has been called exactly `expected` times
    ///
    /// # Panics
    ///
    /// Panics with the actual number of calls.
    pub fn assert_number_of_calls(&self, method: &str, expected: usize) {
        let actual = self.call_count(method);
        if actual != expected {
            panic!("mock: expected {method} to be called {expected} times, was called {actual} times");
        }
    }

    /// Every call made so far, one per line
    fn rendered_calls(&self) -> String {
        let state = self.lock();
        if state.calls.is_empty() {
            return "(none)".to_owned();
        }
        state
            .calls
            .iter()
            .map(|c| format!("{}{}", c.method, c.rendered))
            .collect::<Vec<_>>()
            .join("\n\t")
    }
}

/// Builds the panic message for a call no expectation answers
fn unexpected_call<I: CallArgs, O: 'static>(state: &State, method: &str, args: &I) -> String {
    let candidates: Vec<&Expectation> = state
        .expectations
        .iter()
        .filter(|e| e.method == method)
        .collect();

    if candidates.is_empty() {
        return format!(
            "mock: I don't know what to return because the method call was unexpected: {method}{args:?}\n\
             \tregister it first with on(\"{method}\", ..), or remove the call"
        );
    }

    let used_up: Vec<&&Expectation> = candidates
        .iter()
        .filter(|e| e.exhausted() && e.accepts::<I, O>(args))
        .collect();
    if let Some(e) = used_up.first() {
        return format!(
            "mock: The method has been called over {} times: {method}{args:?}\n\
             \teither register one more call with on(\"{method}\", ..), or remove the extra call",
            e.calls
        );
    }

    let mut message = format!(
        "mock: Unexpected Method Call\n\n\t{method}{args:?}: {} -> {}\n\nThe closest calls I have are:\n",
        type_name::<I>(),
        type_name::<O>()
    );
    for e in candidates {
        let _ = write!(message, "\n\t{}", e.describe());
    }
    message
}

/// Expectation being registered, waiting for its return value
pub struct OnCall<'m, I> {
    /// Tracker the expectation is registered on
    mock: &'m Mock,
    /// Expected method
    method: String,
    /// Expected arguments
    matcher: Box<dyn Matcher<I>>,
    /// Argument tuple type
    _args: PhantomData<fn(I)>,
}

impl<'m, I: CallArgs> OnCall<'m, I> {
    /// Answers matching calls with a clone of `value`
    pub fn returns<O>(self, value: O) -> Call
    where
        O: Clone + Send + 'static,
    {
        self.register(Box::new(move |_| value.clone()))
    }

    /// Answers matching calls with `O::default()`
    pub fn returns_default<O>(self) -> Call
    where
        O: Default + Send + 'static,
    {
        self.register(Box::new(|_| O::default()))
    }

    /// Answers matching calls by running `f` on their arguments
    pub fn returning<O, F>(self, f: F) -> Call
    where
        O: Send + 'static,
        F: FnMut(I) -> O + Send + 'static,
    {
        self.register(Box::new(f))
    }

    /// Stores the expectation on the tracker
    fn register<O: Send + 'static>(self, rfunc: Rfunc<I, O>) -> Call {
        let expectation = Expectation::new(self.method, BoxedMatcher(self.matcher), rfunc);
        let mut state = self.mock.lock();
        state.expectations.push(expectation);
        Call {
            mock: self.mock.clone(),
            index: state.expectations.len() - 1,
        }
    }
}

/// Lets a boxed matcher be stored where a sized one is expected
struct BoxedMatcher<I>(Box<dyn Matcher<I>>);

impl<I> Matcher<I> for BoxedMatcher<I> {
    fn matches(&self, args: &I) -> bool {
        self.0.matches(args)
    }

    fn describe(&self) -> String {
        self.0.describe()
    }
}

/// Handle on a registered expectation, to adjust how often it may be used
pub struct Call {
    /// Tracker holding the expectation
    mock: Mock,
    /// Position of the expectation
    index: usize,
}

impl Call {
    /// Runs `f` on the expectation
    fn update(self, f: impl FnOnce(&mut Expectation)) -> Self {
        if let Some(e) = self.mock.lock().expectations.get_mut(self.index) {
            f(e);
        }
        self
    }

    /// Expects exactly one call
    pub fn once(self) -> Self {
        self.times(1)
    }

    /// Expects exactly two calls
    pub fn twice(self) -> Self {
        self.times(2)
    }

    /// Expects exactly `n` calls; further calls fall through to later expectations
    pub fn times(self, n: usize) -> Self {
        self.update(|e| e.times = Times::Exactly(n))
    }

    /// Makes the expectation optional, so [`Mock::assert_expectations`] ignores it
    pub fn maybe(self) -> Self {
        self.update(|e| e.optional = true)
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::matcher::function;

    use super::Mock;

    #[test]
    fn test_returns_registered_value() {
        let mock = Mock::new();
        mock.on("Add", (1, 2)).returns(3);
        mock.on("Add", (2, 2)).returns(5);

        assert_eq!(mock.method_called::<_, i32>("Add", (2, 2)), 5);
        assert_eq!(mock.method_called::<_, i32>("Add", (1, 2)), 3);
        assert!(mock.expectations_met());
        mock.assert_expectations();
        mock.assert_called("Add", (1, 2));
        mock.assert_not_called("Add", (3, 3));
        mock.assert_number_of_calls("Add", 2);
    }

    #[test]
    fn test_times_falls_through() {
        let mock = Mock::new();
        mock.on("Next", ()).returns(1u8).once();
        mock.on("Next", ()).returns(2u8);

        let values: Vec<u8> = (0..3).map(|_| mock.method_called("Next", ())).collect();
        assert_eq!(values, [1, 2, 2]);
        assert_eq!(mock.call_count("Next"), 3);
    }

    #[test]
    #[should_panic(expected = "mock: The method has been called over 2 times")]
    fn test_used_up_expectation_panics() {
        let mock = Mock::new();
        mock.on("Next", ()).returns(1u8).twice();

        for _ in 0..3 {
            let _: u8 = mock.method_called("Next", ());
        }
    }

    #[test]
    #[should_panic(expected = "mock: I don't know what to return because the method call was unexpected: Get(7,)")]
    fn test_unknown_method_panics() {
        let mock = Mock::new();
        let _: String = mock.method_called("Get", (7,));
    }

    #[test]
    #[should_panic(expected = "mock: Unexpected Method Call")]
    fn test_unmatched_arguments_panic() {
        let mock = Mock::new();
        mock.on("Get", (1,)).returns(String::from("one"));
        let _: String = mock.method_called("Get", (2,));
    }

    #[test]
    #[should_panic(expected = "mock: Unexpected Method Call")]
    fn test_wrong_return_type_panics() {
        let mock = Mock::new();
        mock.on("Get", (1,)).returns(1u32);
        let _: u64 = mock.method_called("Get", (1,));
    }

    #[test]
    fn test_returning_and_matchers() {
        let mock = Mock::new();
        mock.on_with::<(u32,), _>("Double", function(|args: &(u32,)| args.0 < 10))
            .returning(|(n,): (u32,)| n * 2);
        mock.on_any::<(u32,)>("Double").returns(0u32);

        assert_eq!(mock.method_called::<_, u32>("Double", (4u32,)), 8);
        assert_eq!(mock.method_called::<_, u32>("Double", (40u32,)), 0);
        assert!(mock.was_called("Double", &(40u32,)));
    }

    #[test]
    fn test_returning_may_call_the_mock_again() {
        let mock = Mock::new();
        let inner = mock.clone();
        mock.on("Outer", ()).returning(move |()| inner.method_called::<_, u8>("Inner", ()) + 1);
        mock.on("Inner", ()).returns(41u8);

        assert_eq!(mock.method_called::<_, u8>("Outer", ()), 42);
    }

    #[test]
    #[should_panic(expected = "mock: 1 expectation(s) were not met:\n\tSave(\"a\",): (&str,) -> bool (expected once, called 0 times)")]
    fn test_unmet_expectations_panic() {
        let mock = Mock::new();
        mock.on("Save", ("a",)).returns(true).once();
        mock.on("Load", ()).returns_default::<Vec<u8>>().maybe();
        assert!(!mock.expectations_met());
        mock.assert_expectations();
    }

    #[test]
    #[should_panic(expected = "mock: expected a call to Save(\"b\",), calls made:\n\tSave(\"a\",)")]
    fn test_assert_called_lists_calls() {
        let mock = Mock::new();
        mock.on_any::<(&'static str,)>("Save").returns(());
        mock.method_called::<_, ()>("Save", ("a",));
        mock.assert_called("Save", ("b",));
    }

    #[test]
    #[should_panic(expected = "mock: unexpected call to Save(\"a\",) was made")]
    fn test_assert_not_called_panics() {
        let mock = Mock::new();
        mock.on_any::<(&'static str,)>("Save").returns(());
        mock.method_called::<_, ()>("Save", ("a",));
        mock.assert_not_called("Save", ("b",));
        mock.assert_not_called("Save", ("a",));
    }

    #[test]
    #[should_panic(expected = "AddOne(1,): (i32,) -> i64 (expected at least once, called 0 times)")]
    /// Same looking arguments of another integer type must be told apart in the report
    fn test_unexpected_call_names_argument_types() {
        let mock = Mock::new();
        mock.on("AddOne", (1,)).returns(2i64);
        let _: i64 = mock.method_called("AddOne", (1i64,));
    }

    #[test]
    #[should_panic(expected = "mock: Countdown(1,) was called from the returning closure answering it")]
    fn test_returning_calling_its_own_expectation_panics() {
        let mock = Mock::new();
        let inner = mock.clone();
        mock.on_any::<(u32,)>("Countdown").returning(move |(n,): (u32,)| {
            if n == 0 {
                0u32
            } else {
                10 + inner.method_called::<_, u32>("Countdown", (n - 1,))
            }
        });

        let _: u32 = mock.method_called("Countdown", (2u32,));
    }
}
