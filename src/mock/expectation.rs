//! Type-erased storage for a single expectation

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use super::matcher::Matcher;

/// Producer of return values for an expectation
pub(crate) type Rfunc<I, O> = Box<dyn FnMut(I) -> O + Send>;

/// Shared handle to a producer, so it can run without the tracker's lock held
pub(crate) type SharedRfunc<I, O> = Arc<Producer<I, O>>;

/// An [`Rfunc`] that knows which thread is running it
pub(crate) struct Producer<I, O> {
    /// The producer itself
    rfunc: Mutex<Rfunc<I, O>>,
    /// Thread currently inside `rfunc`
    running: Mutex<Option<ThreadId>>,
}

/// Clears [`Producer::running`], also when the producer panics
struct Running<'a>(&'a Mutex<Option<ThreadId>>);

impl Drop for Running<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<I, O> Producer<I, O> {
    /// Wraps `rfunc`
    fn new(rfunc: Rfunc<I, O>) -> Self {
        Self {
            rfunc: Mutex::new(rfunc),
            running: Mutex::new(None),
        }
    }

    /// Runs the producer on `args`.
    ///
    /// Returns `None` if the current thread is already inside it, i.e. the producer called the
    /// expectation it belongs to. Other threads wait for their turn.
    pub(crate) fn produce(&self, args: I) -> Option<O> {
        let current = thread::current().id();
        if *self.running.lock().unwrap_or_else(PoisonError::into_inner) == Some(current) {
            return None;
        }
        let mut rfunc = self.rfunc.lock().unwrap_or_else(PoisonError::into_inner);
        *self.running.lock().unwrap_or_else(PoisonError::into_inner) = Some(current);
        let _running = Running(&self.running);
        Some((*rfunc)(args))
    }
}

/// How many times an expectation may be used
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Times {
    /// Any number of calls, at least one to be satisfied
    Unlimited,
    /// Exactly this many calls
    Exactly(usize),
}

/// [`Matcher`] with the argument type erased
trait ErasedMatcher: Send {
    /// Checks the arguments of a call, failing if they are not of the matcher's type
    fn matches(&self, args: &dyn Any) -> bool;
    /// See [`Matcher::describe`]
    fn describe(&self) -> String;
}

/// Adapter from a typed [`Matcher`] to an [`ErasedMatcher`]
struct Typed<I, M> {
    /// Wrapped matcher
    matcher: M,
    /// Argument type the matcher accepts
    _args: PhantomData<fn(&I)>,
}

impl<I: 'static, M: Matcher<I>> ErasedMatcher for Typed<I, M> {
    fn matches(&self, args: &dyn Any) -> bool {
        args.downcast_ref::<I>()
            .map_or(false, |args| self.matcher.matches(args))
    }

    fn describe(&self) -> String {
        self.matcher.describe()
    }
}

/// A registered expectation
pub(crate) struct Expectation {
    /// Method the expectation is registered for
    pub(crate) method: String,
    /// Argument matcher
    matcher: Box<dyn ErasedMatcher>,
    /// A [`SharedRfunc`] for the expectation's argument and output types
    rfunc: Box<dyn Any + Send>,
    /// Name of the argument tuple type, for failure messages
    args: &'static str,
    /// Name of the output type, for failure messages
    output: &'static str,
    /// Allowed number of calls
    pub(crate) times: Times,
    /// Whether the expectation is satisfied without any call
    pub(crate) optional: bool,
    /// Number of calls matched so far
    pub(crate) calls: usize,
}

impl Expectation {
    /// Creates an unlimited, mandatory expectation
    pub(crate) fn new<I, O, M>(method: String, matcher: M, rfunc: Rfunc<I, O>) -> Self
    where
        I: 'static,
        O: 'static,
        M: Matcher<I> + 'static,
    {
        let shared: SharedRfunc<I, O> = Arc::new(Producer::new(rfunc));
        Self {
            method,
            matcher: Box::new(Typed {
                matcher,
                _args: PhantomData,
            }),
            rfunc: Box::new(shared),
            args: type_name::<I>(),
            output: type_name::<O>(),
            times: Times::Unlimited,
            optional: false,
            calls: 0,
        }
    }

    /// Checks that the arguments match and that the expectation returns an `O`
    pub(crate) fn accepts<I: 'static, O: 'static>(&self, args: &I) -> bool {
        self.rfunc.is::<SharedRfunc<I, O>>() && self.matcher.matches(args)
    }

    /// Whether every allowed call was used up
    pub(crate) fn exhausted(&self) -> bool {
        matches!(self.times, Times::Exactly(n) if self.calls >= n)
    }

    /// Whether the expectation has been met
    pub(crate) fn satisfied(&self) -> bool {
        self.optional
            || match self.times {
                Times::Unlimited => self.calls > 0,
                Times::Exactly(n) => self.calls == n,
            }
    }

    /// Records a call and hands back the producer for its return value
    pub(crate) fn take_call<I: 'static, O: 'static>(&mut self) -> Option<SharedRfunc<I, O>> {
        let rfunc = self.rfunc.downcast_ref::<SharedRfunc<I, O>>()?.clone();
        self.calls += 1;
        Some(rfunc)
    }

    /// One line summary for failure messages
    pub(crate) fn describe(&self) -> String {
        let times = match self.times {
            Times::Unlimited => "at least once".to_owned(),
            Times::Exactly(1) => "once".to_owned(),
            Times::Exactly(n) => format!("{n} times"),
        };
        format!(
            "{}{}: {} -> {} (expected {}{}, called {} times)",
            self.method,
            self.matcher.describe(),
            self.args,
            self.output,
            times,
            if self.optional { ", optional" } else { "" },
            self.calls
        )
    }
}
