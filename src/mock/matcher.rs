//! Argument matchers for expectations

use std::fmt::Debug;

/// Decides whether the arguments of a call satisfy an expectation
pub trait Matcher<I>: Send {
    /// Checks the argument tuple of a call
    fn matches(&self, args: &I) -> bool;
    /// Human readable form used in failure messages
    fn describe(&self) -> String;
}

/// Matches argument tuples equal to the expected one
pub struct Equals<I>(I);

impl<I: PartialEq + Debug + Send> Matcher<I> for Equals<I> {
    fn matches(&self, args: &I) -> bool {
        self.0 == *args
    }

    fn describe(&self) -> String {
        format!("{:?}", self.0)
    }
}

/// Matches any argument tuple
pub struct Anything;

impl<I> Matcher<I> for Anything {
    fn matches(&self, _args: &I) -> bool {
        true
    }

    fn describe(&self) -> String {
        "(<any>)".to_owned()
    }
}

/// Matches argument tuples accepted by a predicate
pub struct Predicate<F>(F);

impl<I, F> Matcher<I> for Predicate<F>
where
    F: Fn(&I) -> bool + Send,
{
    fn matches(&self, args: &I) -> bool {
        (self.0)(args)
    }

    fn describe(&self) -> String {
        "(<predicate>)".to_owned()
    }
}

/// Expects exactly `args`
pub fn eq<I: PartialEq + Debug + Send>(args: I) -> Equals<I> {
    Equals(args)
}

/// Expects any arguments
pub fn any() -> Anything {
    Anything
}

/// Expects arguments for which `predicate` returns `true`
pub fn function<I, F>(predicate: F) -> Predicate<F>
where
    F: Fn(&I) -> bool + Send,
{
    Predicate(predicate)
}
