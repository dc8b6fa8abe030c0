//! Identity of the receiver of a mocked method

use std::any::type_name;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The receiver of a mocked method call, compared by address.
///
/// Mocked methods forward it in front of their other arguments, so an expectation can tell two
/// instances apart:
///
/// ```
/// use libstub::mock::{Mock, Receiver};
///
/// struct Account {
///     id: u32,
/// }
/// let (a, b) = (Account { id: 1 }, Account { id: 2 });
///
/// let mock = Mock::new();
/// mock.on("Balance", (Receiver::of(&a),)).returns(100u32);
/// mock.on("Balance", (Receiver::of(&b),)).returns(5u32);
///
/// assert_eq!(mock.method_called::<_, u32>("Balance", (Receiver::of(&b),)), 5);
/// ```
///
/// Only the address is kept, the receiver may be dropped and its address reused afterwards.
pub struct Receiver<S: ?Sized> {
    /// Address of the receiver
    address: usize,
    /// Type of the receiver
    _type: PhantomData<fn(&S)>,
}

impl<S: ?Sized> Receiver<S> {
    /// Identity of `receiver`
    pub fn of(receiver: &S) -> Self {
        Self {
            address: receiver as *const S as *const () as usize,
            _type: PhantomData,
        }
    }

    /// Address of the receiver
    pub fn address(&self) -> usize {
        self.address
    }
}

impl<S: ?Sized> Clone for Receiver<S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: ?Sized> Copy for Receiver<S> {}

impl<S: ?Sized> PartialEq for Receiver<S> {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl<S: ?Sized> Eq for Receiver<S> {}

impl<S: ?Sized> Hash for Receiver<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl<S: ?Sized> fmt::Debug for Receiver<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{}@{:#x}", type_name::<S>(), self.address)
    }
}
