//! Process-wide bindings from generated trampolines to the [`Mock`] they report to

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use tracing::debug;

use super::{CallArgs, Mock};

/// Target of a trampoline
#[derive(Clone)]
struct Binding {
    /// Tracker answering the calls
    mock: Mock,
    /// Method name the calls are recorded under
    method: Arc<str>,
}

lazy_static! {
    /// Bindings keyed by the trampoline's key type
    static ref BINDINGS: Mutex<HashMap<TypeId, Binding>> = Mutex::new(HashMap::new());
}

/// Locks the bindings, ignoring poisoning left behind by a panicking test
fn bindings() -> MutexGuard<'static, HashMap<TypeId, Binding>> {
    BINDINGS.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Routes the trampoline keyed by `K` to `method` on `mock`
pub(crate) fn bind<K: 'static>(mock: &Mock, method: &str) {
    debug!(method, key = type_name::<K>(), "binding mock");
    bindings().insert(
        TypeId::of::<K>(),
        Binding {
            mock: mock.clone(),
            method: method.into(),
        },
    );
}

/// Drops every binding
pub(crate) fn unbind_all() {
    bindings().clear();
}

/// Body of every trampoline: forwards `args` to the mock bound to `K`
pub(crate) fn dispatch<K: 'static, I: CallArgs, O: Send + 'static>(args: I) -> O {
    // the lock is released before the call, the mock may be re-entered from its return values
    let binding = bindings().get(&TypeId::of::<K>()).cloned();
    match binding {
        Some(binding) => binding.mock.method_called(&binding.method, args),
        None => panic!(
            "mock: no tracker bound to {} for call with {args:?}",
            type_name::<K>()
        ),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use crate::mock::Mock;

    use super::{bind, dispatch, unbind_all};

    /// Key of the bound trampoline
    enum Bound {}

    #[test]
    #[serial]
    fn test_dispatch_reaches_bound_mock() {
        let mock = Mock::new();
        mock.on("Square", (3u64,)).returns(9u64).once();
        bind::<Bound>(&mock, "Square");

        assert_eq!(dispatch::<Bound, _, u64>((3u64,)), 9);
        mock.assert_expectations();

        unbind_all();
    }

    #[test]
    #[serial]
    #[should_panic(expected = "mock: no tracker bound to")]
    fn test_dispatch_without_binding_panics() {
        unbind_all();
        let _: u64 = dispatch::<Bound, _, u64>((3u64,));
    }
}
