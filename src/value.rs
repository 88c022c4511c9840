//! The dynamic, name-keyed value representation.
//!
//! Resolution in this crate is purely by name (never by type), so the core
//! never needs to know what concrete type a resource produces. `Value` erases
//! it behind `Rc<dyn Any>`; resource bodies downcast their own dependencies.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::proxy::Proxy;

/// An evaluated, name-keyed dependency value.
#[derive(Clone)]
pub struct Value(Rc<dyn Any>);

impl Value {
    /// Wrap a concrete value.
    pub fn new<T: 'static>(value: T) -> Self {
        Value(Rc::new(value))
    }

    /// Downcast to a reference of the requested type.
    ///
    /// Returns `None` if the stored value is not a `T`; callers that know
    /// their own dependency graph treat a mismatch as a programmer error.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Downcast to an owned `Rc<T>`, cloning the `Rc`, not the value.
    pub fn downcast_rc<T: 'static>(&self) -> Option<Rc<T>> {
        Rc::downcast(Rc::clone(&self.0)).ok()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Value").field(&"..").finish()
    }
}

/// What gets injected for a single declared parameter.
///
/// A parameter tagged "proxy-requested" (`ParamSpec::is_proxy`) receives a
/// [`Proxy`] instead of a forced [`Value`] — see spec §4.1 and §4.4.
#[derive(Clone)]
pub enum Injection {
    /// A forced, concrete value.
    Value(Value),
    /// A deferred navigation handle into the composed tree.
    Proxy(Proxy),
}

impl Injection {
    /// Returns the forced value, forcing a contained `Proxy` if necessary.
    ///
    /// This is a convenience used by bodies that declared a plain (non-proxy)
    /// parameter; forcing a `Proxy` injection here should not normally
    /// happen since the evaluator only produces `Injection::Proxy` for
    /// proxy-requested parameters, but bodies may still choose to force
    /// explicitly via this method when composing generic helpers.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Injection::Value(value) => Some(value),
            Injection::Proxy(_) => None,
        }
    }
}

/// Named, resolved arguments handed to a contribution body at invocation time.
#[derive(Clone, Default)]
pub struct Args {
    entries: Vec<(String, Injection)>,
}

impl Args {
    /// An empty argument set.
    pub fn new() -> Self {
        Args::default()
    }

    /// Insert a resolved argument under `name`.
    pub fn insert(&mut self, name: impl Into<String>, injection: Injection) {
        self.entries.push((name.into(), injection));
    }

    /// Look up a named argument.
    pub fn get(&self, name: &str) -> Option<&Injection> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Look up a named argument's forced value.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.get(name)? {
            Injection::Value(value) => Some(value),
            Injection::Proxy(_) => None,
        }
    }
}
