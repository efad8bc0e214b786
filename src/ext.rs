//! Type-erased request and response extensions.
//!
//! An `Extensions` map stores at most one value per concrete type, keyed
//! by the type itself. The token is `TypeId`, generated statically by the
//! compiler, so there is no runtime id counter to coordinate.
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

type AnyValue = Box<dyn Any + Send + Sync>;

/// A map of arbitrary user-supplied values, keyed by their type.
#[derive(Default)]
pub struct Extensions {
    map: HashMap<TypeId, AnyValue>,
}

impl Extensions {
    /// Creates an empty map.
    pub fn new() -> Extensions {
        Extensions::default()
    }

    /// Stores a value, returning the previous value of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|previous| previous.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Borrows the stored value of type `T`, if any.
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Mutably borrows the stored value of type `T`, if any.
    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.map
            .get_mut(&TypeId::of::<T>())
            .and_then(|value| value.downcast_mut())
    }

    /// Removes and returns the stored value of type `T`, if any.
    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast().ok())
            .map(|boxed| *boxed)
    }

    /// Whether a value of type `T` is stored.
    pub fn contains<T: Send + Sync + 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions").finish()
    }
}
