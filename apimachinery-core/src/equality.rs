//! Structural equality with per-type overrides.
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    fmt,
    sync::{Arc, LazyLock},
};

use crate::{
    object::Object,
    reflect::Reflect,
    time::{MicroTime, Time},
};

type EqualityFn = Arc<dyn Fn(&dyn Any, &dyn Any) -> bool + Send + Sync>;

/// A registry of custom equality functions consulted during a structural walk.
///
/// Every nested value is checked against the registry before falling back to
/// its [`Reflect::deep_equal`] implementation, so an override applies at any depth.
/// Records are owned trees, so the walk needs no cycle tracking.
#[derive(Clone, Default)]
pub struct Equalities {
    funcs: HashMap<TypeId, EqualityFn>,
}

impl fmt::Debug for Equalities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Equalities").field("funcs", &self.funcs.len()).finish()
    }
}

static SEMANTIC: LazyLock<Equalities> = LazyLock::new(|| {
    let mut eq = Equalities::new();
    eq.add_func(|a: &Time, b: &Time| a.truncated() == b.truncated());
    eq.add_func(|a: &MicroTime, b: &MicroTime| a.truncated() == b.truncated());
    eq
});

impl Equalities {
    /// An empty registry: plain structural equality
    pub fn new() -> Self {
        Self::default()
    }

    /// Equality that compares timestamps at their wire precision.
    pub fn semantic() -> &'static Equalities {
        &SEMANTIC
    }

    /// Register a custom equality for `T`, replacing any previous one.
    pub fn add_func<T: Any>(&mut self, f: impl Fn(&T, &T) -> bool + Send + Sync + 'static) -> &mut Self {
        let erased: EqualityFn = Arc::new(move |a: &dyn Any, b: &dyn Any| {
            match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
                (Some(a), Some(b)) => f(a, b),
                _ => false,
            }
        });
        self.funcs.insert(TypeId::of::<T>(), erased);
        self
    }

    /// Compare two values, consulting registered functions first.
    pub fn deep_equal<T: Reflect>(&self, a: &T, b: &T) -> bool {
        if let Some(f) = self.funcs.get(&TypeId::of::<T>()) {
            return f(a, b);
        }
        a.deep_equal(b, self)
    }

    /// Compare two objects of possibly different types.
    pub fn deep_equal_objects(&self, a: &dyn Object, b: &dyn Object) -> bool {
        a.deep_equal_object(b, self)
    }
}
