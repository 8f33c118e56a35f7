// src/dag/declaration.rs

//! Service declarations and the resource map they are resolved into.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::anyhow;

use crate::scope::Scoped;

/// Canonical service name type used throughout the crate.
pub type ServiceName = String;

/// An acquired service value, type-erased so services of different types can
/// live in one map.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Anything that has a name and a list of dependency names.
///
/// Both [`Declaration`]s and manifest service specs implement this, so the
/// validator and layer planner can run over either.
pub trait Node {
    fn name(&self) -> &str;
    fn needs(&self) -> &[ServiceName];
}

type AcquireFn = Box<dyn FnOnce(ResourceMap) -> Scoped<Value> + Send>;

/// Static description of one service: its name, the names it depends on, and
/// how to acquire it once those dependencies are available.
pub struct Declaration {
    name: ServiceName,
    needs: Vec<ServiceName>,
    acquire: AcquireFn,
}

impl Declaration {
    /// Declare a service.
    ///
    /// `acquire` is called at most once, with a [`ResourceMap`] containing
    /// exactly the services listed in `needs`.
    pub fn new<T, F>(name: impl Into<ServiceName>, needs: &[&str], acquire: F) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(ResourceMap) -> Scoped<T> + Send + 'static,
    {
        Self {
            name: name.into(),
            needs: needs.iter().map(|s| s.to_string()).collect(),
            acquire: Box::new(move |deps| acquire(deps).map(|value| Arc::new(value) as Value)),
        }
    }

    /// Same as [`Declaration::new`], for callers that already own their
    /// dependency names.
    pub fn with_needs<T, F>(
        name: impl Into<ServiceName>,
        needs: Vec<ServiceName>,
        acquire: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(ResourceMap) -> Scoped<T> + Send + 'static,
    {
        Self {
            name: name.into(),
            needs,
            acquire: Box::new(move |deps| acquire(deps).map(|value| Arc::new(value) as Value)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn needs(&self) -> &[ServiceName] {
        &self.needs
    }

    /// Consume the declaration, producing its scoped resource.
    pub(crate) fn into_scoped(self, resources: &ResourceMap) -> Scoped<Value> {
        let visible = resources.restrict(&self.needs);
        (self.acquire)(visible)
    }
}

impl Node for Declaration {
    fn name(&self) -> &str {
        &self.name
    }

    fn needs(&self) -> &[ServiceName] {
        &self.needs
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("name", &self.name)
            .field("needs", &self.needs)
            .finish_non_exhaustive()
    }
}

/// Immutable snapshot of resolved services, keyed by name.
///
/// Each scheduling layer produces a new map extending the previous one; a map
/// is never mutated after it has been handed to a declaration.
#[derive(Clone, Default)]
pub struct ResourceMap {
    entries: BTreeMap<ServiceName, Value>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of all resolved services, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// The type-erased value for `name`.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    /// The value for `name`, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<&T> {
        self.entries.get(name)?.downcast_ref::<T>()
    }

    /// Shared handle to the value for `name`, if present and of type `T`.
    pub fn get_arc<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        Arc::clone(self.entries.get(name)?).downcast::<T>().ok()
    }

    /// Like [`ResourceMap::get`], but with an error describing what went wrong.
    ///
    /// Handy inside acquisition closures that return `anyhow::Result`.
    pub fn require<T: Any + Send + Sync>(&self, name: &str) -> anyhow::Result<&T> {
        let value = self
            .entries
            .get(name)
            .ok_or_else(|| anyhow!("service '{name}' is not available here"))?;
        value.downcast_ref::<T>().ok_or_else(|| {
            anyhow!(
                "service '{name}' is not a {}",
                std::any::type_name::<T>()
            )
        })
    }

    /// A new map holding only the listed names.
    pub(crate) fn restrict(&self, names: &[ServiceName]) -> Self {
        let entries = names
            .iter()
            .filter_map(|name| {
                self.entries
                    .get(name)
                    .map(|value| (name.clone(), Arc::clone(value)))
            })
            .collect();
        Self { entries }
    }

    /// A new map extending this one with `pairs`.
    pub(crate) fn extended(&self, pairs: impl IntoIterator<Item = (ServiceName, Value)>) -> Self {
        let mut entries = self.entries.clone();
        entries.extend(pairs);
        Self { entries }
    }
}

impl fmt::Debug for ResourceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
