//! Per-sandbox static state.
//!
//! Two stores live here, both owned by exactly one sandbox and dropped with it:
//!
//! - [`StaticFieldStorage`] holds static fields of real classes and tracks
//!   which classes have run their static initializer, and which of those
//!   initializers failed.
//! - [`ShadowStatics`] is the arena for shadow-level static state, keyed by
//!   the shadow and the Rust type of the state.
//!
//! Because neither store is ever shared between sandboxes, a fresh sandbox
//! always observes default static state, even when instrumentation is reused.

use std::{
    any::{type_name, Any, TypeId},
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, RwLock},
};

use dashmap::DashMap;

use crate::{
    binder::ShadowId, model::Value, runtime::association::enter, transform::ClassId, Error,
    Result,
};

/// Storage for static fields of real classes in one sandbox.
///
/// # Example
///
/// ```rust,ignore
/// let storage = StaticFieldStorage::new();
/// storage.set(class, "count", Value::Int(1))?;
/// assert_eq!(storage.get(class, "count")?, Some(Value::Int(1)));
/// ```
#[derive(Debug, Default)]
pub(crate) struct StaticFieldStorage {
    /// Static fields indexed by declaring class and field name.
    fields: RwLock<HashMap<(ClassId, String), Value>>,

    /// Classes whose static initializer has been started.
    initialized_classes: RwLock<HashSet<ClassId>>,

    /// Classes whose static initializer returned an error.
    failed_classes: RwLock<HashSet<ClassId>>,
}

impl StaticFieldStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Gets a static field value, `None` if never set.
    pub(crate) fn get(&self, class: ClassId, name: &str) -> Result<Option<Value>> {
        let fields = read_lock!(self.fields)?;
        Ok(fields.get(&(class, name.to_string())).cloned())
    }

    /// Sets a static field value, replacing any previous value.
    pub(crate) fn set(&self, class: ClassId, name: &str, value: Value) -> Result<()> {
        let mut fields = write_lock!(self.fields)?;
        fields.insert((class, name.to_string()), value);
        Ok(())
    }

    /// Returns `true` if the class's static initializer has been started.
    pub(crate) fn is_class_initialized(&self, class: ClassId) -> Result<bool> {
        let initialized = read_lock!(self.initialized_classes)?;
        Ok(initialized.contains(&class))
    }

    /// Marks a class initialized. Returns `false` if it already was.
    ///
    /// Marking happens before the initializer runs, so an initializer that
    /// touches its own class does not start itself again.
    pub(crate) fn mark_class_initialized(&self, class: ClassId) -> Result<bool> {
        let mut initialized = write_lock!(self.initialized_classes)?;
        Ok(initialized.insert(class))
    }

    /// Records that the class's static initializer failed.
    ///
    /// A failed class stays unusable for the rest of the sandbox.
    pub(crate) fn mark_class_failed(&self, class: ClassId) -> Result<()> {
        write_lock!(self.failed_classes)?.insert(class);
        Ok(())
    }

    /// Returns `true` if the class's static initializer failed.
    pub(crate) fn is_class_failed(&self, class: ClassId) -> Result<bool> {
        Ok(read_lock!(self.failed_classes)?.contains(&class))
    }

    /// Returns the number of static fields stored.
    pub(crate) fn len(&self) -> Result<usize> {
        Ok(read_lock!(self.fields)?.len())
    }
}

type Slot = Arc<Mutex<Box<dyn Any + Send>>>;

/// Arena of shadow-level static state.
///
/// Each `(shadow, T)` pair owns one value of `T`, created from `T::default()`
/// on first access.
#[derive(Debug, Default)]
pub(crate) struct ShadowStatics {
    slots: DashMap<(ShadowId, TypeId), Slot>,
}

impl ShadowStatics {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with exclusive access to the static state `T` of a shadow.
    ///
    /// `shadow_name` is only used for error reporting.
    pub(crate) fn with<T, R>(
        &self,
        shadow: ShadowId,
        shadow_name: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R>
    where
        T: Default + Send + 'static,
    {
        let slot = self
            .slots
            .entry((shadow, TypeId::of::<T>()))
            .or_insert_with(|| {
                let state: Box<dyn Any + Send> = Box::new(T::default());
                Arc::new(Mutex::new(state))
            })
            .clone();

        let mut guard = enter(&*slot, shadow_name)?;
        let value = guard
            .downcast_mut::<T>()
            .ok_or_else(|| Error::ShadowStateMismatch {
                shadow: shadow_name.to_string(),
                expected: type_name::<T>(),
            })?;
        Ok(f(value))
    }

    /// Number of allocated slots.
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}
