//! Real instance to shadow instance associations.
//!
//! An instance gets one shadow state per shadowed class in its hierarchy,
//! keyed by `(ObjectId, ClassId)`. States are created on first need and live
//! until the sandbox is torn down.
//!
//! Handlers reach their state through a [`ShadowRef`], which locks it only
//! for the closure passed to [`ShadowRef::with`]. Outside that closure a
//! handler may call other shadowed members of the same instance.

use std::{
    any::type_name,
    fmt,
    marker::PhantomData,
    sync::{Arc, Mutex, MutexGuard, TryLockError},
};

use dashmap::DashMap;

use crate::{
    model::{ObjectId, ShadowClass, ShadowState},
    transform::ClassId,
    Error, Result,
};

/// A shadow state slot, shared between the index and running handlers.
pub(crate) type ShadowCell = Arc<Mutex<ShadowState>>;

/// Locks a shadow cell.
///
/// Scenarios drive a sandbox from one thread at a time, so a held lock means
/// the state is already borrowed further up the stack. That is reported
/// instead of deadlocking.
pub(crate) fn enter<'a, T: ?Sized>(cell: &'a Mutex<T>, shadow: &str) -> Result<MutexGuard<'a, T>> {
    match cell.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(Error::ReentrantShadowCall {
            shadow: shadow.to_string(),
        }),
        Err(TryLockError::Poisoned(_)) => Err(Error::LockError),
    }
}

/// Scoped access to the shadow state `S` of the instance a handler runs on.
///
/// # Examples
///
/// ```rust
/// use shadowbox::prelude::*;
///
/// #[derive(Default)]
/// struct Clicks {
///     count: u32,
/// }
///
/// let shadow = ShadowClass::builder::<Clicks>("ShadowButton")
///     .implements("android.widget.Button")
///     .method("performClick", [], TypeDesc::Bool, |clicks, _| {
///         clicks.with(|c| c.count += 1)?;
///         Ok(Value::Bool(true))
///     })
///     .build()?;
/// # Ok::<(), shadowbox::Error>(())
/// ```
pub struct ShadowRef<'a, S> {
    cell: &'a Mutex<ShadowState>,
    shadow: &'a str,
    _state: PhantomData<fn() -> S>,
}

impl<'a, S: 'static> ShadowRef<'a, S> {
    pub(crate) fn new(cell: &'a Mutex<ShadowState>, shadow: &'a str) -> Self {
        Self {
            cell,
            shadow,
            _state: PhantomData,
        }
    }

    /// Name of the shadow class owning the state.
    #[must_use]
    pub fn shadow(&self) -> &str {
        self.shadow
    }

    /// Runs `f` with exclusive access to the state.
    ///
    /// The state is unlocked again when `f` returns, so calls into the
    /// sandbox belong outside of `f`.
    ///
    /// # Errors
    ///
    /// - [`Error::ReentrantShadowCall`] if the state is already borrowed
    /// - [`Error::ShadowStateMismatch`] if the state is not an `S`
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R> {
        let mut guard = enter(self.cell, self.shadow)?;
        let state = guard
            .downcast_mut::<S>()
            .ok_or_else(|| Error::ShadowStateMismatch {
                shadow: self.shadow.to_string(),
                expected: type_name::<S>(),
            })?;
        Ok(f(state))
    }
}

impl<S> fmt::Debug for ShadowRef<'_, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowRef")
            .field("shadow", &self.shadow)
            .field("state", &type_name::<S>())
            .finish_non_exhaustive()
    }
}

/// Shadow association index of one sandbox.
#[derive(Debug, Default)]
pub(crate) struct ShadowAssociations {
    cells: DashMap<(ObjectId, ClassId), ShadowCell>,
}

impl ShadowAssociations {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the shadow state of `object` for `class`, creating it if needed.
    pub(crate) fn get_or_create(
        &self,
        object: ObjectId,
        class: ClassId,
        shadow: &ShadowClass,
    ) -> ShadowCell {
        self.cells
            .entry((object, class))
            .or_insert_with(|| Arc::new(Mutex::new(shadow.new_state())))
            .clone()
    }

    /// Returns `true` if the association exists.
    #[cfg(test)]
    pub(crate) fn contains(&self, object: ObjectId, class: ClassId) -> bool {
        self.cells.contains_key(&(object, class))
    }

    /// Number of live associations.
    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }
}
