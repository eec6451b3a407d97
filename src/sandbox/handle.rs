use std::{
    fmt,
    sync::{Arc, RwLock},
    time::Duration,
};

use log::{debug, warn};

use crate::{
    binder::{Policy, ShadowId},
    model::{ClassModifiers, MemberSignature, ObjectRef, SandboxId, Value},
    runtime::{dispatch, DirectHandle, SandboxState},
    sandbox::{Instrumentation, SandboxConfig},
    Error, Result,
};

struct SandboxInner {
    id: SandboxId,
    config: SandboxConfig,
    state: RwLock<Option<Arc<SandboxState>>>,
}

/// An isolated, disposable execution context.
///
/// `Sandbox` is a cheap handle; clones refer to the same sandbox. Every
/// operation fails with [`Error::SandboxDestroyed`] once
/// [`teardown`](Self::teardown) has run, and object handles are only accepted
/// by the sandbox that allocated them.
///
/// # Examples
///
/// ```rust,ignore
/// let sandbox = manager.create(&SandboxConfig::new().shadow("ShadowGreeter"))?;
/// let greeter = sandbox.new_instance("demo.Greeter", &[])?;
///
/// let hail = MemberSignature::new("hail", [TypeDesc::String]);
/// let reply = sandbox.invoke(&greeter, &hail, &["Pony".into()])?;
///
/// sandbox.teardown()?;
/// assert!(sandbox.invoke(&greeter, &hail, &["Pony".into()]).is_err());
/// ```
#[derive(Clone)]
pub struct Sandbox {
    inner: Arc<SandboxInner>,
}

impl Sandbox {
    pub(crate) fn new(id: SandboxId, config: SandboxConfig, instrumentation: Arc<Instrumentation>) -> Self {
        Self {
            inner: Arc::new(SandboxInner {
                id,
                config,
                state: RwLock::new(Some(Arc::new(SandboxState::new(id, instrumentation)))),
            }),
        }
    }

    pub(crate) fn state(&self) -> Result<Arc<SandboxState>> {
        read_lock!(self.inner.state)?
            .clone()
            .ok_or(Error::SandboxDestroyed(self.inner.id))
    }

    /// The sandbox identity.
    #[must_use]
    pub fn id(&self) -> SandboxId {
        self.inner.id
    }

    /// The configuration the sandbox was built from.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.inner.config
    }

    /// Returns `true` until the sandbox is torn down.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inner
            .state
            .read()
            .map(|state| state.is_some())
            .unwrap_or(false)
    }

    /// Discards the sandbox and all state it owns.
    ///
    /// Pending tasks are dropped unrun. Tearing down twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockError`] if the state lock was poisoned.
    pub fn teardown(&self) -> Result<()> {
        let state = write_lock!(self.inner.state)?.take();
        if let Some(state) = state {
            let pending = state.queue.len()?;
            if pending > 0 {
                warn!("{} torn down with {} pending tasks", self.inner.id, pending);
            }
            debug!(
                "{} torn down ({} instances, {} shadow associations, {} static fields, {} shadow statics)",
                self.inner.id,
                state.heap.len(),
                state.associations.len(),
                state.statics.len()?,
                state.shadow_statics.len()
            );
        }
        Ok(())
    }

    /// Creates an instance, dispatching its constructor.
    ///
    /// The constructor is chosen by the argument values; exactly one
    /// constructor must accept them.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] for classes not loaded, and any error
    /// raised by the constructors.
    pub fn new_instance(&self, class: &str, args: &[Value]) -> Result<ObjectRef> {
        let state = self.state()?;
        dispatch::new_instance(self, &state, class, args)
    }

    /// Calls an instance member, resolved from the runtime class upwards.
    ///
    /// # Errors
    ///
    /// Isolation, resolution and argument errors, or whatever the dispatched
    /// body returns.
    pub fn invoke(&self, obj: &ObjectRef, member: &MemberSignature, args: &[Value]) -> Result<Value> {
        let state = self.state()?;
        dispatch::invoke(self, &state, obj, member, args)
    }

    /// Calls a static member.
    ///
    /// # Errors
    ///
    /// Resolution and argument errors, or whatever the dispatched body returns.
    pub fn invoke_static(&self, class: &str, member: &MemberSignature, args: &[Value]) -> Result<Value> {
        let state = self.state()?;
        dispatch::invoke_static(self, &state, class, member, args)
    }

    /// Opens the direct-call bridge on an instance, viewed as `declared_class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAssignable`] if the instance is not a
    /// `declared_class`.
    pub fn directly_on(&self, obj: &ObjectRef, declared_class: &str) -> Result<DirectHandle> {
        let state = self.state()?;
        state.check_owner(obj)?;
        let declared = state.class_id(declared_class)?;
        let actual = state.heap.class_of(obj.id())?;
        if !state.classes().is_subclass(actual, declared) {
            return Err(Error::NotAssignable {
                object_class: obj.class_name().to_string(),
                declared: declared_class.to_string(),
            });
        }
        Ok(DirectHandle::new(self.clone(), declared_class.to_string(), Some(obj.clone())))
    }

    /// Opens the direct-call bridge on the static members of a class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] for classes not loaded.
    pub fn directly_on_class(&self, class: &str) -> Result<DirectHandle> {
        let state = self.state()?;
        state.class_id(class)?;
        Ok(DirectHandle::new(self.clone(), class.to_string(), None))
    }

    /// Runs `f` on the shadow state of type `S` associated with `obj`,
    /// creating it if needed.
    ///
    /// The hierarchy of `obj` is searched from its runtime class upwards for
    /// a shadow whose state is an `S`.
    ///
    /// # Errors
    ///
    /// - [`Error::NoShadow`] if no class in the hierarchy is shadowed
    /// - [`Error::ShadowStateMismatch`] if no shadow holds an `S`
    /// - [`Error::ReentrantShadowCall`] if that state is already borrowed
    pub fn with_shadow<S, R>(&self, obj: &ObjectRef, f: impl FnOnce(&mut S) -> R) -> Result<R>
    where
        S: 'static,
    {
        let state = self.state()?;
        dispatch::with_shadow(&state, obj, f)
    }

    /// Reads an instance field; unset fields read as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Isolation errors.
    pub fn get_field(&self, obj: &ObjectRef, name: &str) -> Result<Value> {
        let state = self.state()?;
        state.check_owner(obj)?;
        state.heap.get_field(obj.id(), name)
    }

    /// Writes an instance field.
    ///
    /// # Errors
    ///
    /// Isolation errors.
    pub fn set_field(&self, obj: &ObjectRef, name: &str, value: Value) -> Result<()> {
        let state = self.state()?;
        state.check_owner(obj)?;
        state.heap.set_field(obj.id(), name, value)?;
        Ok(())
    }

    /// Reads a static field of a real class; unset fields read as [`Value::Null`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] for classes not loaded.
    pub fn static_field(&self, class: &str, name: &str) -> Result<Value> {
        let state = self.state()?;
        let class = state.class_id(class)?;
        dispatch::ensure_initialized(self, &state, class)?;
        Ok(state.statics.get(class, name)?.unwrap_or(Value::Null))
    }

    /// Writes a static field of a real class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] for classes not loaded.
    pub fn set_static_field(&self, class: &str, name: &str, value: Value) -> Result<()> {
        let state = self.state()?;
        let class = state.class_id(class)?;
        dispatch::ensure_initialized(self, &state, class)?;
        state.statics.set(class, name, value)
    }

    /// Runs `f` on the static state `T` of an active shadow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoShadow`] if the shadow is not active here.
    pub fn shadow_statics<T, R>(&self, shadow: &str, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Default + Send + 'static,
    {
        let state = self.state()?;
        let (id, shadow) = state
            .registry()
            .by_name(shadow)
            .ok_or_else(|| Error::NoShadow(shadow.to_string()))?;
        state.shadow_statics.with(id, shadow.name(), f)
    }

    pub(crate) fn with_shadow_statics_by_id<T, R>(
        &self,
        shadow: ShadowId,
        name: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R>
    where
        T: Default + Send + 'static,
    {
        let state = self.state()?;
        state.shadow_statics.with(shadow, name, f)
    }

    /// Returns `true` if the class is instrumented in this sandbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] for classes not loaded.
    pub fn is_instrumented(&self, class: &str) -> Result<bool> {
        let state = self.state()?;
        Ok(state.loaded(state.class_id(class)?)?.is_instrumented())
    }

    /// The modifiers of the loaded class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] for classes not loaded.
    pub fn class_modifiers(&self, class: &str) -> Result<ClassModifiers> {
        let state = self.state()?;
        Ok(state.loaded(state.class_id(class)?)?.descriptor().modifiers())
    }

    /// Returns `true` if `obj` is an instance of `class` or a subclass.
    ///
    /// # Errors
    ///
    /// Isolation errors and [`Error::UnknownClass`].
    pub fn instance_of(&self, obj: &ObjectRef, class: &str) -> Result<bool> {
        let state = self.state()?;
        state.check_owner(obj)?;
        let class = state.class_id(class)?;
        Ok(state
            .classes()
            .is_subclass(state.heap.class_of(obj.id())?, class))
    }

    /// The dispatch policy of a member of an instrumented class, `None` for
    /// classes that are not instrumented.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownClass`] or [`Error::UnknownMember`].
    pub fn policy(&self, class: &str, member: &MemberSignature) -> Result<Option<Policy>> {
        let state = self.state()?;
        let id = state.class_id(class)?;
        let index = state
            .loaded(id)?
            .descriptor()
            .find(member)
            .ok_or_else(|| Error::UnknownMember {
                class: class.to_string(),
                member: member.to_string(),
            })?;
        Ok(state.bindings().entry(id, index).map(|e| e.policy()))
    }

    /// Queues a task to run on the next drain.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SandboxDestroyed`] after teardown.
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&Sandbox) -> Result<()> + Send + 'static,
    {
        self.post_delayed(Duration::ZERO, task)
    }

    /// Queues a task to run once the virtual clock has advanced by `delay`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SandboxDestroyed`] after teardown.
    pub fn post_delayed<F>(&self, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce(&Sandbox) -> Result<()> + Send + 'static,
    {
        self.state()?.queue.post_delayed(delay, Box::new(task))
    }

    /// Runs every task due at the current virtual time, in order, including
    /// tasks posted while draining. Returns the number of tasks run.
    ///
    /// # Errors
    ///
    /// The first failing task stops the drain and its error is returned;
    /// the remaining tasks stay queued.
    pub fn idle(&self) -> Result<usize> {
        let now = self.state()?.queue.now()?;
        self.drain_until(now)
    }

    /// Advances the virtual clock by `duration`, running tasks in due order.
    /// Returns the number of tasks run.
    ///
    /// # Errors
    ///
    /// As for [`idle`](Self::idle).
    pub fn idle_for(&self, duration: Duration) -> Result<usize> {
        let deadline = self.state()?.queue.now()?.saturating_add(duration);
        let ran = self.drain_until(deadline)?;
        self.state()?.queue.advance_to(deadline)?;
        Ok(ran)
    }

    /// Runs the next due task, if any. Returns `true` if a task ran.
    ///
    /// # Errors
    ///
    /// Whatever the task returns.
    pub fn run_one_task(&self) -> Result<bool> {
        let queue_state = self.state()?;
        let now = queue_state.queue.now()?;
        let task = queue_state.queue.pop_due(now)?;
        drop(queue_state);
        match task {
            Some(task) => {
                task(self)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn drain_until(&self, deadline: Duration) -> Result<usize> {
        let mut ran = 0;
        loop {
            let task = self.state()?.queue.pop_due(deadline)?;
            match task {
                Some(task) => {
                    task(self)?;
                    ran += 1;
                }
                None => return Ok(ran),
            }
        }
    }

    /// Number of queued tasks, due or not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SandboxDestroyed`] after teardown.
    pub fn pending_tasks(&self) -> Result<usize> {
        self.state()?.queue.len()
    }

    /// The current virtual time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SandboxDestroyed`] after teardown.
    pub fn now(&self) -> Result<Duration> {
        self.state()?.queue.now()
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl PartialEq for Sandbox {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Sandbox {}
