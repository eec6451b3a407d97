use std::time::Duration;

use crate::{
    binder::ShadowId,
    model::{MemberSignature, ObjectRef, Value},
    Error, Result, Sandbox,
};

/// The context of one call, handed to member bodies and shadow handlers.
///
/// An invocation borrows the sandbox it runs in, so bodies can read and write
/// fields, call other members, post tasks and reach shadow statics without
/// any global state.
///
/// # Examples
///
/// ```rust,ignore
/// let body = |inv: &Invocation<'_>| {
///     let name = inv.arg_str(0)?;
///     inv.set_field("name", name.into())?;
///     Ok(Value::Void)
/// };
/// ```
#[derive(Clone, Copy)]
pub struct Invocation<'a> {
    sandbox: &'a Sandbox,
    class: &'a str,
    member: &'a MemberSignature,
    this: Option<&'a ObjectRef>,
    args: &'a [Value],
    shadow: Option<(ShadowId, &'a str)>,
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        sandbox: &'a Sandbox,
        class: &'a str,
        member: &'a MemberSignature,
        this: Option<&'a ObjectRef>,
        args: &'a [Value],
    ) -> Self {
        Self {
            sandbox,
            class,
            member,
            this,
            args,
            shadow: None,
        }
    }

    pub(crate) fn in_shadow(mut self, shadow: ShadowId, name: &'a str) -> Self {
        self.shadow = Some((shadow, name));
        self
    }

    /// The sandbox the call runs in.
    #[must_use]
    pub fn sandbox(&self) -> &'a Sandbox {
        self.sandbox
    }

    /// The class declaring the called member.
    #[must_use]
    pub fn class_name(&self) -> &'a str {
        self.class
    }

    /// The called member.
    #[must_use]
    pub fn member(&self) -> &'a MemberSignature {
        self.member
    }

    /// The receiver, `None` for static members.
    #[must_use]
    pub fn receiver(&self) -> Option<&'a ObjectRef> {
        self.this
    }

    /// The receiver of an instance call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CallKind`] when called from a static member.
    pub fn this(&self) -> Result<&'a ObjectRef> {
        self.this.ok_or_else(|| Error::CallKind {
            member: self.member.to_string(),
            message: "static members have no receiver",
        })
    }

    /// All arguments.
    #[must_use]
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    /// The argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if there is no such argument.
    pub fn arg(&self, index: usize) -> Result<&'a Value> {
        self.args.get(index).ok_or_else(|| Error::ArgumentMismatch {
            member: self.member.to_string(),
            message: format!("no argument at index {index}"),
        })
    }

    fn typed<T>(&self, index: usize, expected: &str, get: impl FnOnce(&'a Value) -> Option<T>) -> Result<T> {
        let value = self.arg(index)?;
        get(value).ok_or_else(|| Error::ArgumentMismatch {
            member: self.member.to_string(),
            message: format!("argument {index} is {}, expected {expected}", value.kind_name()),
        })
    }

    /// The `boolean` argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if missing or of another type.
    pub fn arg_bool(&self, index: usize) -> Result<bool> {
        self.typed(index, "boolean", Value::as_bool)
    }

    /// The `int` argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if missing or of another type.
    pub fn arg_int(&self, index: usize) -> Result<i32> {
        self.typed(index, "int", Value::as_int)
    }

    /// The `long` argument at `index`; `int` values are widened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if missing or of another type.
    pub fn arg_long(&self, index: usize) -> Result<i64> {
        self.typed(index, "long", Value::as_long)
    }

    /// The `double` argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if missing or of another type.
    pub fn arg_double(&self, index: usize) -> Result<f64> {
        self.typed(index, "double", Value::as_double)
    }

    /// The string argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if missing, null or of another type.
    pub fn arg_str(&self, index: usize) -> Result<&'a str> {
        self.typed(index, "String", Value::as_str)
    }

    /// The byte array argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if missing, null or of another type.
    pub fn arg_bytes(&self, index: usize) -> Result<&'a [u8]> {
        self.typed(index, "byte[]", Value::as_bytes)
    }

    /// The object argument at `index`, `None` if it is null.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentMismatch`] if missing or not a reference.
    pub fn arg_object(&self, index: usize) -> Result<Option<&'a ObjectRef>> {
        match self.arg(index)? {
            Value::Null => Ok(None),
            Value::Object(obj) => Ok(Some(obj)),
            other => Err(Error::ArgumentMismatch {
                member: self.member.to_string(),
                message: format!("argument {index} is {}, expected object", other.kind_name()),
            }),
        }
    }

    /// Reads a field of the receiver.
    ///
    /// # Errors
    ///
    /// Fails for static members and torn down sandboxes.
    pub fn field(&self, name: &str) -> Result<Value> {
        self.sandbox.get_field(self.this()?, name)
    }

    /// Writes a field of the receiver.
    ///
    /// # Errors
    ///
    /// Fails for static members and torn down sandboxes.
    pub fn set_field(&self, name: &str, value: Value) -> Result<()> {
        self.sandbox.set_field(self.this()?, name, value)
    }

    /// Runs `f` with the static state `T` of the shadow handling this call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoShadow`] when the call is not handled by a shadow.
    pub fn statics<T, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R>
    where
        T: Default + Send + 'static,
    {
        let (shadow, name) = self
            .shadow
            .ok_or_else(|| Error::NoShadow(self.class.to_string()))?;
        self.sandbox.with_shadow_statics_by_id(shadow, name, f)
    }

    /// Posts a task to the sandbox queue.
    ///
    /// # Errors
    ///
    /// Fails if the sandbox was torn down.
    pub fn post<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce(&Sandbox) -> Result<()> + Send + 'static,
    {
        self.sandbox.post(task)
    }

    /// Posts a task to run after `delay` of virtual time.
    ///
    /// # Errors
    ///
    /// Fails if the sandbox was torn down.
    pub fn post_delayed<F>(&self, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce(&Sandbox) -> Result<()> + Send + 'static,
    {
        self.sandbox.post_delayed(delay, task)
    }
}
