//! The direct-call bridge.
//!
//! A [`DirectHandle`] reaches the preserved original body of a member,
//! whatever its binding says. Shadows use it to delegate to real behavior
//! (`directly_on(this, "a.Base").call(..)`), and scenarios use it to run real
//! initialization of a class whose constructor is shadowed.
//!
//! Direct calls never touch the binding table.

use log::trace;

use crate::{
    model::{MemberSignature, ObjectRef, TypeDesc, Value},
    runtime::{
        dispatch::{check_args, ensure_initialized, run_original},
        Invocation,
    },
    Error, Result, Sandbox,
};

/// Handle for calling original bodies of a declared class.
///
/// Obtained from [`Sandbox::directly_on`] for instance members or
/// [`Sandbox::directly_on_class`] for static members.
#[derive(Clone, Debug)]
pub struct DirectHandle {
    sandbox: Sandbox,
    class: String,
    this: Option<ObjectRef>,
}

impl DirectHandle {
    pub(crate) fn new(sandbox: Sandbox, class: String, this: Option<ObjectRef>) -> Self {
        Self {
            sandbox,
            class,
            this,
        }
    }

    /// The declared class calls resolve against.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// The receiver, `None` for a class handle.
    #[must_use]
    pub fn receiver(&self) -> Option<&ObjectRef> {
        self.this.as_ref()
    }

    /// Calls the original body of a method.
    ///
    /// The member is resolved from the declared class up its superclasses.
    ///
    /// # Errors
    ///
    /// - [`Error::DirectCallOnNative`] if the member is native
    /// - [`Error::CallKind`] if the member's static-ness does not fit the handle
    /// - [`Error::UnknownMember`] / [`Error::ArgumentMismatch`] as for dispatch
    pub fn call(&self, signature: &MemberSignature, args: &[Value]) -> Result<Value> {
        let state = self.sandbox.state()?;
        let start = state.class_id(&self.class)?;

        let (class, index) = state
            .classes()
            .ancestry(start)
            .find_map(|c| {
                state
                    .loaded(c)
                    .ok()
                    .and_then(|l| l.descriptor().find(signature))
                    .map(|i| (c, i))
            })
            .ok_or_else(|| Error::UnknownMember {
                class: self.class.clone(),
                member: signature.to_string(),
            })?;

        let loaded = state.loaded(class)?;
        let member = loaded
            .descriptor()
            .member(index)
            .ok_or_else(|| Error::UnknownMember {
                class: self.class.clone(),
                member: signature.to_string(),
            })?;

        if member.is_constructor() {
            return Err(Error::CallKind {
                member: signature.to_string(),
                message: "use construct for constructors",
            });
        }
        if member.is_static() == self.this.is_some() {
            return Err(Error::CallKind {
                member: signature.to_string(),
                message: if member.is_static() {
                    "static member called through an instance handle"
                } else {
                    "instance member called through a class handle"
                },
            });
        }

        check_args(&state, member.signature(), args)?;
        ensure_initialized(&self.sandbox, &state, class)?;
        trace!(
            "{} direct {}.{}",
            self.sandbox.id(),
            loaded.descriptor().name(),
            signature
        );

        let invocation = Invocation::new(
            &self.sandbox,
            loaded.descriptor().name(),
            member.signature(),
            self.this.as_ref(),
            args,
        );
        run_original(loaded, member, index, &invocation)
    }

    /// Runs the original body of a constructor of the declared class on the
    /// receiver.
    ///
    /// # Errors
    ///
    /// - [`Error::CallKind`] on a class handle
    /// - [`Error::UnknownMember`] if the declared class has no such constructor
    pub fn construct(
        &self,
        params: impl IntoIterator<Item = TypeDesc>,
        args: &[Value],
    ) -> Result<Value> {
        let signature = MemberSignature::constructor(params);
        let this = self.this.as_ref().ok_or_else(|| Error::CallKind {
            member: signature.to_string(),
            message: "constructors need an instance handle",
        })?;

        let state = self.sandbox.state()?;
        let class = state.class_id(&self.class)?;
        let loaded = state.loaded(class)?;
        let index = loaded
            .descriptor()
            .find(&signature)
            .ok_or_else(|| Error::UnknownMember {
                class: self.class.clone(),
                member: signature.to_string(),
            })?;
        let member = loaded
            .descriptor()
            .member(index)
            .ok_or_else(|| Error::UnknownMember {
                class: self.class.clone(),
                member: signature.to_string(),
            })?;

        check_args(&state, member.signature(), args)?;
        trace!(
            "{} direct {}.{}",
            self.sandbox.id(),
            loaded.descriptor().name(),
            signature
        );

        let invocation = Invocation::new(
            &self.sandbox,
            loaded.descriptor().name(),
            member.signature(),
            Some(this),
            args,
        );
        run_original(loaded, member, index, &invocation)
    }
}
