//! Call resolution and dispatch.
//!
//! Every call into a sandbox ends up in [`call`]. For an instrumented class
//! the member's [`BindingEntry`](crate::binder::BindingEntry) decides what
//! runs; for a plain class the original body runs directly.
//!
//! ```text
//!  invoke / invoke_static / new_instance
//!        │
//!        ▼
//!  resolve (runtime class → superclasses)
//!        │
//!        ▼
//!  check arguments ──► ensure static initializer ran
//!        │
//!        ▼
//!  ┌─────────────── binding ───────────────┐
//!  │ Shadow      → association → handler   │
//!  │ PassThrough → preserved original body │
//!  │ NoOp        → type default            │
//!  └───────────────────────────────────────┘
//! ```

use std::any::type_name;

use log::{debug, trace};

use crate::{
    binder::{Binding, ShadowId},
    model::{
        ClassModifiers, MemberDescriptor, MemberIndex, MemberSignature, ObjectRef, ShadowHandler,
        TypeDesc, Value,
    },
    runtime::{Invocation, SandboxState, ShadowRef},
    transform::{ClassId, LoadedClass},
    Error, Result, Sandbox,
};

/// A resolved call target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    /// Call through the member's dispatch stub.
    Stub(ClassId, MemberIndex),
    /// Call the preserved original body, bypassing the binding.
    Original(ClassId, MemberIndex),
}

impl Target {
    fn parts(self) -> (ClassId, MemberIndex) {
        match self {
            Target::Stub(class, index) | Target::Original(class, index) => (class, index),
        }
    }
}

fn member<'s>(state: &'s SandboxState, class: ClassId, index: MemberIndex) -> Result<&'s MemberDescriptor> {
    let loaded = state.loaded(class)?;
    loaded.descriptor().member(index).ok_or_else(|| Error::UnknownMember {
        class: loaded.descriptor().name().to_string(),
        member: format!("#{index}"),
    })
}

/// Resolves `signature` starting at `start` and walking up the superclasses.
///
/// On instrumented classes, preserved entry names resolve to the original body.
pub(crate) fn resolve(state: &SandboxState, start: ClassId, signature: &MemberSignature) -> Result<Target> {
    for class in state.classes().ancestry(start) {
        let loaded = state.loaded(class)?;
        if let Some(index) = loaded.descriptor().find(signature) {
            return Ok(Target::Stub(class, index));
        }
        if let Some(index) = loaded
            .as_transformed()
            .and_then(|t| t.original_entry(signature))
        {
            return Ok(Target::Original(class, index));
        }
    }

    Err(Error::UnknownMember {
        class: state.loaded(start)?.descriptor().name().to_string(),
        member: signature.to_string(),
    })
}

/// Checks arguments against parameter types, including object ownership and
/// subclass relationships.
pub(crate) fn check_args(
    state: &SandboxState,
    signature: &MemberSignature,
    args: &[Value],
) -> Result<()> {
    let params = signature.params();
    if params.len() != args.len() {
        return Err(Error::ArgumentMismatch {
            member: signature.to_string(),
            message: format!("expected {} arguments, got {}", params.len(), args.len()),
        });
    }

    for (i, (value, ty)) in args.iter().zip(params).enumerate() {
        if !value.conforms_to(ty) {
            return Err(Error::ArgumentMismatch {
                member: signature.to_string(),
                message: format!("argument {i} is {}, expected {ty}", value.kind_name()),
            });
        }
        if let Value::Object(obj) = value {
            state.check_owner(obj)?;
            if let TypeDesc::Object(declared) = ty {
                if let Some(declared_id) = state.classes().id(declared) {
                    let actual = state.heap.class_of(obj.id())?;
                    if !state.classes().is_subclass(actual, declared_id) {
                        return Err(Error::ArgumentMismatch {
                            member: signature.to_string(),
                            message: format!("argument {i} is a {}, expected {declared}", obj.class_name()),
                        });
                    }
                }
            }
        }
    }
    Ok(())
}

/// Runs the static initializers of `class` and its superclasses, once per sandbox.
///
/// The first failure of an initializer is returned unchanged. Every later
/// use of that class, or of a subclass, raises `NoClassDefFoundError`.
pub(crate) fn ensure_initialized(sandbox: &Sandbox, state: &SandboxState, class: ClassId) -> Result<()> {
    let descriptor = state.loaded(class)?.descriptor();
    if state.statics.is_class_failed(class)? {
        return Err(raise!(
            "NoClassDefFoundError",
            "Could not initialize class {}",
            descriptor.name()
        ));
    }
    if state.statics.is_class_initialized(class)? {
        return Ok(());
    }
    if let Some(superclass) = state.classes().superclass(class) {
        ensure_initialized(sandbox, state, superclass)?;
    }
    if !state.statics.mark_class_initialized(class)? {
        return Ok(());
    }

    if let Some(initializer) = descriptor.static_initializer() {
        trace!("{} initializing {}", sandbox.id(), descriptor.name());
        let signature = MemberSignature::new("<clinit>", []);
        if let Err(err) = initializer(&Invocation::new(sandbox, descriptor.name(), &signature, None, &[])) {
            debug!("{} static initializer of {} failed: {}", sandbox.id(), descriptor.name(), err);
            state.statics.mark_class_failed(class)?;
            return Err(err);
        }
    }
    Ok(())
}

/// Calls a resolved target.
pub(crate) fn call(
    sandbox: &Sandbox,
    state: &SandboxState,
    target: Target,
    this: Option<&ObjectRef>,
    args: &[Value],
) -> Result<Value> {
    let (class, index) = target.parts();
    let loaded = state.loaded(class)?;
    let member = member(state, class, index)?;
    ensure_initialized(sandbox, state, class)?;

    let class_name = loaded.descriptor().name();
    let invocation = Invocation::new(sandbox, class_name, member.signature(), this, args);

    if let Target::Original(..) = target {
        trace!("{} {}.{} -> original", sandbox.id(), class_name, member.signature());
        return run_original(loaded, member, index, &invocation);
    }

    match loaded {
        LoadedClass::Plain(_) => match member.kind().body() {
            Some(body) => body(&invocation),
            None => Err(Error::UnsatisfiedLink {
                class: class_name.to_string(),
                member: member.signature().to_string(),
            }),
        },
        LoadedClass::Instrumented(_) => {
            let entry = state.bindings().entry(class, index).ok_or_else(|| {
                Error::Error(format!("No binding for {class_name}.{}", member.signature()))
            })?;
            trace!(
                "{} {}.{} -> {}",
                sandbox.id(),
                class_name,
                member.signature(),
                entry.policy()
            );

            match entry.binding() {
                Binding::Shadow { shadow, handler } => {
                    call_shadow(state, class, *shadow, handler, invocation)
                }
                Binding::PassThrough(body) => body(&invocation),
                Binding::NoOp(ty) => Ok(ty.default_value()),
            }
        }
    }
}

/// Runs the preserved original body of a member.
pub(crate) fn run_original(
    loaded: &LoadedClass,
    member: &MemberDescriptor,
    index: MemberIndex,
    invocation: &Invocation<'_>,
) -> Result<Value> {
    let body = loaded
        .original(index)
        .ok_or_else(|| Error::DirectCallOnNative {
            class: loaded.descriptor().name().to_string(),
            member: member.signature().to_string(),
        })?;
    body(invocation)
}

fn call_shadow(
    state: &SandboxState,
    class: ClassId,
    shadow: ShadowId,
    handler: &ShadowHandler,
    invocation: Invocation<'_>,
) -> Result<Value> {
    let shadow_class = state
        .registry()
        .get(shadow)
        .ok_or_else(|| Error::Error(format!("Unknown {shadow}")))?;
    let invocation = invocation.in_shadow(shadow, shadow_class.name());

    match handler {
        ShadowHandler::Static(handler) => handler(&invocation),
        ShadowHandler::Instance(handler) | ShadowHandler::Constructor(handler) => {
            let this = invocation.this()?;
            let cell = state.associations.get_or_create(this.id(), class, shadow_class);
            handler(&*cell, &invocation)
        }
    }
}

/// Virtual call on an instance.
pub(crate) fn invoke(
    sandbox: &Sandbox,
    state: &SandboxState,
    obj: &ObjectRef,
    signature: &MemberSignature,
    args: &[Value],
) -> Result<Value> {
    state.check_owner(obj)?;
    if signature.is_constructor() {
        return Err(Error::CallKind {
            member: signature.to_string(),
            message: "constructors run through new_instance or a direct handle",
        });
    }

    let class = state.heap.class_of(obj.id())?;
    let target = resolve(state, class, signature)?;
    let (declaring, index) = target.parts();
    let member = member(state, declaring, index)?;
    if member.is_static() {
        return Err(Error::CallKind {
            member: signature.to_string(),
            message: "static member invoked on an instance",
        });
    }

    check_args(state, member.signature(), args)?;
    call(sandbox, state, target, Some(obj), args)
}

/// Static call on a class.
pub(crate) fn invoke_static(
    sandbox: &Sandbox,
    state: &SandboxState,
    class: &str,
    signature: &MemberSignature,
    args: &[Value],
) -> Result<Value> {
    let class = state.class_id(class)?;
    let target = resolve(state, class, signature)?;
    let (declaring, index) = target.parts();
    let member = member(state, declaring, index)?;
    if !member.is_static() {
        return Err(Error::CallKind {
            member: signature.to_string(),
            message: "instance member invoked without a receiver",
        });
    }

    check_args(state, member.signature(), args)?;
    call(sandbox, state, target, None, args)
}

/// Picks the single constructor of `class` the arguments conform to.
fn select_constructor(state: &SandboxState, class: ClassId, args: &[Value]) -> Result<MemberIndex> {
    let descriptor = state.loaded(class)?.descriptor();
    let mut candidates = descriptor.members().iter().enumerate().filter(|(_, m)| {
        m.is_constructor()
            && m.signature().params().len() == args.len()
            && args
                .iter()
                .zip(m.signature().params())
                .all(|(v, t)| v.conforms_to(t))
    });

    match (candidates.next(), candidates.next()) {
        (Some((index, _)), None) => Ok(index),
        (None, _) => Err(Error::UnknownMember {
            class: descriptor.name().to_string(),
            member: format!(
                "<init> taking ({})",
                args.iter().map(Value::kind_name).collect::<Vec<_>>().join(", ")
            ),
        }),
        (Some(_), Some(_)) => Err(Error::ArgumentMismatch {
            member: format!("{}.<init>", descriptor.name()),
            message: "arguments match more than one constructor".to_string(),
        }),
    }
}

/// Allocates and constructs an instance.
///
/// No-argument constructors of the superclasses run first, root first, the
/// way an implicit `super()` call would. Associations for every shadowed
/// class in the hierarchy are created before any constructor runs.
pub(crate) fn new_instance(
    sandbox: &Sandbox,
    state: &SandboxState,
    class_name: &str,
    args: &[Value],
) -> Result<ObjectRef> {
    let class = state.class_id(class_name)?;
    let descriptor = state.loaded(class)?.descriptor();
    if descriptor.modifiers().contains(ClassModifiers::ABSTRACT) {
        return Err(Error::CallKind {
            member: format!("{class_name}.<init>"),
            message: "abstract classes cannot be instantiated",
        });
    }

    let index = select_constructor(state, class, args)?;
    let constructor = member(state, class, index)?;
    check_args(state, constructor.signature(), args)?;
    ensure_initialized(sandbox, state, class)?;

    let obj = ObjectRef::new(sandbox.id(), state.heap.alloc(class), descriptor.shared_name());
    trace!("{} new {}", sandbox.id(), obj);

    for ancestor in state.classes().ancestry(class) {
        if let Some(shadow) = state.bindings().shadow_of(ancestor) {
            if let Some(shadow_class) = state.registry().get(shadow) {
                state.associations.get_or_create(obj.id(), ancestor, shadow_class);
            }
        }
    }

    let mut supers: Vec<ClassId> = state.classes().ancestry(class).skip(1).collect();
    supers.reverse();
    let default_constructor = MemberSignature::constructor([]);
    for superclass in supers {
        if let Some(super_index) = state.loaded(superclass)?.descriptor().find(&default_constructor) {
            call(sandbox, state, Target::Stub(superclass, super_index), Some(&obj), &[])?;
        }
    }

    call(sandbox, state, Target::Stub(class, index), Some(&obj), args)?;
    Ok(obj)
}

/// Finds the shadow state of `obj` of type `S` and runs `f` on it.
pub(crate) fn with_shadow<S, R>(
    state: &SandboxState,
    obj: &ObjectRef,
    f: impl FnOnce(&mut S) -> R,
) -> Result<R>
where
    S: 'static,
{
    state.check_owner(obj)?;
    let class = state.heap.class_of(obj.id())?;

    let shadowed: Vec<(ClassId, ShadowId)> = state
        .classes()
        .ancestry(class)
        .filter_map(|c| state.bindings().shadow_of(c).map(|s| (c, s)))
        .collect();
    let (_, first_shadow) = *shadowed
        .first()
        .ok_or_else(|| Error::NoShadow(obj.class_name().to_string()))?;

    let (declaring, shadow) = shadowed
        .iter()
        .copied()
        .find(|(_, s)| state.registry().get(*s).is_some_and(|sc| sc.holds::<S>()))
        .ok_or_else(|| Error::ShadowStateMismatch {
            shadow: state
                .registry()
                .get(first_shadow)
                .map_or_else(|| first_shadow.to_string(), |s| s.name().to_string()),
            expected: type_name::<S>(),
        })?;

    let shadow_class = state
        .registry()
        .get(shadow)
        .ok_or_else(|| Error::Error(format!("Unknown {shadow}")))?;
    let cell = state.associations.get_or_create(obj.id(), declaring, shadow_class);
    ShadowRef::<S>::new(&cell, shadow_class.name()).with(f)
}
