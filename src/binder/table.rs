use std::fmt;

use strum::{Display, EnumIs};

use crate::{
    binder::ShadowId,
    model::{Body, MemberIndex, MemberSignature, ShadowHandler, TypeDesc},
    transform::ClassId,
};

/// Dispatch policy of one member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIs)]
pub enum Policy {
    /// Run the bound shadow member.
    #[strum(to_string = "dispatch to shadow")]
    DispatchToShadow,
    /// Run the member's own original body.
    #[strum(to_string = "pass through")]
    PassThrough,
    /// Return the type default without running anything.
    #[strum(to_string = "no-op")]
    NoOp,
}

/// What a dispatch stub does when called.
#[derive(Clone)]
pub enum Binding {
    /// Invoke a shadow member.
    Shadow {
        /// The active shadow.
        shadow: ShadowId,
        /// The shadow implementation.
        handler: ShadowHandler,
    },
    /// Invoke the preserved original body.
    PassThrough(Body),
    /// Return the default of the given return type.
    NoOp(TypeDesc),
}

impl Binding {
    /// The policy this binding implements.
    #[must_use]
    pub fn policy(&self) -> Policy {
        match self {
            Binding::Shadow { .. } => Policy::DispatchToShadow,
            Binding::PassThrough(_) => Policy::PassThrough,
            Binding::NoOp(_) => Policy::NoOp,
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Shadow { shadow, handler } => f
                .debug_struct("Shadow")
                .field("shadow", shadow)
                .field("handler", handler)
                .finish(),
            Binding::PassThrough(_) => f.write_str("PassThrough(..)"),
            Binding::NoOp(ty) => f.debug_tuple("NoOp").field(ty).finish(),
        }
    }
}

/// The resolved binding of one real member.
#[derive(Clone, Debug)]
pub struct BindingEntry {
    member: MemberSignature,
    binding: Binding,
}

impl BindingEntry {
    pub(crate) fn new(member: MemberSignature, binding: Binding) -> Self {
        Self { member, binding }
    }

    /// The real member.
    #[must_use]
    pub fn member(&self) -> &MemberSignature {
        &self.member
    }

    /// How the member is dispatched.
    #[must_use]
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    /// The dispatch policy.
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.binding.policy()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct ClassBindings {
    pub(crate) shadow: Option<ShadowId>,
    pub(crate) entries: Vec<BindingEntry>,
}

/// Per-sandbox mapping from real members to dispatch policies.
///
/// Slots are indexed by [`ClassId`] and member index, so lookups are two
/// vector accesses. Uninstrumented classes have no slot. The table is never
/// modified after binding.
#[derive(Clone, Debug, Default)]
pub struct BindingTable {
    classes: Vec<Option<ClassBindings>>,
}

impl BindingTable {
    pub(crate) fn with_classes(count: usize) -> Self {
        Self {
            classes: vec![None; count],
        }
    }

    pub(crate) fn insert(&mut self, class: ClassId, bindings: ClassBindings) {
        if let Some(slot) = self.classes.get_mut(class.0) {
            *slot = Some(bindings);
        }
    }

    /// The binding of a member of an instrumented class.
    #[must_use]
    pub fn entry(&self, class: ClassId, member: MemberIndex) -> Option<&BindingEntry> {
        self.classes
            .get(class.0)?
            .as_ref()?
            .entries
            .get(member)
    }

    /// All bindings of an instrumented class, in member order.
    #[must_use]
    pub fn entries(&self, class: ClassId) -> Option<&[BindingEntry]> {
        self.classes
            .get(class.0)?
            .as_ref()
            .map(|c| c.entries.as_slice())
    }

    /// The shadow active on a class, if any.
    #[must_use]
    pub fn shadow_of(&self, class: ClassId) -> Option<ShadowId> {
        self.classes.get(class.0)?.as_ref()?.shadow
    }

    /// Returns `true` if the class has a binding slot.
    #[must_use]
    pub fn is_bound(&self, class: ClassId) -> bool {
        matches!(self.classes.get(class.0), Some(Some(_)))
    }

    /// Number of bound members across all classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.iter().flatten().map(|c| c.entries.len()).sum()
    }

    /// Returns `true` if no member is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
