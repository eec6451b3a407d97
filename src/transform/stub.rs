use std::fmt;

use crate::{
    model::{MemberDescriptor, MemberIndex, MemberSignature},
    transform::ClassId,
};

/// Prefix of the entry names under which original method bodies are preserved.
pub const ORIGINAL_PREFIX: &str = "$$shadowbox$original$";

/// The replacement installed in place of a member body.
///
/// A stub only knows which slot of the binding table it routes through;
/// the policy itself is resolved by the binder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchStub {
    class: ClassId,
    member: MemberIndex,
    signature: MemberSignature,
    is_static: bool,
}

impl DispatchStub {
    pub(crate) fn new(class: ClassId, member: MemberIndex, descriptor: &MemberDescriptor) -> Self {
        Self {
            class,
            member,
            signature: descriptor.signature().clone(),
            is_static: descriptor.is_static(),
        }
    }

    /// The class the stub is installed in.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// The member slot the stub routes through.
    #[must_use]
    pub fn member(&self) -> MemberIndex {
        self.member
    }

    /// The intercepted member.
    #[must_use]
    pub fn signature(&self) -> &MemberSignature {
        &self.signature
    }

    /// Whether the intercepted member is static.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }
}

impl fmt::Display for DispatchStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stub#{}:{} {}", self.class.0, self.member, self.signature)
    }
}
