//! Member descriptors for methods and constructors of real classes.
//!
//! A member is identified by its [`MemberSignature`] (name plus ordered
//! parameter types). Return type, visibility and modifiers are carried on the
//! [`MemberDescriptor`] and validated, but never used for matching.
//!
//! The implementation of a member is described by [`MemberKind`]:
//!
//! | Kind | Original body | Unshadowed policy when instrumented |
//! |------|---------------|-------------------------------------|
//! | [`MemberKind::Native`] | none | no-op, returns the type default |
//! | [`MemberKind::WithBody`] | preserved | pass-through |
//! | [`MemberKind::Constructor`] | preserved | pass-through |

use std::{fmt, sync::Arc};

use bitflags::bitflags;
use strum::{AsRefStr, Display, EnumIter};

use crate::{
    model::{TypeDesc, Value},
    runtime::Invocation,
    Result,
};

/// Name used for constructor signatures.
pub const CONSTRUCTOR_NAME: &str = "<init>";

/// An executable member body.
///
/// Bodies receive the [`Invocation`] describing the call (receiver, arguments
/// and the sandbox they run in) and return the member's result.
pub type Body = Arc<dyn Fn(&Invocation<'_>) -> Result<Value> + Send + Sync>;

/// Member visibility.
///
/// Visibility affects callers outside the engine only: protected and package
/// members are transformed and dispatched exactly like public ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum Visibility {
    /// Visible everywhere.
    #[default]
    Public,
    /// Visible to subclasses.
    Protected,
    /// Visible within the package.
    Package,
    /// Visible within the class.
    Private,
}

bitflags! {
    /// Modifiers of a member that are independent of its kind.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MemberModifiers: u8 {
        /// Member belongs to the class rather than an instance.
        const STATIC = 0x01;
        /// Member cannot be overridden.
        const FINAL = 0x02;
        /// Member is synchronized on its receiver.
        const SYNCHRONIZED = 0x04;
    }
}

/// Identity of a member: name and ordered parameter types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MemberSignature {
    name: String,
    params: Vec<TypeDesc>,
}

impl MemberSignature {
    /// Creates a method signature.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shadowbox::model::{MemberSignature, TypeDesc};
    ///
    /// let sig = MemberSignature::new("hail", [TypeDesc::String]);
    /// assert_eq!(sig.to_string(), "hail(String)");
    /// ```
    #[must_use]
    pub fn new(name: impl Into<String>, params: impl IntoIterator<Item = TypeDesc>) -> Self {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
        }
    }

    /// Creates a constructor signature.
    #[must_use]
    pub fn constructor(params: impl IntoIterator<Item = TypeDesc>) -> Self {
        Self::new(CONSTRUCTOR_NAME, params)
    }

    /// The member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The ordered parameter types.
    #[must_use]
    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    /// Returns `true` if this is a constructor signature.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// Returns a signature with the same parameters under another name.
    #[must_use]
    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: self.params.clone(),
        }
    }
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        f.write_str(")")
    }
}

/// How a member is implemented.
#[derive(Clone)]
pub enum MemberKind {
    /// No body; the platform provides the implementation.
    Native,
    /// An ordinary method with a body.
    WithBody(Body),
    /// A constructor with its initialization body.
    Constructor(Body),
}

impl MemberKind {
    /// Returns the original body, if the member has one.
    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        match self {
            MemberKind::Native => None,
            MemberKind::WithBody(body) | MemberKind::Constructor(body) => Some(body),
        }
    }
}

impl fmt::Debug for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberKind::Native => f.write_str("Native"),
            MemberKind::WithBody(_) => f.write_str("WithBody(..)"),
            MemberKind::Constructor(_) => f.write_str("Constructor(..)"),
        }
    }
}

/// Full description of a method or constructor.
#[derive(Clone, Debug)]
pub struct MemberDescriptor {
    signature: MemberSignature,
    return_type: TypeDesc,
    visibility: Visibility,
    modifiers: MemberModifiers,
    kind: MemberKind,
}

impl MemberDescriptor {
    /// Creates a public instance method with a body.
    ///
    /// # Arguments
    ///
    /// * `name` - The method name
    /// * `params` - Ordered parameter types
    /// * `return_type` - The declared return type
    /// * `body` - The method implementation
    #[must_use]
    pub fn method<F>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
        body: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            signature: MemberSignature::new(name, params),
            return_type,
            visibility: Visibility::Public,
            modifiers: MemberModifiers::empty(),
            kind: MemberKind::WithBody(Arc::new(body)),
        }
    }

    /// Creates a public native instance method.
    #[must_use]
    pub fn native(
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
    ) -> Self {
        Self {
            signature: MemberSignature::new(name, params),
            return_type,
            visibility: Visibility::Public,
            modifiers: MemberModifiers::empty(),
            kind: MemberKind::Native,
        }
    }

    /// Creates a public constructor.
    #[must_use]
    pub fn constructor<F>(params: impl IntoIterator<Item = TypeDesc>, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            signature: MemberSignature::constructor(params),
            return_type: TypeDesc::Void,
            visibility: Visibility::Public,
            modifiers: MemberModifiers::empty(),
            kind: MemberKind::Constructor(Arc::new(body)),
        }
    }

    /// Creates the implicit no-argument constructor with an empty body.
    #[must_use]
    pub fn implicit_constructor() -> Self {
        Self::constructor([], |_| Ok(Value::Void))
    }

    /// Marks the member static.
    #[must_use]
    pub fn with_static(mut self) -> Self {
        self.modifiers |= MemberModifiers::STATIC;
        self
    }

    /// Sets the member visibility.
    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Adds modifiers to the member.
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: MemberModifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// The member identity.
    #[must_use]
    pub fn signature(&self) -> &MemberSignature {
        &self.signature
    }

    /// The member name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.signature.name()
    }

    /// The declared return type.
    #[must_use]
    pub fn return_type(&self) -> &TypeDesc {
        &self.return_type
    }

    /// The member visibility.
    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// The member modifiers.
    #[must_use]
    pub fn modifiers(&self) -> MemberModifiers {
        self.modifiers
    }

    /// The member implementation kind.
    #[must_use]
    pub fn kind(&self) -> &MemberKind {
        &self.kind
    }

    /// Returns `true` for static members.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers.contains(MemberModifiers::STATIC)
    }

    /// Returns `true` for native members.
    #[must_use]
    pub fn is_native(&self) -> bool {
        matches!(self.kind, MemberKind::Native)
    }

    /// Returns `true` for constructors.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        matches!(self.kind, MemberKind::Constructor(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_signature_display() {
        let sig = MemberSignature::new("ride", [TypeDesc::String, TypeDesc::Int]);
        assert_eq!(sig.to_string(), "ride(String, int)");
        assert_eq!(MemberSignature::constructor([]).to_string(), "<init>()");
    }

    #[test]
    fn test_signature_identity_ignores_nothing_but_name_and_params() {
        let a = MemberSignature::new("plus", [TypeDesc::Int]);
        let b = MemberSignature::new("plus", [TypeDesc::Long]);
        assert_ne!(a, b);
        assert_eq!(a, a.renamed("plus"));
    }

    #[test]
    fn test_descriptor_kinds() {
        let native = MemberDescriptor::native("getColor", [], TypeDesc::Int);
        assert!(native.is_native());
        assert!(native.kind().body().is_none());

        let ctor = MemberDescriptor::implicit_constructor();
        assert!(ctor.is_constructor());
        assert!(ctor.signature().is_constructor());

        let stat = MemberDescriptor::native("get", [TypeDesc::Any], TypeDesc::Any).with_static();
        assert!(stat.is_static());
    }

    #[test]
    fn test_visibility_names() {
        let names: Vec<_> = Visibility::iter().map(|v| v.to_string()).collect();
        assert_eq!(names, vec!["public", "protected", "package", "private"]);
    }
}
