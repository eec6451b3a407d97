//! Dynamic values, type descriptors and object handles.
//!
//! Every argument and return value crossing a dispatch stub is a [`Value`].
//! Parameter and return types are described by [`TypeDesc`], which also knows
//! the default value an unshadowed native member yields.
//!
//! # Type Defaults
//!
//! | Type | Default |
//! |------|---------|
//! | `void` | [`Value::Void`] |
//! | `boolean` | `false` |
//! | `int`, `long`, `double` | zero |
//! | `String`, `byte[]`, objects | [`Value::Null`] |

use std::{fmt, hash::Hash, sync::Arc};

use strum::EnumIs;

/// Identity of a sandbox.
///
/// Identifiers are unique for the lifetime of the process, so a handle from a
/// destroyed sandbox can never be mistaken for one from a newer sandbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SandboxId(u64);

impl SandboxId {
    pub(crate) const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sandbox#{}", self.0)
    }
}

/// Index of an instance within its sandbox heap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) usize);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Handle to an instance of a real class inside one sandbox.
///
/// The handle remembers which sandbox allocated it. Using it in any other
/// sandbox, or after its sandbox was torn down, is an isolation violation.
#[derive(Clone, Debug)]
pub struct ObjectRef {
    sandbox: SandboxId,
    id: ObjectId,
    class: Arc<str>,
}

impl ObjectRef {
    pub(crate) fn new(sandbox: SandboxId, id: ObjectId, class: Arc<str>) -> Self {
        Self { sandbox, id, class }
    }

    /// The sandbox that owns this instance.
    #[must_use]
    pub fn sandbox(&self) -> SandboxId {
        self.sandbox
    }

    /// The heap index of this instance.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The runtime class of this instance.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.sandbox == other.sandbox && self.id == other.id
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.sandbox.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.class, self.id)
    }
}

/// Parameter and return type of a member.
///
/// Types participate in member identity: two members with the same name but
/// different parameter types are different members.
#[derive(Clone, Debug, PartialEq, Eq, Hash, EnumIs)]
pub enum TypeDesc {
    /// No value (return type only).
    Void,
    /// `boolean`
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 64-bit float.
    Double,
    /// Character string.
    String,
    /// Byte array.
    Bytes,
    /// Any reference or primitive value.
    Any,
    /// Instance of the named class or one of its subclasses.
    Object(String),
}

impl TypeDesc {
    /// Creates an object type for the named class.
    #[must_use]
    pub fn object(class: impl Into<String>) -> Self {
        TypeDesc::Object(class.into())
    }

    /// Returns `true` for types whose values may be [`Value::Null`].
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            TypeDesc::String | TypeDesc::Bytes | TypeDesc::Any | TypeDesc::Object(_)
        )
    }

    /// Returns the zero/false/null-equivalent value for this type.
    ///
    /// This is what an unshadowed native member of an instrumented class
    /// returns.
    #[must_use]
    pub fn default_value(&self) -> Value {
        match self {
            TypeDesc::Void => Value::Void,
            TypeDesc::Bool => Value::Bool(false),
            TypeDesc::Int => Value::Int(0),
            TypeDesc::Long => Value::Long(0),
            TypeDesc::Double => Value::Double(0.0),
            TypeDesc::String | TypeDesc::Bytes | TypeDesc::Any | TypeDesc::Object(_) => Value::Null,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Void => f.write_str("void"),
            TypeDesc::Bool => f.write_str("boolean"),
            TypeDesc::Int => f.write_str("int"),
            TypeDesc::Long => f.write_str("long"),
            TypeDesc::Double => f.write_str("double"),
            TypeDesc::String => f.write_str("String"),
            TypeDesc::Bytes => f.write_str("byte[]"),
            TypeDesc::Any => f.write_str("any"),
            TypeDesc::Object(class) => f.write_str(class),
        }
    }
}

/// A dynamically typed value passed to or returned from a member.
#[derive(Clone, Debug, PartialEq, EnumIs)]
pub enum Value {
    /// Result of a `void` member.
    Void,
    /// The null reference.
    Null,
    /// `boolean`
    Bool(bool),
    /// 32-bit signed integer.
    Int(i32),
    /// 64-bit signed integer.
    Long(i64),
    /// 64-bit float.
    Double(f64),
    /// Character string.
    Str(String),
    /// Byte array.
    Bytes(Vec<u8>),
    /// Instance of a real class.
    Object(ObjectRef),
}

impl Value {
    /// Short name of the value's kind, used in diagnostics.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Double(_) => "double",
            Value::Str(_) => "String",
            Value::Bytes(_) => "byte[]",
            Value::Object(_) => "object",
        }
    }

    /// Structural type check.
    ///
    /// Objects conform to any object type here; subclass checks need the
    /// sandbox's class hierarchy and are done by the dispatch runtime.
    #[must_use]
    pub fn conforms_to(&self, ty: &TypeDesc) -> bool {
        match (self, ty) {
            (Value::Void, TypeDesc::Void) => true,
            (Value::Void, _) | (_, TypeDesc::Void) => false,
            (_, TypeDesc::Any) => true,
            (Value::Null, ty) => ty.is_reference(),
            (Value::Bool(_), TypeDesc::Bool)
            | (Value::Int(_), TypeDesc::Int)
            | (Value::Long(_), TypeDesc::Long)
            | (Value::Double(_), TypeDesc::Double)
            | (Value::Str(_), TypeDesc::String)
            | (Value::Bytes(_), TypeDesc::Bytes)
            | (Value::Object(_), TypeDesc::Object(_)) => true,
            _ => false,
        }
    }

    /// Returns the boolean payload.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `int` payload.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `long` payload, widening `int` values.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            Value::Int(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Returns the `double` payload.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the byte array payload.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the object handle.
    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<ObjectRef> for Value {
    fn from(v: ObjectRef) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_defaults() {
        assert_eq!(TypeDesc::Void.default_value(), Value::Void);
        assert_eq!(TypeDesc::Bool.default_value(), Value::Bool(false));
        assert_eq!(TypeDesc::Int.default_value(), Value::Int(0));
        assert_eq!(TypeDesc::Long.default_value(), Value::Long(0));
        assert_eq!(TypeDesc::Double.default_value(), Value::Double(0.0));
        assert_eq!(TypeDesc::String.default_value(), Value::Null);
        assert_eq!(TypeDesc::object("a.B").default_value(), Value::Null);
    }

    #[test]
    fn test_conformance() {
        assert!(Value::Int(1).conforms_to(&TypeDesc::Int));
        assert!(!Value::Int(1).conforms_to(&TypeDesc::Long));
        assert!(Value::Null.conforms_to(&TypeDesc::String));
        assert!(!Value::Null.conforms_to(&TypeDesc::Int));
        assert!(Value::from("x").conforms_to(&TypeDesc::Any));
        assert!(!Value::Void.conforms_to(&TypeDesc::Any));
    }

    #[test]
    fn test_object_ref_identity() {
        let a = ObjectRef::new(SandboxId::new(1), ObjectId(3), Arc::from("a.B"));
        let b = ObjectRef::new(SandboxId::new(1), ObjectId(3), Arc::from("a.B"));
        let c = ObjectRef::new(SandboxId::new(2), ObjectId(3), Arc::from("a.B"));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "a.B@3");
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from(7).as_long(), Some(7));
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert!(Value::Null.is_null());
    }
}
