//! Real class definitions, the class path, and planned class descriptors.
//!
//! A [`RealClass`] is the static definition of a platform class: its name,
//! superclass, modifiers and members. Definitions live on a [`ClassPath`],
//! from which every sandbox loads its own copy.
//!
//! During planning each class is enumerated into a [`RealClassDescriptor`],
//! which adds the implicit constructor where needed, builds the signature
//! index and records whether the class is instrumented.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    sync::Arc,
};

use bitflags::bitflags;

use crate::{
    model::{MemberDescriptor, MemberSignature, TypeDesc, Value},
    runtime::Invocation,
    Result,
};

bitflags! {
    /// Modifiers of a real class.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ClassModifiers: u8 {
        /// Class cannot be subclassed. Cleared on instrumented classes.
        const FINAL = 0x01;
        /// Class cannot be instantiated.
        const ABSTRACT = 0x02;
    }
}

/// Position of a member within its class descriptor.
pub type MemberIndex = usize;

/// Returns the package portion of a fully-qualified class name.
///
/// # Examples
///
/// ```rust
/// use shadowbox::model::package_of;
///
/// assert_eq!(package_of("android.media.MediaCodec"), "android.media");
/// assert_eq!(package_of("Toplevel"), "");
/// ```
#[must_use]
pub fn package_of(class: &str) -> &str {
    class.rfind('.').map_or("", |pos| &class[..pos])
}

/// Static definition of a real class.
#[derive(Clone)]
pub struct RealClass {
    name: String,
    superclass: Option<String>,
    modifiers: ClassModifiers,
    members: Vec<MemberDescriptor>,
    static_initializer: Option<crate::model::Body>,
}

impl fmt::Debug for RealClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealClass")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("modifiers", &self.modifiers)
            .field("members", &self.members)
            .field("static_initializer", &self.static_initializer.is_some())
            .finish()
    }
}

impl RealClass {
    /// Starts building a class with the given fully-qualified name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> RealClassBuilder {
        RealClassBuilder {
            class: RealClass {
                name: name.into(),
                superclass: None,
                modifiers: ClassModifiers::empty(),
                members: Vec::new(),
                static_initializer: None,
            },
        }
    }

    /// The fully-qualified class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The package the class belongs to.
    #[must_use]
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// The superclass name, if any.
    #[must_use]
    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    /// The class modifiers.
    #[must_use]
    pub fn modifiers(&self) -> ClassModifiers {
        self.modifiers
    }

    /// The declared members.
    #[must_use]
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// The static initializer, if declared.
    #[must_use]
    pub fn static_initializer(&self) -> Option<&crate::model::Body> {
        self.static_initializer.as_ref()
    }
}

/// Fluent builder for [`RealClass`].
///
/// # Examples
///
/// ```rust
/// use shadowbox::model::{RealClass, TypeDesc, Value};
///
/// let greeter = RealClass::builder("demo.Greeter")
///     .native("hail", [TypeDesc::String], TypeDesc::String)
///     .method("echo", [TypeDesc::String], TypeDesc::String, |inv| Ok(inv.arg(0)?.clone()))
///     .build()?;
///
/// assert_eq!(greeter.package(), "demo");
/// assert_eq!(greeter.members().len(), 2);
/// # Ok::<(), shadowbox::Error>(())
/// ```
pub struct RealClassBuilder {
    class: RealClass,
}

impl RealClassBuilder {
    /// Sets the superclass.
    #[must_use]
    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.class.superclass = Some(superclass.into());
        self
    }

    /// Marks the class final.
    #[must_use]
    pub fn final_class(mut self) -> Self {
        self.class.modifiers |= ClassModifiers::FINAL;
        self
    }

    /// Marks the class abstract.
    #[must_use]
    pub fn abstract_class(mut self) -> Self {
        self.class.modifiers |= ClassModifiers::ABSTRACT;
        self
    }

    /// Adds a fully described member.
    #[must_use]
    pub fn member(mut self, member: MemberDescriptor) -> Self {
        self.class.members.push(member);
        self
    }

    /// Adds a public instance method with a body.
    #[must_use]
    pub fn method<F>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
        body: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.member(MemberDescriptor::method(name, params, return_type, body))
    }

    /// Adds a public static method with a body.
    #[must_use]
    pub fn static_method<F>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
        body: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.member(MemberDescriptor::method(name, params, return_type, body).with_static())
    }

    /// Adds a public native instance method.
    #[must_use]
    pub fn native(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
    ) -> Self {
        self.member(MemberDescriptor::native(name, params, return_type))
    }

    /// Adds a public native static method.
    #[must_use]
    pub fn static_native(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
    ) -> Self {
        self.member(MemberDescriptor::native(name, params, return_type).with_static())
    }

    /// Adds a public constructor.
    #[must_use]
    pub fn constructor<F>(self, params: impl IntoIterator<Item = TypeDesc>, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.member(MemberDescriptor::constructor(params, body))
    }

    /// Sets the static initializer, run once per sandbox on first use of the class.
    #[must_use]
    pub fn static_initializer<F>(mut self, body: F) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.class.static_initializer = Some(Arc::new(body));
        self
    }

    /// Finishes the class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::DuplicateMember`] if two members share a
    /// signature.
    pub fn build(self) -> Result<RealClass> {
        let mut seen = HashSet::new();
        for member in &self.class.members {
            if !seen.insert(member.signature().clone()) {
                return Err(config_error!(DuplicateMember {
                    class: self.class.name.as_str(),
                    member: member.signature().to_string(),
                }));
            }
        }
        Ok(self.class)
    }
}

/// The set of real classes a sandbox can load.
///
/// Classes are kept sorted by name so planning output is deterministic.
#[derive(Clone, Debug, Default)]
pub struct ClassPath {
    classes: BTreeMap<String, Arc<RealClass>>,
}

impl ClassPath {
    /// Creates an empty class path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::DuplicateClass`] if a class with the same
    /// name is already present.
    pub fn add(&mut self, class: RealClass) -> Result<()> {
        if self.classes.contains_key(class.name()) {
            return Err(config_error!(DuplicateClass(class.name())));
        }
        self.classes.insert(class.name().to_string(), Arc::new(class));
        Ok(())
    }

    /// Adds a class, builder style.
    ///
    /// # Errors
    ///
    /// See [`ClassPath::add`].
    pub fn with(mut self, class: RealClass) -> Result<Self> {
        self.add(class)?;
        Ok(self)
    }

    /// Looks up a class by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<RealClass>> {
        self.classes.get(name)
    }

    /// Returns `true` if the class is on the class path.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Iterates classes in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RealClass>> {
        self.classes.values()
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if the class path is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// A class as enumerated by the planner for one sandbox.
///
/// Immutable once built. Member indices are stable and are used by the
/// transformer and the binding table.
#[derive(Clone)]
pub struct RealClassDescriptor {
    name: Arc<str>,
    package: String,
    superclass: Option<String>,
    modifiers: ClassModifiers,
    members: Vec<MemberDescriptor>,
    index: HashMap<MemberSignature, MemberIndex>,
    static_initializer: Option<crate::model::Body>,
    instrumented: bool,
}

impl fmt::Debug for RealClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealClassDescriptor")
            .field("name", &self.name)
            .field("superclass", &self.superclass)
            .field("modifiers", &self.modifiers)
            .field("members", &self.members)
            .field("instrumented", &self.instrumented)
            .finish_non_exhaustive()
    }
}

impl RealClassDescriptor {
    /// Enumerates a class definition.
    ///
    /// A class that declares no constructor receives an implicit public
    /// no-argument constructor with an empty body.
    #[must_use]
    pub fn enumerate(class: &RealClass, instrumented: bool) -> Self {
        let mut members = class.members().to_vec();
        if !members.iter().any(MemberDescriptor::is_constructor) {
            members.push(MemberDescriptor::implicit_constructor());
        }

        let index = members
            .iter()
            .enumerate()
            .map(|(i, m)| (m.signature().clone(), i))
            .collect();

        Self {
            name: Arc::from(class.name()),
            package: class.package().to_string(),
            superclass: class.superclass().map(str::to_string),
            modifiers: class.modifiers(),
            members,
            index,
            static_initializer: class.static_initializer().cloned(),
            instrumented,
        }
    }

    /// The fully-qualified class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    /// The owning package.
    #[must_use]
    pub fn package(&self) -> &str {
        &self.package
    }

    /// The superclass name.
    #[must_use]
    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    /// The class modifiers.
    #[must_use]
    pub fn modifiers(&self) -> ClassModifiers {
        self.modifiers
    }

    pub(crate) fn clear_modifiers(&mut self, modifiers: ClassModifiers) {
        self.modifiers.remove(modifiers);
    }

    /// All members, including the implicit constructor.
    #[must_use]
    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    /// Returns a member by index.
    #[must_use]
    pub fn member(&self, index: MemberIndex) -> Option<&MemberDescriptor> {
        self.members.get(index)
    }

    /// Finds a member index by signature.
    #[must_use]
    pub fn find(&self, signature: &MemberSignature) -> Option<MemberIndex> {
        self.index.get(signature).copied()
    }

    /// The static initializer.
    #[must_use]
    pub fn static_initializer(&self) -> Option<&crate::model::Body> {
        self.static_initializer.as_ref()
    }

    /// Whether the class is selected for instrumentation.
    #[must_use]
    pub fn instrumented(&self) -> bool {
        self.instrumented
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConfigError;

    #[test]
    fn test_implicit_constructor() {
        let class = RealClass::builder("a.b.Plain")
            .native("x", [], TypeDesc::Void)
            .build()
            .unwrap();
        let desc = RealClassDescriptor::enumerate(&class, false);

        assert_eq!(desc.members().len(), 2);
        assert!(desc.find(&MemberSignature::constructor([])).is_some());
        assert_eq!(desc.package(), "a.b");
        assert!(!desc.instrumented());
    }

    #[test]
    fn test_explicit_constructor_suppresses_implicit() {
        let class = RealClass::builder("a.WithCtor")
            .constructor([TypeDesc::String], |_| Ok(Value::Void))
            .build()
            .unwrap();
        let desc = RealClassDescriptor::enumerate(&class, true);

        assert_eq!(desc.members().len(), 1);
        assert!(desc.find(&MemberSignature::constructor([])).is_none());
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let result = RealClass::builder("a.Dup")
            .native("x", [TypeDesc::Int], TypeDesc::Void)
            .native("x", [TypeDesc::Int], TypeDesc::Int)
            .build();

        assert!(matches!(
            result,
            Err(crate::Error::Config(ConfigError::DuplicateMember { .. }))
        ));
    }

    #[test]
    fn test_debug_skips_bodies() {
        let class = RealClass::builder("a.Init")
            .static_initializer(|_| Ok(Value::Void))
            .method("x", [], TypeDesc::Int, |_| Ok(Value::Int(1)))
            .build()
            .unwrap();
        let desc = RealClassDescriptor::enumerate(&class, true);

        let class_debug = format!("{class:?}");
        assert!(class_debug.starts_with("RealClass {"));
        assert!(class_debug.contains("static_initializer: true"));
        let desc_debug = format!("{desc:?}");
        assert!(desc_debug.contains("\"a.Init\""));
        assert!(desc_debug.contains("instrumented: true"));
        assert!(desc_debug.ends_with(".. }"));
    }

    #[test]
    fn test_class_path() {
        let mut cp = ClassPath::new();
        cp.add(RealClass::builder("b.Second").build().unwrap()).unwrap();
        cp.add(RealClass::builder("a.First").build().unwrap()).unwrap();

        let names: Vec<_> = cp.iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["a.First", "b.Second"]);
        assert!(cp.add(RealClass::builder("a.First").build().unwrap()).is_err());
    }
}
