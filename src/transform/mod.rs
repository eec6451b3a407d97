//! Class transformation.
//!
//! The transformer loads every planned class into the form a sandbox calls
//! through. Uninstrumented classes are loaded as-is. Instrumented classes get:
//!
//! - one [`DispatchStub`] per member, routing calls through the binding table
//! - the original body of every non-native member, preserved under a reserved
//!   entry name so the direct-call bridge can still reach it
//! - [`ClassModifiers::FINAL`] cleared
//!
//! # Preserved Entry Names
//!
//! | Member | Entry name |
//! |--------|------------|
//! | method `name(..)` | `$$shadowbox$original$name(..)` |
//! | constructor `<init>(..)` | `__constructor__(..)` |
//!
//! Entry names keep the parameter list of the member they preserve.

mod stub;

use std::{collections::HashMap, fmt};

use log::debug;

pub use stub::{DispatchStub, ORIGINAL_PREFIX};

use crate::{
    model::{
        Body, ClassModifiers, MemberIndex, MemberSignature, RealClassDescriptor,
        CONSTRUCTOR_METHOD_NAME,
    },
    planner::InstrumentationPlan,
    Error, Result,
};

/// Index of a loaded class inside one sandbox.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

/// Returns the preserved entry signature of a member.
///
/// # Examples
///
/// ```rust
/// use shadowbox::model::{MemberSignature, TypeDesc};
/// use shadowbox::transform::original_entry_name;
///
/// let hail = MemberSignature::new("hail", [TypeDesc::String]);
/// assert_eq!(original_entry_name(&hail).name(), "$$shadowbox$original$hail");
///
/// let init = MemberSignature::constructor([]);
/// assert_eq!(original_entry_name(&init).name(), "__constructor__");
/// ```
#[must_use]
pub fn original_entry_name(member: &MemberSignature) -> MemberSignature {
    if member.is_constructor() {
        member.renamed(CONSTRUCTOR_METHOD_NAME)
    } else {
        member.renamed(format!("{ORIGINAL_PREFIX}{}", member.name()))
    }
}

fn is_reserved(name: &str) -> bool {
    name == CONSTRUCTOR_METHOD_NAME || name.starts_with(ORIGINAL_PREFIX)
}

/// An instrumented class: stubs for every member plus preserved originals.
#[derive(Clone)]
pub struct TransformedClass {
    descriptor: RealClassDescriptor,
    stubs: Vec<DispatchStub>,
    originals: Vec<Option<Body>>,
    entries: HashMap<MemberSignature, MemberIndex>,
}

impl fmt::Debug for TransformedClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preserved = self.originals.iter().filter(|o| o.is_some()).count();
        f.debug_struct("TransformedClass")
            .field("descriptor", &self.descriptor)
            .field("stubs", &self.stubs)
            .field("preserved", &preserved)
            .finish_non_exhaustive()
    }
}

impl TransformedClass {
    fn new(id: ClassId, mut descriptor: RealClassDescriptor) -> Result<Self> {
        descriptor.clear_modifiers(ClassModifiers::FINAL);

        let mut stubs = Vec::with_capacity(descriptor.members().len());
        let mut originals = Vec::with_capacity(descriptor.members().len());
        let mut entries = HashMap::new();

        for (index, member) in descriptor.members().iter().enumerate() {
            if is_reserved(member.name()) {
                return Err(Error::ReservedName {
                    class: descriptor.name().to_string(),
                    member: member.signature().to_string(),
                });
            }

            stubs.push(DispatchStub::new(id, index, member));
            originals.push(member.kind().body().cloned());
            if member.kind().body().is_some() {
                entries.insert(original_entry_name(member.signature()), index);
            }
        }

        Ok(Self {
            descriptor,
            stubs,
            originals,
            entries,
        })
    }

    /// The class descriptor, with `FINAL` cleared.
    #[must_use]
    pub fn descriptor(&self) -> &RealClassDescriptor {
        &self.descriptor
    }

    /// The dispatch stub installed for a member.
    #[must_use]
    pub fn stub(&self, member: MemberIndex) -> Option<&DispatchStub> {
        self.stubs.get(member)
    }

    /// All dispatch stubs, in member order.
    #[must_use]
    pub fn stubs(&self) -> &[DispatchStub] {
        &self.stubs
    }

    /// The preserved original body of a member; `None` for native members.
    #[must_use]
    pub fn original(&self, member: MemberIndex) -> Option<&Body> {
        self.originals.get(member).and_then(Option::as_ref)
    }

    /// Finds the member preserved under a reserved entry signature.
    #[must_use]
    pub fn original_entry(&self, entry: &MemberSignature) -> Option<MemberIndex> {
        self.entries.get(entry).copied()
    }
}

/// A class as loaded into a sandbox.
#[derive(Clone, Debug)]
pub enum LoadedClass {
    /// Not instrumented; calls run the original bodies directly.
    Plain(RealClassDescriptor),
    /// Instrumented; calls go through dispatch stubs.
    Instrumented(TransformedClass),
}

impl LoadedClass {
    /// The class descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &RealClassDescriptor {
        match self {
            LoadedClass::Plain(descriptor) => descriptor,
            LoadedClass::Instrumented(class) => class.descriptor(),
        }
    }

    /// Returns `true` for instrumented classes.
    #[must_use]
    pub fn is_instrumented(&self) -> bool {
        matches!(self, LoadedClass::Instrumented(_))
    }

    /// Returns the transformed class, if instrumented.
    #[must_use]
    pub fn as_transformed(&self) -> Option<&TransformedClass> {
        match self {
            LoadedClass::Instrumented(class) => Some(class),
            LoadedClass::Plain(_) => None,
        }
    }

    /// The original body of a member, whether or not the class is instrumented.
    #[must_use]
    pub fn original(&self, member: MemberIndex) -> Option<&Body> {
        match self {
            LoadedClass::Plain(descriptor) => {
                descriptor.member(member).and_then(|m| m.kind().body())
            }
            LoadedClass::Instrumented(class) => class.original(member),
        }
    }
}

/// Every class loaded into one sandbox, with resolved superclass links.
#[derive(Clone, Debug, Default)]
pub struct TransformedClasses {
    classes: Vec<LoadedClass>,
    superclasses: Vec<Option<ClassId>>,
    by_name: HashMap<String, ClassId>,
}

impl TransformedClasses {
    /// Resolves a class name.
    #[must_use]
    pub fn id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Returns a loaded class.
    #[must_use]
    pub fn get(&self, id: ClassId) -> Option<&LoadedClass> {
        self.classes.get(id.0)
    }

    /// Returns a loaded class by name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&LoadedClass> {
        self.id(name).and_then(|id| self.get(id))
    }

    /// The direct superclass of a class.
    #[must_use]
    pub fn superclass(&self, id: ClassId) -> Option<ClassId> {
        self.superclasses.get(id.0).copied().flatten()
    }

    /// Iterates a class and its superclasses, most derived first.
    pub fn ancestry(&self, id: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(Some(id), move |&current| self.superclass(current))
    }

    /// Returns `true` if `class` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subclass(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.ancestry(class).any(|id| id == ancestor)
    }

    /// Iterates all loaded classes.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &LoadedClass)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, class)| (ClassId(i), class))
    }

    /// Iterates the instrumented classes.
    pub fn instrumented(&self) -> impl Iterator<Item = (ClassId, &TransformedClass)> {
        self.iter()
            .filter_map(|(id, class)| class.as_transformed().map(|t| (id, t)))
    }

    /// Number of loaded classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if nothing was loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Applies an [`InstrumentationPlan`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassTransformer;

impl ClassTransformer {
    /// Creates a transformer.
    #[must_use]
    pub fn new() -> Self {
        ClassTransformer
    }

    /// Loads every planned class, transforming the selected ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReservedName`] if an instrumented class declares a
    /// member whose name collides with a preserved entry name.
    pub fn transform(&self, plan: &InstrumentationPlan) -> Result<TransformedClasses> {
        let mut loaded = TransformedClasses::default();

        for (i, descriptor) in plan.classes().iter().enumerate() {
            let id = ClassId(i);
            let class = if descriptor.instrumented() {
                LoadedClass::Instrumented(TransformedClass::new(id, descriptor.clone())?)
            } else {
                LoadedClass::Plain(descriptor.clone())
            };
            loaded.by_name.insert(descriptor.name().to_string(), id);
            loaded.classes.push(class);
        }

        loaded.superclasses = loaded
            .classes
            .iter()
            .map(|class| {
                class
                    .descriptor()
                    .superclass()
                    .and_then(|name| loaded.by_name.get(name).copied())
            })
            .collect();

        debug!(
            "transformed {} classes ({} loaded)",
            loaded.instrumented().count(),
            loaded.len()
        );
        Ok(loaded)
    }
}
