//! Shadow class declarations and the shadow catalog.
//!
//! A shadow class substitutes for exactly one real class. It declares which
//! real members it implements; every other member of the target keeps its
//! unshadowed policy (pass-through or no-op). Each real instance gets its own
//! shadow state `S`, created lazily from `S::default()`. Instance handlers and
//! constructor replacements reach it through a [`ShadowRef`].
//!
//! # Handler Kinds
//!
//! | Builder method | Handler | Matches |
//! |----------------|---------|---------|
//! | [`ShadowClassBuilder::method`] | [`ShadowHandler::Instance`] | instance member with same name and params |
//! | [`ShadowClassBuilder::static_method`] | [`ShadowHandler::Static`] | static member with same name and params |
//! | [`ShadowClassBuilder::constructor`] | [`ShadowHandler::Constructor`] | real constructor with same params |
//!
//! # Examples
//!
//! ```rust
//! use shadowbox::model::{ShadowCatalog, ShadowClass, TypeDesc, Value};
//!
//! #[derive(Default)]
//! struct ShadowPaint {
//!     color: i32,
//! }
//!
//! let shadow = ShadowClass::builder::<ShadowPaint>("ShadowPaint")
//!     .implements("android.graphics.Paint")
//!     .method("setColor", [TypeDesc::Int], TypeDesc::Void, |paint, inv| {
//!         let color = inv.arg_int(0)?;
//!         paint.with(|p| p.color = color)?;
//!         Ok(Value::Void)
//!     })
//!     .method("getColor", [], TypeDesc::Int, |paint, _| Ok(paint.with(|p| p.color)?.into()))
//!     .build()?;
//!
//! let mut catalog = ShadowCatalog::new();
//! catalog.register(shadow)?;
//! assert!(catalog.get("ShadowPaint").is_some());
//! # Ok::<(), shadowbox::Error>(())
//! ```

use std::{
    any::{type_name, Any, TypeId},
    collections::{BTreeMap, HashSet},
    fmt,
    sync::{Arc, Mutex},
};

use crate::{
    model::{MemberSignature, TypeDesc, Value, CONSTRUCTOR_NAME},
    runtime::{Invocation, ShadowRef},
    Result,
};

/// Reserved name of a shadow's constructor replacement.
///
/// The same name identifies the preserved original constructor body of an
/// instrumented class.
pub const CONSTRUCTOR_METHOD_NAME: &str = "__constructor__";

/// Type-erased shadow state.
pub type ShadowState = Box<dyn Any + Send>;

/// Handler operating on a shadow instance.
///
/// The handler receives the unlocked state cell of the receiver.
pub type InstanceHandler =
    Arc<dyn Fn(&Mutex<ShadowState>, &Invocation<'_>) -> Result<Value> + Send + Sync>;

/// Handler for a static shadow member.
pub type StaticHandler = Arc<dyn Fn(&Invocation<'_>) -> Result<Value> + Send + Sync>;

type StateFactory = Arc<dyn Fn() -> ShadowState + Send + Sync>;

/// The implementation attached to a shadow member.
#[derive(Clone)]
pub enum ShadowHandler {
    /// Replaces an instance method.
    Instance(InstanceHandler),
    /// Replaces a static method.
    Static(StaticHandler),
    /// Replaces the body of a constructor.
    Constructor(InstanceHandler),
}

impl ShadowHandler {
    /// Returns `true` for static handlers.
    #[must_use]
    pub fn is_static(&self) -> bool {
        matches!(self, ShadowHandler::Static(_))
    }

    /// Returns `true` for constructor replacements.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        matches!(self, ShadowHandler::Constructor(_))
    }
}

impl fmt::Debug for ShadowHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShadowHandler::Instance(_) => f.write_str("Instance(..)"),
            ShadowHandler::Static(_) => f.write_str("Static(..)"),
            ShadowHandler::Constructor(_) => f.write_str("Constructor(..)"),
        }
    }
}

/// One member implemented by a shadow class.
#[derive(Clone, Debug)]
pub struct ShadowMember {
    declared: MemberSignature,
    return_type: TypeDesc,
    handler: ShadowHandler,
}

impl ShadowMember {
    /// The signature as declared on the shadow.
    ///
    /// Constructor replacements are declared as `__constructor__`.
    #[must_use]
    pub fn declared(&self) -> &MemberSignature {
        &self.declared
    }

    /// The signature of the real member this implementation replaces.
    #[must_use]
    pub fn target_signature(&self) -> MemberSignature {
        if self.handler.is_constructor() {
            self.declared.renamed(CONSTRUCTOR_NAME)
        } else {
            self.declared.clone()
        }
    }

    /// The declared return type.
    #[must_use]
    pub fn return_type(&self) -> &TypeDesc {
        &self.return_type
    }

    /// The implementation.
    #[must_use]
    pub fn handler(&self) -> &ShadowHandler {
        &self.handler
    }
}

/// A validated shadow class declaration.
#[derive(Clone)]
pub struct ShadowClass {
    name: String,
    target: String,
    state_type: TypeId,
    state_type_name: &'static str,
    factory: StateFactory,
    members: Vec<ShadowMember>,
}

impl ShadowClass {
    /// Starts declaring a shadow whose per-instance state is `S`.
    #[must_use]
    pub fn builder<S>(name: impl Into<String>) -> ShadowClassBuilder<S>
    where
        S: Default + Send + 'static,
    {
        ShadowClassBuilder {
            name: name.into(),
            targets: Vec::new(),
            members: Vec::new(),
            _state: std::marker::PhantomData,
        }
    }

    /// The shadow class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The real class this shadow substitutes for.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The implemented members.
    #[must_use]
    pub fn members(&self) -> &[ShadowMember] {
        &self.members
    }

    /// Returns `true` if shadow state is of type `S`.
    #[must_use]
    pub fn holds<S: 'static>(&self) -> bool {
        self.state_type == TypeId::of::<S>()
    }

    /// Name of the shadow state type.
    #[must_use]
    pub fn state_type_name(&self) -> &'static str {
        self.state_type_name
    }

    /// Creates fresh shadow state for a new real instance.
    #[must_use]
    pub fn new_state(&self) -> ShadowState {
        (self.factory)()
    }
}

impl fmt::Debug for ShadowClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowClass")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("state", &self.state_type_name)
            .field("members", &self.members)
            .finish()
    }
}

/// Fluent builder for [`ShadowClass`].
pub struct ShadowClassBuilder<S> {
    name: String,
    targets: Vec<String>,
    members: Vec<ShadowMember>,
    _state: std::marker::PhantomData<fn() -> S>,
}

impl<S> ShadowClassBuilder<S>
where
    S: Default + Send + 'static,
{
    /// Declares the real class this shadow implements.
    ///
    /// Exactly one target must be declared.
    #[must_use]
    pub fn implements(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Implements an instance method of the target.
    ///
    /// The handler gets a [`ShadowRef`] to the receiver's state `S`.
    #[must_use]
    pub fn method<F>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
        handler: F,
    ) -> Self
    where
        F: Fn(&ShadowRef<'_, S>, &Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let handler = self.erase(handler);
        self.push(
            MemberSignature::new(name, params),
            return_type,
            ShadowHandler::Instance(handler),
        )
    }

    /// Implements a static method of the target.
    #[must_use]
    pub fn static_method<F>(
        self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = TypeDesc>,
        return_type: TypeDesc,
        handler: F,
    ) -> Self
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.push(
            MemberSignature::new(name, params),
            return_type,
            ShadowHandler::Static(Arc::new(handler)),
        )
    }

    /// Replaces the target constructor with the given parameter types.
    #[must_use]
    pub fn constructor<F>(self, params: impl IntoIterator<Item = TypeDesc>, handler: F) -> Self
    where
        F: Fn(&ShadowRef<'_, S>, &Invocation<'_>) -> Result<()> + Send + Sync + 'static,
    {
        let handler = self.erase(move |state: &ShadowRef<'_, S>, inv: &Invocation<'_>| {
            handler(state, inv)?;
            Ok(Value::Void)
        });
        self.push(
            MemberSignature::new(CONSTRUCTOR_METHOD_NAME, params),
            TypeDesc::Void,
            ShadowHandler::Constructor(handler),
        )
    }

    fn erase<F>(&self, handler: F) -> InstanceHandler
    where
        F: Fn(&ShadowRef<'_, S>, &Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        let shadow = self.name.clone();
        Arc::new(move |cell: &Mutex<ShadowState>, inv: &Invocation<'_>| {
            handler(&ShadowRef::new(cell, &shadow), inv)
        })
    }

    fn push(mut self, declared: MemberSignature, return_type: TypeDesc, handler: ShadowHandler) -> Self {
        self.members.push(ShadowMember {
            declared,
            return_type,
            handler,
        });
        self
    }

    /// Validates and finishes the declaration.
    ///
    /// # Errors
    ///
    /// - [`crate::ConfigError::MissingTarget`] if no target was declared
    /// - [`crate::ConfigError::AmbiguousTarget`] if more than one was declared
    /// - [`crate::ConfigError::DuplicateShadowMember`] if a signature is implemented twice
    pub fn build(mut self) -> Result<ShadowClass> {
        let target = match self.targets.len() {
            0 => return Err(config_error!(MissingTarget { shadow: self.name })),
            1 => self.targets.remove(0),
            _ => {
                return Err(config_error!(AmbiguousTarget {
                    shadow: self.name,
                    targets: self.targets,
                }))
            }
        };

        let mut seen = HashSet::new();
        for member in &self.members {
            if !seen.insert(member.declared.clone()) {
                return Err(config_error!(DuplicateShadowMember {
                    shadow: self.name.as_str(),
                    member: member.declared.to_string(),
                }));
            }
        }

        Ok(ShadowClass {
            name: self.name,
            target,
            state_type: TypeId::of::<S>(),
            state_type_name: type_name::<S>(),
            factory: Arc::new(|| -> ShadowState { Box::new(S::default()) }),
            members: self.members,
        })
    }
}

/// All shadow classes known to a manager, by name.
///
/// Registration does not activate a shadow; a sandbox configuration selects
/// which registered shadows are active.
#[derive(Clone, Debug, Default)]
pub struct ShadowCatalog {
    shadows: BTreeMap<String, Arc<ShadowClass>>,
}

impl ShadowCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a shadow class.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::DuplicateShadowName`] if a shadow with the
    /// same name is already registered.
    pub fn register(&mut self, shadow: ShadowClass) -> Result<()> {
        if self.shadows.contains_key(shadow.name()) {
            return Err(config_error!(DuplicateShadowName(shadow.name())));
        }
        self.shadows.insert(shadow.name().to_string(), Arc::new(shadow));
        Ok(())
    }

    /// Registers a shadow class, builder style.
    ///
    /// # Errors
    ///
    /// See [`ShadowCatalog::register`].
    pub fn with(mut self, shadow: ShadowClass) -> Result<Self> {
        self.register(shadow)?;
        Ok(self)
    }

    /// Looks up a shadow by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ShadowClass>> {
        self.shadows.get(name)
    }

    /// Iterates shadows in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<ShadowClass>> {
        self.shadows.values()
    }

    /// Number of registered shadows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    /// Returns `true` if no shadow is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfigError, Error};

    #[derive(Default)]
    struct Counter {
        hits: u32,
    }

    #[test]
    fn test_missing_target() {
        let result = ShadowClass::builder::<Counter>("ShadowNothing").build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::MissingTarget { .. }))
        ));
    }

    #[test]
    fn test_ambiguous_target() {
        let result = ShadowClass::builder::<Counter>("ShadowBoth")
            .implements("a.One")
            .implements("a.Two")
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::AmbiguousTarget { ref targets, .. })) if targets.len() == 2
        ));
    }

    #[test]
    fn test_duplicate_member() {
        let result = ShadowClass::builder::<Counter>("ShadowDup")
            .implements("a.One")
            .method("x", [], TypeDesc::Void, |_, _| Ok(Value::Void))
            .method("x", [], TypeDesc::Void, |_, _| Ok(Value::Void))
            .build();
        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::DuplicateShadowMember { .. }))
        ));
    }

    #[test]
    fn test_constructor_targets_init() {
        let shadow = ShadowClass::builder::<Counter>("ShadowCtor")
            .implements("a.One")
            .constructor([TypeDesc::String], |state, _| state.with(|c| c.hits += 1))
            .build()
            .unwrap();

        let member = &shadow.members()[0];
        assert_eq!(member.declared().name(), CONSTRUCTOR_METHOD_NAME);
        assert_eq!(
            member.target_signature(),
            MemberSignature::constructor([TypeDesc::String])
        );
        assert!(member.handler().is_constructor());
    }

    #[test]
    fn test_state_factory() {
        let shadow = ShadowClass::builder::<Counter>("ShadowState")
            .implements("a.One")
            .build()
            .unwrap();

        assert!(shadow.holds::<Counter>());
        assert!(!shadow.holds::<u32>());
        let state = shadow.new_state();
        assert_eq!(state.downcast_ref::<Counter>().map(|c| c.hits), Some(0));
    }

    #[test]
    fn test_catalog_duplicate_name() {
        let mut catalog = ShadowCatalog::new();
        let make = || {
            ShadowClass::builder::<Counter>("ShadowSame")
                .implements("a.One")
                .build()
                .unwrap()
        };
        catalog.register(make()).unwrap();
        assert!(matches!(
            catalog.register(make()),
            Err(Error::Config(ConfigError::DuplicateShadowName(_)))
        ));
        assert_eq!(catalog.len(), 1);
    }
}
