//! Shadow registry and binding.
//!
//! The [`Binder`] pairs every member of every instrumented class with exactly
//! one dispatch policy:
//!
//! ```text
//! shadow member with same (name, params)?
//!   ├─ yes ─────────────────────────────► DispatchToShadow
//!   └─ no ── member has an original body?
//!              ├─ yes ──────────────────► PassThrough
//!              └─ no (native) ──────────► NoOp
//! ```
//!
//! Shadow members that match nothing, or that disagree with their real member
//! on return type or static-ness, fail binding. A table that binds is total.

mod registry;
mod table;

use std::collections::HashMap;

use log::debug;

pub use registry::{ShadowId, ShadowRegistry};
pub use table::{Binding, BindingEntry, BindingTable, Policy};

use table::ClassBindings;

use crate::{
    model::{MemberIndex, ShadowHandler},
    transform::TransformedClasses,
    Result,
};

/// Builds [`BindingTable`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct Binder;

impl Binder {
    /// Binds every instrumented class against the active shadows.
    ///
    /// # Errors
    ///
    /// - [`crate::ConfigError::UnmatchedShadowMember`] if a shadow member has no real counterpart
    /// - [`crate::ConfigError::StaticMismatch`] if static-ness differs
    /// - [`crate::ConfigError::ReturnTypeMismatch`] if return types differ
    pub fn bind(registry: &ShadowRegistry, classes: &TransformedClasses) -> Result<BindingTable> {
        let mut table = BindingTable::with_classes(classes.len());

        for (class_id, class) in classes.instrumented() {
            let descriptor = class.descriptor();
            let active = registry.shadow_for(descriptor.name());

            let mut shadowed: HashMap<MemberIndex, ShadowHandler> = HashMap::new();
            if let Some((_, shadow)) = active {
                for member in shadow.members() {
                    let target = member.target_signature();
                    let index = descriptor.find(&target).ok_or_else(|| {
                        config_error!(UnmatchedShadowMember {
                            shadow: shadow.name(),
                            member: member.declared().to_string(),
                        })
                    })?;
                    let real = &descriptor.members()[index];

                    let handler = member.handler();
                    if handler.is_static() != real.is_static()
                        || handler.is_constructor() != real.is_constructor()
                    {
                        return Err(config_error!(StaticMismatch {
                            shadow: shadow.name(),
                            member: member.declared().to_string(),
                        }));
                    }
                    if !handler.is_constructor() && member.return_type() != real.return_type() {
                        return Err(config_error!(ReturnTypeMismatch {
                            shadow: shadow.name(),
                            member: member.declared().to_string(),
                            expected: real.return_type().clone(),
                            found: member.return_type().clone(),
                        }));
                    }

                    shadowed.insert(index, handler.clone());
                }
            }

            let shadow_id = active.map(|(id, _)| id);
            let entries = descriptor
                .members()
                .iter()
                .enumerate()
                .map(|(index, member)| {
                    let binding = match (shadowed.remove(&index), shadow_id) {
                        (Some(handler), Some(shadow)) => Binding::Shadow { shadow, handler },
                        _ => match class.original(index) {
                            Some(body) => Binding::PassThrough(body.clone()),
                            None => Binding::NoOp(member.return_type().clone()),
                        },
                    };
                    BindingEntry::new(member.signature().clone(), binding)
                })
                .collect::<Vec<_>>();

            debug!(
                "bound {} ({} members, shadow: {})",
                descriptor.name(),
                entries.len(),
                active.map_or("none", |(_, s)| s.name())
            );
            table.insert(
                class_id,
                ClassBindings {
                    shadow: shadow_id,
                    entries,
                },
            );
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{ShadowCatalog, ShadowClass, TypeDesc, Value},
        planner::InstrumentationPlanner,
        sandbox::SandboxConfig,
        test::{fixture_catalog, fixture_class_path},
        transform::ClassTransformer,
        ConfigError, Error,
    };

    fn bind(catalog: &ShadowCatalog, config: &SandboxConfig) -> Result<(TransformedClasses, BindingTable)> {
        let class_path = fixture_class_path();
        let registry = ShadowRegistry::from_config(catalog, config, &class_path)?;
        let plan = InstrumentationPlanner::new()
            .with_shadow_targets(registry.targets())
            .plan(&class_path, config)?;
        let classes = ClassTransformer::new().transform(&plan)?;
        let table = Binder::bind(&registry, &classes)?;
        Ok((classes, table))
    }

    fn policy(classes: &TransformedClasses, table: &BindingTable, class: &str, member: &str, params: Vec<TypeDesc>) -> Policy {
        let id = classes.id(class).unwrap();
        let index = classes
            .get(id)
            .unwrap()
            .descriptor()
            .find(&crate::model::MemberSignature::new(member, params))
            .unwrap();
        table.entry(id, index).unwrap().policy()
    }

    #[test]
    fn test_policies() {
        let config = SandboxConfig::new().shadow("ShadowGreeter");
        let (classes, table) = bind(&fixture_catalog(), &config).unwrap();
        let greeter = "org.shadowbox.testing.Greeter";

        assert_eq!(
            policy(&classes, &table, greeter, "hail", vec![TypeDesc::String]),
            Policy::DispatchToShadow
        );
        assert_eq!(
            policy(&classes, &table, greeter, "echo", vec![TypeDesc::String]),
            Policy::PassThrough
        );
        assert_eq!(
            policy(&classes, &table, greeter, "wave", vec![]),
            Policy::NoOp
        );
    }

    #[test]
    fn test_table_is_total() {
        let config = SandboxConfig::new()
            .shadow("ShadowGreeter")
            .instrument_package("org.shadowbox.testing");
        let (classes, table) = bind(&fixture_catalog(), &config).unwrap();

        for (id, class) in classes.instrumented() {
            let entries = table.entries(id).unwrap();
            assert_eq!(entries.len(), class.descriptor().members().len());
        }
        for (id, class) in classes.iter() {
            assert_eq!(table.is_bound(id), class.is_instrumented());
        }
    }

    #[test]
    fn test_unmatched_shadow_member() {
        let catalog = ShadowCatalog::new()
            .with(
                ShadowClass::builder::<()>("ShadowTypo")
                    .implements("org.shadowbox.testing.Greeter")
                    .method("hial", [TypeDesc::String], TypeDesc::String, |_, _| Ok(Value::Null))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let result = bind(&catalog, &SandboxConfig::new().shadow("ShadowTypo"));

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnmatchedShadowMember { ref member, .. }))
                if member == "hial(String)"
        ));
    }

    #[test]
    fn test_return_type_mismatch() {
        let catalog = ShadowCatalog::new()
            .with(
                ShadowClass::builder::<()>("ShadowWrongReturn")
                    .implements("org.shadowbox.testing.Greeter")
                    .method("hail", [TypeDesc::String], TypeDesc::Int, |_, _| Ok(Value::Int(0)))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let result = bind(&catalog, &SandboxConfig::new().shadow("ShadowWrongReturn"));

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::ReturnTypeMismatch { expected: TypeDesc::String, found: TypeDesc::Int, .. }))
        ));
    }

    #[test]
    fn test_static_mismatch() {
        let catalog = ShadowCatalog::new()
            .with(
                ShadowClass::builder::<()>("ShadowStaticHail")
                    .implements("org.shadowbox.testing.Greeter")
                    .static_method("hail", [TypeDesc::String], TypeDesc::String, |_| Ok(Value::Null))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let result = bind(&catalog, &SandboxConfig::new().shadow("ShadowStaticHail"));

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::StaticMismatch { .. }))
        ));
    }

    #[test]
    fn test_constructor_binding() {
        let config = SandboxConfig::new().shadow("ShadowClassWithSomeConstructors");
        let (classes, table) = bind(&fixture_catalog(), &config).unwrap();
        let class = "org.shadowbox.testing.ClassWithSomeConstructors";

        let id = classes.id(class).unwrap();
        let index = classes
            .get(id)
            .unwrap()
            .descriptor()
            .find(&crate::model::MemberSignature::constructor([TypeDesc::String]))
            .unwrap();
        assert_eq!(table.entry(id, index).unwrap().policy(), Policy::DispatchToShadow);
        assert!(table.shadow_of(id).is_some());
    }
}
