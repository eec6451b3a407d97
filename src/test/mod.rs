//! Shared fixtures for unit tests.
//!
//! The class path mirrors a small slice of a platform API: a greeter
//! hierarchy, a final `android.graphics.Paint` with native state, a class
//! whose only constructor takes an argument, a static singleton accessor and
//! a class with a protected member.

use crate::{
    model::{ClassPath, MemberDescriptor, MemberSignature, RealClass, ShadowCatalog, ShadowClass, TypeDesc, Value, Visibility},
    sandbox::SandboxConfig,
    Sandbox, SandboxManager,
};

pub(crate) const GREETER: &str = "org.shadowbox.testing.Greeter";
pub(crate) const CHILD_GREETER: &str = "org.shadowbox.testing.ChildGreeter";
pub(crate) const PONY: &str = "org.shadowbox.testing.Pony";
pub(crate) const PAINT: &str = "android.graphics.Paint";
pub(crate) const SOME_CONSTRUCTORS: &str = "org.shadowbox.testing.ClassWithSomeConstructors";
pub(crate) const ACCOUNT_MANAGER: &str = "org.shadowbox.testing.AccountManager";
pub(crate) const VAULT: &str = "org.shadowbox.testing.Vault";
pub(crate) const COUNTER: &str = "org.shadowbox.other.Counter";

pub(crate) fn hail() -> MemberSignature {
    MemberSignature::new("hail", [TypeDesc::String])
}

pub(crate) fn echo() -> MemberSignature {
    MemberSignature::new("echo", [TypeDesc::String])
}

pub(crate) fn wave() -> MemberSignature {
    MemberSignature::new("wave", [])
}

/// Shadow state of `ShadowGreeter`: every name it was hailed with.
#[derive(Debug, Default)]
pub(crate) struct GreeterShadow {
    pub(crate) heard: Vec<String>,
}

/// Shadow state of `ShadowPaint`.
#[derive(Debug, Default)]
pub(crate) struct PaintShadow {
    pub(crate) color: i32,
}

/// Shadow state of `ShadowClassWithSomeConstructors`.
#[derive(Debug, Default)]
pub(crate) struct ConstructorShadow {
    pub(crate) names: Vec<String>,
}

#[derive(Debug, Default)]
pub(crate) struct AccountStatics {
    pub(crate) instance: Option<crate::model::ObjectRef>,
}

pub(crate) fn fixture_class_path() -> ClassPath {
    ClassPath::new()
        .with(
            RealClass::builder(GREETER)
                .constructor([], |inv| {
                    inv.set_field("constructed", Value::Bool(true))?;
                    Ok(Value::Void)
                })
                .native("hail", [TypeDesc::String], TypeDesc::String)
                .method("echo", [TypeDesc::String], TypeDesc::String, |inv| {
                    Ok(inv.arg(0)?.clone())
                })
                .native("wave", [], TypeDesc::Void)
                .method("greet", [TypeDesc::String], TypeDesc::String, |inv| {
                    inv.sandbox().invoke(inv.this()?, &hail(), inv.args())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            RealClass::builder(CHILD_GREETER)
                .extends(GREETER)
                .constructor([], |inv| {
                    inv.set_field("child", Value::Bool(true))?;
                    Ok(Value::Void)
                })
                .method("shout", [TypeDesc::String], TypeDesc::String, |inv| {
                    Ok(inv.arg_str(0)?.to_uppercase().into())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            RealClass::builder(PONY)
                .method("ride", [TypeDesc::String], TypeDesc::String, |inv| {
                    Ok(format!("Whinny! You're on my back, {}!", inv.arg_str(0)?).into())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            RealClass::builder(PAINT)
                .final_class()
                .native("setColor", [TypeDesc::Int], TypeDesc::Void)
                .native("getColor", [], TypeDesc::Int)
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            RealClass::builder(SOME_CONSTRUCTORS)
                .constructor([TypeDesc::String], |inv| {
                    inv.set_field("name", inv.arg(0)?.clone())?;
                    Ok(Value::Void)
                })
                .method("getName", [], TypeDesc::String, |inv| inv.field("name"))
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            RealClass::builder(ACCOUNT_MANAGER)
                .static_native("get", [TypeDesc::Any], TypeDesc::object(ACCOUNT_MANAGER))
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            RealClass::builder(VAULT)
                .member(
                    MemberDescriptor::method("secret", [], TypeDesc::String, |_| {
                        Ok("real secret".into())
                    })
                    .with_visibility(Visibility::Protected),
                )
                .method("reveal", [], TypeDesc::String, |inv| {
                    inv.sandbox()
                        .invoke(inv.this()?, &MemberSignature::new("secret", []), &[])
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            RealClass::builder(COUNTER)
                .static_initializer(|inv| {
                    inv.sandbox()
                        .set_static_field(inv.class_name(), "count", Value::Int(0))?;
                    Ok(Value::Void)
                })
                .static_method("increment", [], TypeDesc::Int, |inv| {
                    let sandbox = inv.sandbox();
                    let count = sandbox
                        .static_field(inv.class_name(), "count")?
                        .as_int()
                        .unwrap_or(0)
                        + 1;
                    sandbox.set_static_field(inv.class_name(), "count", Value::Int(count))?;
                    Ok(Value::Int(count))
                })
                .native("tick", [], TypeDesc::Long)
                .build()
                .unwrap(),
        )
        .unwrap()
}

pub(crate) fn fixture_catalog() -> ShadowCatalog {
    ShadowCatalog::new()
        .with(
            ShadowClass::builder::<GreeterShadow>("ShadowGreeter")
                .implements(GREETER)
                .method("hail", [TypeDesc::String], TypeDesc::String, |state, inv| {
                    let heard = inv.arg_str(0)?.to_string();
                    state.with(|s| s.heard.push(heard))?;
                    Ok("canned".into())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            ShadowClass::builder::<PaintShadow>("ShadowPaint")
                .implements(PAINT)
                .method("setColor", [TypeDesc::Int], TypeDesc::Void, |state, inv| {
                    let color = inv.arg_int(0)?;
                    state.with(|s| s.color = color)?;
                    Ok(Value::Void)
                })
                .method("getColor", [], TypeDesc::Int, |state, _| Ok(Value::Int(state.with(|s| s.color)?)))
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            ShadowClass::builder::<ConstructorShadow>("ShadowClassWithSomeConstructors")
                .implements(SOME_CONSTRUCTORS)
                .constructor([TypeDesc::String], |state, inv| {
                    let name = inv.arg_str(0)?.to_string();
                    state.with(|s| s.names.push(name))
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            ShadowClass::builder::<()>("ShadowAccountManager")
                .implements(ACCOUNT_MANAGER)
                .static_method("get", [TypeDesc::Any], TypeDesc::object(ACCOUNT_MANAGER), |inv| {
                    if let Some(instance) = inv.statics(|s: &mut AccountStatics| s.instance.clone())? {
                        return Ok(instance.into());
                    }
                    let instance = inv.sandbox().new_instance(ACCOUNT_MANAGER, &[])?;
                    inv.statics(|s: &mut AccountStatics| s.instance = Some(instance.clone()))?;
                    Ok(instance.into())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
        .with(
            ShadowClass::builder::<()>("ShadowVault")
                .implements(VAULT)
                .method("secret", [], TypeDesc::String, |_, inv| {
                    let real = inv
                        .sandbox()
                        .directly_on(inv.this()?, VAULT)?
                        .call(&MemberSignature::new("secret", []), &[])?;
                    Ok(format!("{} (shadowed)", real.as_str().unwrap_or_default()).into())
                })
                .build()
                .unwrap(),
        )
        .unwrap()
}

pub(crate) fn fixture_manager() -> SandboxManager {
    SandboxManager::new(fixture_class_path(), fixture_catalog())
}

pub(crate) fn fixture_sandbox(config: &SandboxConfig) -> Sandbox {
    fixture_manager().create(config).unwrap()
}
