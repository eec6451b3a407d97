//! Integration tests for sandbox isolation.
//!
//! Each scenario gets its own heap, statics, shadow state and task queue,
//! even when sandboxes share cached instrumentation or run on parallel
//! threads.

use std::{
    sync::{Arc, Barrier},
    thread,
};

use shadowbox::prelude::*;

const REGISTRY: &str = "org.example.app.Registry";
const SESSION: &str = "org.example.app.Session";

#[derive(Default)]
struct SessionState {
    user: Option<String>,
}

#[derive(Default)]
struct SessionStatics {
    opened: u32,
}

fn manager(reuse: ReusePolicy) -> Result<SandboxManager> {
    let class_path = ClassPath::new()
        .with(
            RealClass::builder(REGISTRY)
                .static_initializer(|inv| {
                    inv.sandbox().set_static_field(inv.class_name(), "entries", Value::Int(0))?;
                    Ok(Value::Void)
                })
                .static_method("register", [], TypeDesc::Int, |inv| {
                    let sandbox = inv.sandbox();
                    let entries = sandbox.static_field(REGISTRY, "entries")?.as_int().unwrap_or(0) + 1;
                    sandbox.set_static_field(REGISTRY, "entries", Value::Int(entries))?;
                    Ok(Value::Int(entries))
                })
                .build()?,
        )?
        .with(
            RealClass::builder(SESSION)
                .native("open", [TypeDesc::String], TypeDesc::Int)
                .native("user", [], TypeDesc::String)
                .build()?,
        )?;

    let catalog = ShadowCatalog::new().with(
        ShadowClass::builder::<SessionState>("ShadowSession")
            .implements(SESSION)
            .method("open", [TypeDesc::String], TypeDesc::Int, |state, inv| {
                let user = inv.arg_str(0)?.to_string();
                state.with(|s| s.user = Some(user))?;
                let opened = inv.statics(|s: &mut SessionStatics| {
                    s.opened += 1;
                    s.opened
                })?;
                Ok(Value::Int(opened as i32))
            })
            .method("user", [], TypeDesc::String, |state, _| {
                Ok(state.with(|s| s.user.clone())?.map_or(Value::Null, Value::from))
            })
            .build()?,
    )?;

    Ok(SandboxManager::new(class_path, catalog).with_reuse(reuse))
}

fn config() -> SandboxConfig {
    SandboxConfig::new().shadow("ShadowSession")
}

fn open(sandbox: &Sandbox, user: &str) -> Result<i32> {
    let session = sandbox.new_instance(SESSION, &[])?;
    let opened = sandbox.invoke(
        &session,
        &MemberSignature::new("open", [TypeDesc::String]),
        &[user.into()],
    )?;
    assert_eq!(
        sandbox.invoke(&session, &MemberSignature::new("user", []), &[])?,
        Value::from(user)
    );
    Ok(opened.as_int().unwrap_or(-1))
}

#[test]
fn test_reused_instrumentation_does_not_share_state() -> Result<()> {
    let manager = manager(ReusePolicy::SameConfig)?;
    let register = MemberSignature::new("register", []);

    for _ in 0..3 {
        manager.run(&config(), |sandbox| {
            assert_eq!(sandbox.invoke_static(REGISTRY, &register, &[])?, Value::Int(1));
            assert_eq!(open(sandbox, "ada")?, 1);
            assert_eq!(open(sandbox, "bob")?, 2);
            Ok(())
        })?;
    }
    assert_eq!(manager.cached_configs(), 1);
    Ok(())
}

#[test]
fn test_parallel_sandboxes() -> Result<()> {
    let manager = Arc::new(manager(ReusePolicy::SameConfig)?);
    let barrier = Arc::new(Barrier::new(4));

    let results: Vec<Result<Vec<i32>>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let manager = Arc::clone(&manager);
                let barrier = Arc::clone(&barrier);
                scope.spawn(move || {
                    manager.run(&config(), |sandbox| {
                        barrier.wait();
                        (0..10)
                            .map(|i| open(sandbox, &format!("worker{worker}-{i}")))
                            .collect::<Result<Vec<_>>>()
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|_| Err(Error::Error("worker panicked".into()))))
            .collect()
    });

    for result in results {
        assert_eq!(result?, (1..=10).collect::<Vec<_>>());
    }
    Ok(())
}

#[test]
fn test_objects_do_not_cross_sandboxes() -> Result<()> {
    let manager = manager(ReusePolicy::Never)?;
    let a = manager.create(&config())?;
    let b = manager.create(&config())?;
    let session = a.new_instance(SESSION, &[])?;

    let err = b
        .invoke(&session, &MemberSignature::new("user", []), &[])
        .unwrap_err();
    assert!(err.is_isolation_violation());

    let err = b
        .with_shadow(&session, |_: &mut SessionState| ())
        .unwrap_err();
    assert!(err.is_isolation_violation());

    a.teardown()?;
    b.teardown()?;
    Ok(())
}

#[test]
fn test_teardown_discards_everything() -> Result<()> {
    let manager = manager(ReusePolicy::SameConfig)?;
    let sandbox = manager.create(&config())?;
    let session = sandbox.new_instance(SESSION, &[])?;
    sandbox.post(|_| Ok(()))?;

    sandbox.teardown()?;

    assert!(matches!(sandbox.idle(), Err(Error::SandboxDestroyed(_))));
    assert!(matches!(sandbox.pending_tasks(), Err(Error::SandboxDestroyed(_))));
    assert!(matches!(
        sandbox.with_shadow(&session, |_: &mut SessionState| ()),
        Err(Error::SandboxDestroyed(_))
    ));
    assert!(matches!(
        sandbox.static_field(REGISTRY, "entries"),
        Err(Error::SandboxDestroyed(_))
    ));

    // A fresh sandbox starts from scratch.
    let fresh = manager.create(&config())?;
    assert_ne!(fresh.id(), sandbox.id());
    assert_eq!(open(&fresh, "carol")?, 1);
    Ok(())
}
