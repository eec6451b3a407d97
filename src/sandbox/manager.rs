//! Sandbox construction and reuse.
//!
//! Building a sandbox runs the whole pipeline:
//!
//! ```text
//! SandboxConfig ──► ShadowRegistry ──► InstrumentationPlan ──► TransformedClasses ──► BindingTable
//!                     (catalog)          (class path)            (stubs)               (policies)
//! ```
//!
//! The result of that pipeline is an [`Instrumentation`]. It is immutable once
//! built, so under [`ReusePolicy::SameConfig`] the manager caches it per
//! configuration and hands the same `Arc` to every sandbox with that
//! configuration. Mutable state is never cached.

use std::{
    ops::Deref,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use dashmap::DashMap;
use log::{debug, info, warn};

use crate::{
    binder::{Binder, BindingTable, ShadowRegistry},
    model::{ClassPath, SandboxId, ShadowCatalog},
    planner::{InstrumentationPlan, InstrumentationPlanner},
    sandbox::{ReusePolicy, Sandbox, SandboxConfig},
    transform::{ClassTransformer, TransformedClasses},
    Result,
};

static NEXT_SANDBOX_ID: AtomicU64 = AtomicU64::new(1);

fn next_sandbox_id() -> SandboxId {
    SandboxId::new(NEXT_SANDBOX_ID.fetch_add(1, Ordering::Relaxed))
}

/// The immutable product of planning, transforming and binding one
/// configuration.
#[derive(Debug)]
pub struct Instrumentation {
    config: SandboxConfig,
    plan: InstrumentationPlan,
    classes: TransformedClasses,
    registry: ShadowRegistry,
    bindings: BindingTable,
}

impl Instrumentation {
    /// Runs the instrumentation pipeline for `config`.
    ///
    /// Every class targeted by an active shadow is instrumented, in addition
    /// to what the configuration names.
    ///
    /// # Errors
    ///
    /// Any [`crate::ConfigError`] found while resolving shadows, planning or
    /// binding, and [`crate::Error::ReservedName`] from the transformer.
    pub fn build(class_path: &ClassPath, catalog: &ShadowCatalog, config: &SandboxConfig) -> Result<Self> {
        let registry = ShadowRegistry::from_config(catalog, config, class_path)?;
        let plan = InstrumentationPlanner::new()
            .with_shadow_targets(registry.targets())
            .plan(class_path, config)?;
        let classes = ClassTransformer::new().transform(&plan)?;
        let bindings = Binder::bind(&registry, &classes)?;

        debug!(
            "Instrumented {} of {} classes, {} shadows active",
            plan.instrumented_count(),
            classes.len(),
            registry.len()
        );

        Ok(Self {
            config: config.clone(),
            plan,
            classes,
            registry,
            bindings,
        })
    }

    /// The configuration this was built from.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// The instrumentation decision for every class.
    #[must_use]
    pub fn plan(&self) -> &InstrumentationPlan {
        &self.plan
    }

    /// The loaded classes.
    #[must_use]
    pub fn classes(&self) -> &TransformedClasses {
        &self.classes
    }

    /// The dispatch policy of every instrumented member.
    #[must_use]
    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    /// The active shadows.
    #[must_use]
    pub fn registry(&self) -> &ShadowRegistry {
        &self.registry
    }
}

/// Creates sandboxes from a fixed class path and shadow catalog.
///
/// The manager is `Send + Sync`; scenarios on different threads can create
/// and run their own sandboxes concurrently.
///
/// # Examples
///
/// ```rust,ignore
/// let manager = SandboxManager::new(class_path, catalog).with_reuse(ReusePolicy::SameConfig);
/// let config = SandboxConfig::new().shadow("ShadowPaint");
///
/// let color = manager.run(&config, |sandbox| {
///     let paint = sandbox.new_instance("android.graphics.Paint", &[])?;
///     sandbox.invoke(&paint, &set_color, &[Value::Int(0xff00)])?;
///     sandbox.invoke(&paint, &get_color, &[])
/// })?;
/// ```
#[derive(Debug)]
pub struct SandboxManager {
    class_path: Arc<ClassPath>,
    catalog: Arc<ShadowCatalog>,
    reuse: ReusePolicy,
    cache: DashMap<SandboxConfig, Arc<Instrumentation>>,
}

impl SandboxManager {
    /// Creates a manager that builds fresh instrumentation for every sandbox.
    #[must_use]
    pub fn new(class_path: ClassPath, catalog: ShadowCatalog) -> Self {
        Self {
            class_path: Arc::new(class_path),
            catalog: Arc::new(catalog),
            reuse: ReusePolicy::default(),
            cache: DashMap::new(),
        }
    }

    /// Sets the reuse policy.
    #[must_use]
    pub fn with_reuse(mut self, reuse: ReusePolicy) -> Self {
        self.reuse = reuse;
        self
    }

    /// The reuse policy in effect.
    #[must_use]
    pub fn reuse(&self) -> ReusePolicy {
        self.reuse
    }

    /// The class path sandboxes load from.
    #[must_use]
    pub fn class_path(&self) -> &ClassPath {
        &self.class_path
    }

    /// The shadows configurations can choose from.
    #[must_use]
    pub fn catalog(&self) -> &ShadowCatalog {
        &self.catalog
    }

    fn instrumentation(&self, config: &SandboxConfig) -> Result<Arc<Instrumentation>> {
        match self.reuse {
            ReusePolicy::Never => Ok(Arc::new(Instrumentation::build(
                &self.class_path,
                &self.catalog,
                config,
            )?)),
            ReusePolicy::SameConfig => {
                if let Some(cached) = self.cache.get(config) {
                    debug!("Reusing instrumentation for {:?}", config.shadows);
                    return Ok(cached.clone());
                }
                let built = Arc::new(Instrumentation::build(&self.class_path, &self.catalog, config)?);
                // Another thread may have built the same config meanwhile; keep the first.
                Ok(self
                    .cache
                    .entry(config.clone())
                    .or_insert(built)
                    .clone())
            }
        }
    }

    /// Builds a new active sandbox.
    ///
    /// # Errors
    ///
    /// Any configuration error; the sandbox is not created.
    pub fn create(&self, config: &SandboxConfig) -> Result<Sandbox> {
        let instrumentation = self.instrumentation(config)?;
        let id = next_sandbox_id();
        info!(
            "Created {} ({} instrumented classes, {} shadows, reuse {})",
            id,
            instrumentation.plan().instrumented_count(),
            instrumentation.registry().len(),
            self.reuse
        );
        Ok(Sandbox::new(id, config.clone(), instrumentation))
    }

    /// Runs `scenario` in a fresh sandbox and tears the sandbox down
    /// afterwards, whether the scenario succeeded or not.
    ///
    /// # Errors
    ///
    /// Configuration errors, then whatever the scenario returns.
    pub fn run<R>(&self, config: &SandboxConfig, scenario: impl FnOnce(&Sandbox) -> Result<R>) -> Result<R> {
        let sandbox = self.create(config)?;
        let result = scenario(&sandbox);
        if let Err(e) = sandbox.teardown() {
            warn!("Teardown of {} failed: {}", sandbox.id(), e);
        }
        result
    }

    /// Creates a sandbox that tears itself down when the guard is dropped.
    ///
    /// # Errors
    ///
    /// Any configuration error.
    pub fn scenario(&self, config: &SandboxConfig) -> Result<ScenarioGuard> {
        Ok(ScenarioGuard {
            sandbox: self.create(config)?,
        })
    }

    /// Configurations with cached instrumentation.
    #[must_use]
    pub fn cached_configs(&self) -> usize {
        self.cache.len()
    }

    /// Drops all cached instrumentation.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

/// A sandbox scoped to a Rust scope.
///
/// Dereferences to the [`Sandbox`]; tears it down on drop.
#[derive(Debug)]
pub struct ScenarioGuard {
    sandbox: Sandbox,
}

impl ScenarioGuard {
    /// A handle to the guarded sandbox that outlives the guard.
    ///
    /// The handle reports [`crate::Error::SandboxDestroyed`] once the guard
    /// has been dropped.
    #[must_use]
    pub fn handle(&self) -> Sandbox {
        self.sandbox.clone()
    }
}

impl Deref for ScenarioGuard {
    type Target = Sandbox;

    fn deref(&self) -> &Sandbox {
        &self.sandbox
    }
}

impl Drop for ScenarioGuard {
    fn drop(&mut self) {
        if let Err(e) = self.sandbox.teardown() {
            warn!("Teardown of {} failed: {}", self.sandbox.id(), e);
        }
    }
}
