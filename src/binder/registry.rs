use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    model::{ClassPath, ShadowCatalog, ShadowClass},
    sandbox::SandboxConfig,
    Result,
};

/// Index of an active shadow within one registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShadowId(pub(crate) usize);

impl fmt::Display for ShadowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shadow#{}", self.0)
    }
}

/// The shadows active in one sandbox configuration, indexed by target class.
#[derive(Clone, Debug, Default)]
pub struct ShadowRegistry {
    shadows: Vec<Arc<ShadowClass>>,
    by_target: HashMap<String, ShadowId>,
    by_name: HashMap<String, ShadowId>,
}

impl ShadowRegistry {
    /// Resolves the shadows a configuration activates.
    ///
    /// Naming the same shadow more than once activates it once.
    ///
    /// # Errors
    ///
    /// - [`crate::ConfigError::UnknownShadow`] if a named shadow is not in the catalog
    /// - [`crate::ConfigError::UnknownTarget`] if a shadow targets a class not on the class path
    /// - [`crate::ConfigError::DuplicateShadow`] if two active shadows target the same class
    pub fn from_config(
        catalog: &ShadowCatalog,
        config: &SandboxConfig,
        class_path: &ClassPath,
    ) -> Result<Self> {
        let mut registry = ShadowRegistry::default();

        for name in &config.shadows {
            if registry.by_name.contains_key(name) {
                continue;
            }
            let shadow = catalog
                .get(name)
                .ok_or_else(|| config_error!(UnknownShadow(name.as_str())))?;

            if !class_path.contains(shadow.target()) {
                return Err(config_error!(UnknownTarget {
                    shadow: shadow.name(),
                    target: shadow.target(),
                }));
            }
            if let Some(first) = registry.by_target.get(shadow.target()) {
                return Err(config_error!(DuplicateShadow {
                    class: shadow.target(),
                    first: registry.shadows[first.0].name(),
                    second: shadow.name(),
                }));
            }

            let id = ShadowId(registry.shadows.len());
            registry.by_target.insert(shadow.target().to_string(), id);
            registry.by_name.insert(shadow.name().to_string(), id);
            registry.shadows.push(shadow.clone());
        }

        Ok(registry)
    }

    /// Returns a shadow by id.
    #[must_use]
    pub fn get(&self, id: ShadowId) -> Option<&Arc<ShadowClass>> {
        self.shadows.get(id.0)
    }

    /// Finds the active shadow of a real class.
    #[must_use]
    pub fn shadow_for(&self, class: &str) -> Option<(ShadowId, &Arc<ShadowClass>)> {
        let id = *self.by_target.get(class)?;
        self.get(id).map(|shadow| (id, shadow))
    }

    /// Finds an active shadow by its name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<(ShadowId, &Arc<ShadowClass>)> {
        let id = *self.by_name.get(name)?;
        self.get(id).map(|shadow| (id, shadow))
    }

    /// Iterates the target classes of all active shadows.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.shadows.iter().map(|s| s.target())
    }

    /// Number of active shadows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    /// Returns `true` if no shadow is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }
}
