//! Reference shadows.
//!
//! Ready-made real class declarations and shadows for platform APIs. Each
//! submodule exposes an `install` function that adds its classes to a
//! [`ClassPath`] and its shadow to a [`ShadowCatalog`]; a scenario then
//! activates the shadow by name in its [`crate::sandbox::SandboxConfig`].
//!
//! ```rust,ignore
//! let mut class_path = ClassPath::new();
//! let mut catalog = ShadowCatalog::new();
//! shadows::install(&mut class_path, &mut catalog)?;
//!
//! let manager = SandboxManager::new(class_path, catalog);
//! let sandbox = manager.create(&SandboxConfig::new().shadow(codec::SHADOW_MEDIA_CODEC))?;
//! ```

pub mod codec;

use crate::{
    model::{ClassPath, ShadowCatalog},
    Result,
};

/// Installs every reference shadow.
///
/// # Errors
///
/// Fails if any of the classes or shadows is already present.
pub fn install(class_path: &mut ClassPath, catalog: &mut ShadowCatalog) -> Result<()> {
    codec::install(class_path, catalog)
}
