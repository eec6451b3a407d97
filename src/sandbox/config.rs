//! Scenario configuration.
//!
//! A [`SandboxConfig`] lists what a scenario wants from its sandbox:
//!
//! - `shadows` - names of catalog shadows to activate
//! - `instrumented_packages` - package prefixes whose classes are instrumented
//! - `instrumented_classes` - individual classes to instrument
//!
//! Configs are plain data. Two configs compare equal when their lists are
//! equal, which is what [`ReusePolicy::SameConfig`] keys on.
//!
//! # Example
//!
//! ```rust
//! use shadowbox::sandbox::SandboxConfig;
//!
//! let base = SandboxConfig::new().shadow("ShadowPaint");
//! let config = base.merge(
//!     &SandboxConfig::new()
//!         .instrument_package("android.media")
//!         .shadow("ShadowPaint"),
//! );
//!
//! assert_eq!(config.shadows, vec!["ShadowPaint".to_string()]);
//! assert_eq!(config.instrumented_packages, vec!["android.media".to_string()]);
//! ```

use strum::{Display, EnumIter};

/// Configuration of one sandbox.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SandboxConfig {
    /// Shadows to activate, by catalog name.
    pub shadows: Vec<String>,
    /// Package patterns whose classes are instrumented.
    pub instrumented_packages: Vec<String>,
    /// Classes instrumented regardless of package.
    pub instrumented_classes: Vec<String>,
}

impl SandboxConfig {
    /// Creates an empty configuration: no shadows, nothing instrumented.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activates a shadow.
    #[must_use]
    pub fn shadow(mut self, name: impl Into<String>) -> Self {
        self.shadows.push(name.into());
        self
    }

    /// Activates several shadows.
    #[must_use]
    pub fn shadows<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shadows.extend(names.into_iter().map(Into::into));
        self
    }

    /// Instruments every class in a package and its subpackages.
    #[must_use]
    pub fn instrument_package(mut self, pattern: impl Into<String>) -> Self {
        self.instrumented_packages.push(pattern.into());
        self
    }

    /// Instruments a single class.
    #[must_use]
    pub fn instrument_class(mut self, class: impl Into<String>) -> Self {
        self.instrumented_classes.push(class.into());
        self
    }

    /// Returns the union of two configurations, without duplicates.
    ///
    /// Entries keep their first-seen order, `self` first.
    #[must_use]
    pub fn merge(&self, other: &SandboxConfig) -> SandboxConfig {
        fn union(a: &[String], b: &[String]) -> Vec<String> {
            let mut out: Vec<String> = Vec::with_capacity(a.len() + b.len());
            for item in a.iter().chain(b) {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            out
        }

        SandboxConfig {
            shadows: union(&self.shadows, &other.shadows),
            instrumented_packages: union(&self.instrumented_packages, &other.instrumented_packages),
            instrumented_classes: union(&self.instrumented_classes, &other.instrumented_classes),
        }
    }
}

/// Whether sandboxes with equal configuration share instrumentation.
///
/// Only the immutable part (plan, transformed classes, binding table) is ever
/// shared. Heap, statics, associations and queue are always fresh.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum ReusePolicy {
    /// Plan, transform and bind for every sandbox.
    #[default]
    #[strum(to_string = "never")]
    Never,
    /// Cache instrumentation per distinct configuration.
    #[strum(to_string = "same-config")]
    SameConfig,
}
