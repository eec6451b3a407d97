//! Instrumentation planning.
//!
//! The planner decides which real classes get dispatch stubs in a sandbox. A
//! class is selected when any of the following holds:
//!
//! | Reason | Source |
//! |--------|--------|
//! | [`SelectionReason::Explicit`] | named in [`SandboxConfig::instrumented_classes`] |
//! | [`SelectionReason::ShadowTarget`] | targeted by an active shadow |
//! | [`SelectionReason::Package`] | its package matches an instrumented package pattern |
//!
//! Reasons are listed in precedence order. Every other class is enumerated as
//! well, but stays uninstrumented and keeps its original behavior.
//!
//! Planning has no side effects; a plan only takes effect once handed to the
//! [`crate::transform::ClassTransformer`].

use std::{collections::HashMap, fmt};

use log::debug;
use rayon::prelude::*;
use strum::{Display, EnumIs};

use crate::{
    model::{ClassPath, RealClass, RealClassDescriptor},
    sandbox::SandboxConfig,
    Result,
};

/// Why a class was selected for instrumentation.
#[derive(Clone, Debug, PartialEq, Eq, Display, EnumIs)]
pub enum SelectionReason {
    /// Named explicitly in the configuration.
    #[strum(to_string = "explicit")]
    Explicit,
    /// Target of an active shadow.
    #[strum(to_string = "shadow target")]
    ShadowTarget,
    /// Inside an instrumented package.
    #[strum(to_string = "package {0}")]
    Package(String),
}

/// A package prefix matched on segment boundaries.
///
/// `android.media` matches the packages `android.media` and
/// `android.media.session`, but not `android.mediax`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PackagePattern(String);

impl PackagePattern {
    /// Parses a package pattern. A single trailing `.` is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConfigError::InvalidPackagePattern`] for empty patterns
    /// or patterns that are not a dotted identifier path.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use shadowbox::planner::PackagePattern;
    ///
    /// let pattern = PackagePattern::parse("android.media.")?;
    /// assert!(pattern.matches("android.media"));
    /// assert!(pattern.matches("android.media.session"));
    /// assert!(!pattern.matches("android.mediax"));
    /// assert!(PackagePattern::parse("android..media").is_err());
    /// # Ok::<(), shadowbox::Error>(())
    /// ```
    pub fn parse(pattern: &str) -> Result<Self> {
        let trimmed = pattern.strip_suffix('.').unwrap_or(pattern);
        let valid = !trimmed.is_empty()
            && trimmed.split('.').all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
            });

        if !valid {
            return Err(config_error!(InvalidPackagePattern(pattern)));
        }
        Ok(PackagePattern(trimmed.to_string()))
    }

    /// Returns `true` if `package` equals the pattern or is nested inside it.
    #[must_use]
    pub fn matches(&self, package: &str) -> bool {
        package
            .strip_prefix(self.0.as_str())
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
    }

    /// The normalized pattern.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackagePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The outcome of planning: every class on the class path, enumerated, with
/// its instrumentation decision.
#[derive(Clone, Debug)]
pub struct InstrumentationPlan {
    classes: Vec<RealClassDescriptor>,
    index: HashMap<String, usize>,
    reasons: HashMap<String, SelectionReason>,
}

impl InstrumentationPlan {
    /// Returns `true` if the named class is selected.
    #[must_use]
    pub fn is_instrumented(&self, class: &str) -> bool {
        self.reasons.contains_key(class)
    }

    /// Returns the enumerated descriptor of a class.
    #[must_use]
    pub fn descriptor(&self, class: &str) -> Option<&RealClassDescriptor> {
        self.index.get(class).map(|&i| &self.classes[i])
    }

    /// Iterates the selected classes in name order.
    pub fn instrumented(&self) -> impl Iterator<Item = &RealClassDescriptor> {
        self.classes.iter().filter(|c| c.instrumented())
    }

    /// Why a class was selected, or `None` if it was not.
    #[must_use]
    pub fn reason(&self, class: &str) -> Option<&SelectionReason> {
        self.reasons.get(class)
    }

    /// All enumerated classes in name order.
    #[must_use]
    pub fn classes(&self) -> &[RealClassDescriptor] {
        &self.classes
    }

    /// Number of selected classes.
    #[must_use]
    pub fn instrumented_count(&self) -> usize {
        self.reasons.len()
    }
}

/// Builds [`InstrumentationPlan`]s from a class path and configuration.
#[derive(Clone, Debug, Default)]
pub struct InstrumentationPlanner {
    shadow_targets: Vec<String>,
}

impl InstrumentationPlanner {
    /// Creates a planner with no shadow targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds classes targeted by active shadows; they are always instrumented.
    #[must_use]
    pub fn with_shadow_targets<I, T>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.shadow_targets.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Plans instrumentation of `class_path` for `config`.
    ///
    /// # Errors
    ///
    /// - [`crate::ConfigError::UnknownClass`] for an explicit class that is not on the class path
    /// - [`crate::ConfigError::InvalidPackagePattern`] for a malformed package pattern
    /// - [`crate::ConfigError::UnknownSuperclass`] if a class extends a missing class
    pub fn plan(&self, class_path: &ClassPath, config: &SandboxConfig) -> Result<InstrumentationPlan> {
        for class in &config.instrumented_classes {
            if !class_path.contains(class) {
                return Err(config_error!(UnknownClass(class.as_str())));
            }
        }

        let patterns = config
            .instrumented_packages
            .iter()
            .map(|p| PackagePattern::parse(p))
            .collect::<Result<Vec<_>>>()?;

        for class in class_path.iter() {
            if let Some(superclass) = class.superclass() {
                if !class_path.contains(superclass) {
                    return Err(config_error!(UnknownSuperclass {
                        class: class.name(),
                        superclass: superclass.to_string(),
                    }));
                }
            }
        }

        let classes: Vec<&std::sync::Arc<RealClass>> = class_path.iter().collect();
        let classified: Vec<(RealClassDescriptor, Option<SelectionReason>)> = classes
            .par_iter()
            .map(|class| {
                let reason = self.select(class, config, &patterns);
                (
                    RealClassDescriptor::enumerate(class, reason.is_some()),
                    reason,
                )
            })
            .collect();

        let mut plan = InstrumentationPlan {
            classes: Vec::with_capacity(classified.len()),
            index: HashMap::with_capacity(classified.len()),
            reasons: HashMap::new(),
        };
        for (i, (descriptor, reason)) in classified.into_iter().enumerate() {
            plan.index.insert(descriptor.name().to_string(), i);
            if let Some(reason) = reason {
                plan.reasons.insert(descriptor.name().to_string(), reason);
            }
            plan.classes.push(descriptor);
        }

        debug!(
            "planned {} of {} classes for instrumentation",
            plan.instrumented_count(),
            plan.classes.len()
        );
        Ok(plan)
    }

    fn select(
        &self,
        class: &RealClass,
        config: &SandboxConfig,
        patterns: &[PackagePattern],
    ) -> Option<SelectionReason> {
        if config.instrumented_classes.iter().any(|c| c == class.name()) {
            return Some(SelectionReason::Explicit);
        }
        if self.shadow_targets.iter().any(|t| t == class.name()) {
            return Some(SelectionReason::ShadowTarget);
        }
        patterns
            .iter()
            .find(|p| p.matches(class.package()))
            .map(|p| SelectionReason::Package(p.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{test::fixture_class_path, ConfigError, Error};

    #[test]
    fn test_nothing_instrumented_by_default() {
        let plan = InstrumentationPlanner::new()
            .plan(&fixture_class_path(), &SandboxConfig::default())
            .unwrap();

        assert_eq!(plan.instrumented_count(), 0);
        assert!(plan.descriptor("org.shadowbox.testing.Greeter").is_some());
    }

    #[test]
    fn test_explicit_class() {
        let config = SandboxConfig::new().instrument_class("org.shadowbox.testing.Greeter");
        let plan = InstrumentationPlanner::new()
            .plan(&fixture_class_path(), &config)
            .unwrap();

        assert!(plan.is_instrumented("org.shadowbox.testing.Greeter"));
        assert!(!plan.is_instrumented("org.shadowbox.testing.Pony"));
        assert_eq!(
            plan.reason("org.shadowbox.testing.Greeter"),
            Some(&SelectionReason::Explicit)
        );
    }

    #[test]
    fn test_package_selection() {
        let config = SandboxConfig::new().instrument_package("android.graphics");
        let plan = InstrumentationPlanner::new()
            .plan(&fixture_class_path(), &config)
            .unwrap();

        assert!(plan.is_instrumented("android.graphics.Paint"));
        assert!(!plan.is_instrumented("org.shadowbox.testing.Greeter"));
        assert!(matches!(
            plan.reason("android.graphics.Paint"),
            Some(SelectionReason::Package(p)) if p == "android.graphics"
        ));
    }

    #[test]
    fn test_shadow_targets_are_selected() {
        let plan = InstrumentationPlanner::new()
            .with_shadow_targets(["org.shadowbox.testing.Pony"])
            .plan(&fixture_class_path(), &SandboxConfig::default())
            .unwrap();

        assert_eq!(
            plan.reason("org.shadowbox.testing.Pony"),
            Some(&SelectionReason::ShadowTarget)
        );
        let names: Vec<_> = plan.instrumented().map(|c| c.name()).collect();
        assert_eq!(names, vec!["org.shadowbox.testing.Pony"]);
    }

    #[test]
    fn test_unknown_explicit_class() {
        let config = SandboxConfig::new().instrument_class("no.such.Class");
        let result = InstrumentationPlanner::new().plan(&fixture_class_path(), &config);

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnknownClass(ref c))) if c == "no.such.Class"
        ));
    }

    #[test]
    fn test_unknown_superclass() {
        let class_path = fixture_class_path()
            .with(
                crate::model::RealClass::builder("org.shadowbox.testing.Orphan")
                    .extends("org.shadowbox.missing.Parent")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let result = InstrumentationPlanner::new().plan(&class_path, &SandboxConfig::default());

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::UnknownSuperclass { ref class, ref superclass }))
                if class == "org.shadowbox.testing.Orphan" && superclass == "org.shadowbox.missing.Parent"
        ));
    }

    #[test]
    fn test_invalid_pattern() {
        let config = SandboxConfig::new().instrument_package("");
        let result = InstrumentationPlanner::new().plan(&fixture_class_path(), &config);

        assert!(matches!(
            result,
            Err(Error::Config(ConfigError::InvalidPackagePattern(_)))
        ));
    }

    #[test]
    fn test_planning_is_repeatable() {
        let class_path = fixture_class_path();
        let config = SandboxConfig::new().instrument_package("org.shadowbox");
        let planner = InstrumentationPlanner::new();

        let first = planner.plan(&class_path, &config).unwrap();
        let second = planner.plan(&class_path, &config).unwrap();
        let names = |p: &InstrumentationPlan| {
            p.instrumented().map(|c| c.name().to_string()).collect::<Vec<_>>()
        };
        assert_eq!(names(&first), names(&second));
    }

    #[test]
    fn test_segment_boundaries() {
        let pattern = PackagePattern::parse("a.b").unwrap();
        assert!(pattern.matches("a.b"));
        assert!(pattern.matches("a.b.c"));
        assert!(!pattern.matches("a.bc"));
        assert!(!pattern.matches("a"));
    }
}
