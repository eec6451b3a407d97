//! # shadowbox Prelude
//!
//! This module provides a convenient prelude for the most commonly used types
//! from the shadowbox library. Import it to declare classes and shadows and
//! run scenarios without spelling out module paths.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all shadowbox operations
pub use crate::Error;

/// The result type used throughout shadowbox
pub use crate::Result;

/// Configuration errors and failures raised by member bodies
pub use crate::{ConfigError, Raised};

// ================================================================================================
// Declaring Classes and Shadows
// ================================================================================================

/// Real class declarations
pub use crate::model::{ClassModifiers, ClassPath, RealClass, RealClassBuilder};

/// Members and their identity
pub use crate::model::{MemberDescriptor, MemberModifiers, MemberSignature, Visibility};

/// Shadow declarations
pub use crate::model::{ShadowCatalog, ShadowClass, ShadowClassBuilder};

/// Dynamic values crossing dispatch stubs
pub use crate::model::{ObjectRef, SandboxId, TypeDesc, Value};

// ================================================================================================
// Running Scenarios
// ================================================================================================

/// Sandbox lifecycle
pub use crate::sandbox::{ReusePolicy, Sandbox, SandboxConfig, SandboxManager, ScenarioGuard};

/// Call context, shadow state access and the direct-call bridge
pub use crate::runtime::{DirectHandle, Invocation, ShadowRef};

/// Dispatch policies, for inspecting bindings
pub use crate::binder::Policy;
