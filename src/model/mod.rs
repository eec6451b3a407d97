//! Descriptor model for real classes, shadow classes and runtime values.
//!
//! Everything in this module is static description. Nothing here is tied to
//! a sandbox: the same [`ClassPath`] and [`ShadowCatalog`] feed every sandbox
//! a manager creates.
//!
//! # Key Components
//!
//! - [`RealClass`] / [`ClassPath`] - Definitions of interceptable platform classes
//! - [`RealClassDescriptor`] - A class as enumerated for one plan
//! - [`MemberDescriptor`] / [`MemberSignature`] - Methods and constructors
//! - [`ShadowClass`] / [`ShadowCatalog`] - Substitute implementations
//! - [`Value`] / [`TypeDesc`] / [`ObjectRef`] - Dynamic values crossing dispatch stubs

mod class;
mod member;
mod shadow;
mod value;

pub use class::{
    package_of, ClassModifiers, ClassPath, MemberIndex, RealClass, RealClassBuilder,
    RealClassDescriptor,
};
pub use member::{
    Body, MemberDescriptor, MemberKind, MemberModifiers, MemberSignature, Visibility,
    CONSTRUCTOR_NAME,
};
pub use shadow::{
    InstanceHandler, ShadowCatalog, ShadowClass, ShadowClassBuilder, ShadowHandler, ShadowMember,
    ShadowState, StaticHandler, CONSTRUCTOR_METHOD_NAME,
};
pub use value::{ObjectId, ObjectRef, SandboxId, TypeDesc, Value};
