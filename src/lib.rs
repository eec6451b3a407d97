// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # shadowbox
//!
//! A sandboxed shadow dispatch engine. `shadowbox` runs code written against
//! a platform API (the *real classes*) with selected classes replaced by
//! substitute implementations (*shadows*), inside isolated, disposable
//! sandboxes.
//!
//! ## Features
//!
//! - **Selective instrumentation** - Only configured classes, packages and shadow targets get dispatch stubs
//! - **Total binding** - Every instrumented member is bound to exactly one policy: shadow, pass-through or no-op
//! - **Direct calls** - Shadows and scenarios can still reach the original body of any non-native member
//! - **Isolation** - Heap, static fields, shadow state and task queue are owned by one sandbox and die with it
//! - **Deterministic async** - Shadows post tasks to a cooperative queue with a virtual clock
//!
//! ## Quick Start
//!
//! ```rust
//! use shadowbox::prelude::*;
//!
//! #[derive(Default)]
//! struct GreeterState;
//!
//! let class_path = ClassPath::new().with(
//!     RealClass::builder("demo.Greeter")
//!         .native("hail", [TypeDesc::String], TypeDesc::String)
//!         .method("echo", [TypeDesc::String], TypeDesc::String, |inv| Ok(inv.arg(0)?.clone()))
//!         .build()?,
//! )?;
//!
//! let catalog = ShadowCatalog::new().with(
//!     ShadowClass::builder::<GreeterState>("ShadowGreeter")
//!         .implements("demo.Greeter")
//!         .method("hail", [TypeDesc::String], TypeDesc::String, |_, inv| {
//!             Ok(format!("Hello, {}!", inv.arg_str(0)?).into())
//!         })
//!         .build()?,
//! )?;
//!
//! let manager = SandboxManager::new(class_path, catalog);
//! let reply = manager.run(&SandboxConfig::new().shadow("ShadowGreeter"), |sandbox| {
//!     let greeter = sandbox.new_instance("demo.Greeter", &[])?;
//!     let hail = MemberSignature::new("hail", [TypeDesc::String]);
//!     sandbox.invoke(&greeter, &hail, &["Pony".into()])
//! })?;
//!
//! assert_eq!(reply, Value::from("Hello, Pony!"));
//! # Ok::<(), shadowbox::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  SandboxConfig
//!       │
//!       ▼
//!  ┌──────────┐   ┌───────────┐   ┌────────┐   ┌─────────┐
//!  │ planner  │──►│ transform │──►│ binder │──►│ sandbox │──► runtime (dispatch)
//!  └──────────┘   └───────────┘   └────────┘   └─────────┘
//!   which classes   stubs +         member →      heap, statics,
//!                   originals       policy        shadows, queue
//! ```
//!
//! - [`model`] - Real classes, shadow classes and values
//! - [`planner`] - Selects the classes to instrument
//! - [`transform`] - Produces dispatch stubs and preserved originals
//! - [`binder`] - Binds each instrumented member to a dispatch policy
//! - [`runtime`] - Call dispatch, invocations and the direct-call bridge
//! - [`sandbox`] - Sandbox lifecycle, configuration and reuse
//! - [`shadows`] - Reference shadows
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`](Result). Failures raised by member
//! bodies come back as [`Error::Raised`] exactly as the body produced them:
//!
//! ```rust,ignore
//! match sandbox.invoke(&codec, &start, &[]) {
//!     Ok(_) => {}
//!     Err(Error::Raised(raised)) if raised.kind == "IllegalStateException" => {}
//!     Err(e) if e.is_isolation_violation() => panic!("sandbox misuse: {e}"),
//!     Err(e) => return Err(e),
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade and never installs a logger.
//! Sandbox lifecycle is logged at `info`/`debug`, every dispatched call at
//! `trace`.
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use shadowbox::prelude::*;
///
/// let config = SandboxConfig::new().shadow("ShadowPaint");
/// assert_eq!(config.shadows.len(), 1);
/// ```
pub mod prelude;

pub mod binder;
pub mod model;
pub mod planner;
pub mod runtime;
pub mod sandbox;
pub mod shadows;
pub mod transform;

/// `shadowbox` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `shadowbox` Error type
///
/// Configuration errors are wrapped in [`Error::Config`]; everything else is
/// a runtime error of a single call.
pub use error::{ConfigError, Error, Raised};

/// An isolated execution context.
///
/// See [`sandbox::Sandbox`].
pub use sandbox::{Sandbox, SandboxConfig, SandboxManager};
