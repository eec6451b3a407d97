//! Sandbox lifecycle.
//!
//! A [`SandboxManager`] turns a [`SandboxConfig`] into an active [`Sandbox`]:
//! it resolves the requested shadows, plans and applies instrumentation, and
//! binds every instrumented member. Each sandbox then owns its own heap,
//! statics, shadow associations and task queue until it is torn down.
//!
//! ```text
//!   create ──► Active ──► teardown ──► Destroyed
//!                │                        │
//!                └─ invoke / post / idle  └─ every operation: SandboxDestroyed
//! ```
//!
//! # Key Components
//!
//! - [`SandboxManager`] - Builds sandboxes, optionally caching instrumentation
//! - [`Sandbox`] - Handle to one isolated execution context
//! - [`ScenarioGuard`] - Sandbox torn down when it goes out of scope
//! - [`Instrumentation`] - The immutable plan, classes and bindings of a config

mod config;
mod handle;
mod manager;

pub use config::{ReusePolicy, SandboxConfig};
pub use handle::Sandbox;
pub use manager::{Instrumentation, SandboxManager, ScenarioGuard};
