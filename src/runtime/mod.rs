//! Dispatch runtime and per-sandbox state.
//!
//! The runtime owns everything a sandbox creates while it is active:
//!
//! - the instance heap
//! - static fields of real classes
//! - shadow associations and shadow statics
//! - the task queue and its virtual clock
//!
//! All of it hangs off one `SandboxState`, which the [`Sandbox`](crate::Sandbox)
//! handle drops at teardown. Calls go through [`Invocation`]s and, for
//! instrumented classes, through the binding table.
//!
//! # Key Components
//!
//! - [`Invocation`] - The call context passed to bodies and shadow handlers
//! - [`ShadowRef`] - Scoped access to the shadow state of the receiver
//! - [`DirectHandle`] - The direct-call bridge to preserved original bodies
//! - [`Task`] - Deferred work for the cooperative queue

mod association;
mod direct;
pub(crate) mod dispatch;
mod heap;
mod invocation;
mod queue;
mod statics;

use std::sync::Arc;

pub use association::ShadowRef;
pub use direct::DirectHandle;
pub use invocation::Invocation;
pub use queue::Task;

pub(crate) use association::ShadowAssociations;
pub(crate) use heap::Heap;
pub(crate) use queue::TaskQueue;
pub(crate) use statics::{ShadowStatics, StaticFieldStorage};

use crate::{
    binder::{BindingTable, ShadowRegistry},
    model::{ObjectRef, SandboxId},
    sandbox::Instrumentation,
    transform::{ClassId, LoadedClass, TransformedClasses},
    Error, Result,
};

/// Everything one active sandbox owns.
pub(crate) struct SandboxState {
    pub(crate) id: SandboxId,
    pub(crate) instrumentation: Arc<Instrumentation>,
    pub(crate) heap: Heap,
    pub(crate) statics: StaticFieldStorage,
    pub(crate) shadow_statics: ShadowStatics,
    pub(crate) associations: ShadowAssociations,
    pub(crate) queue: TaskQueue,
}

impl SandboxState {
    pub(crate) fn new(id: SandboxId, instrumentation: Arc<Instrumentation>) -> Self {
        Self {
            id,
            instrumentation,
            heap: Heap::new(),
            statics: StaticFieldStorage::new(),
            shadow_statics: ShadowStatics::new(),
            associations: ShadowAssociations::new(),
            queue: TaskQueue::new(),
        }
    }

    pub(crate) fn classes(&self) -> &TransformedClasses {
        self.instrumentation.classes()
    }

    pub(crate) fn bindings(&self) -> &BindingTable {
        self.instrumentation.bindings()
    }

    pub(crate) fn registry(&self) -> &ShadowRegistry {
        self.instrumentation.registry()
    }

    /// Resolves a class name to its loaded id.
    pub(crate) fn class_id(&self, name: &str) -> Result<ClassId> {
        self.classes()
            .id(name)
            .ok_or_else(|| Error::UnknownClass(name.to_string()))
    }

    pub(crate) fn loaded(&self, id: ClassId) -> Result<&LoadedClass> {
        self.classes()
            .get(id)
            .ok_or_else(|| Error::Error(format!("No class with id {}", id.0)))
    }

    /// Fails unless `obj` was allocated by this sandbox.
    pub(crate) fn check_owner(&self, obj: &ObjectRef) -> Result<()> {
        if obj.sandbox() == self.id {
            Ok(())
        } else {
            Err(Error::ForeignObject {
                object: obj.id(),
                owner: obj.sandbox(),
                sandbox: self.id,
            })
        }
    }
}
