//! Append-only instance storage for one sandbox.
//!
//! Instances are never freed while their sandbox lives; the whole heap is
//! dropped at teardown. [`ObjectId`]s are indices into the heap.

use std::{collections::HashMap, fmt, sync::RwLock};

use crate::{model::ObjectId, model::Value, transform::ClassId, Error, Result};

#[derive(Debug)]
struct Instance {
    class: ClassId,
    fields: RwLock<HashMap<String, Value>>,
}

/// Per-sandbox instance heap.
pub(crate) struct Heap {
    instances: boxcar::Vec<Instance>,
}

impl Heap {
    pub(crate) fn new() -> Self {
        Self {
            instances: boxcar::Vec::new(),
        }
    }

    /// Allocates an instance with no fields set.
    pub(crate) fn alloc(&self, class: ClassId) -> ObjectId {
        ObjectId(self.instances.push(Instance {
            class,
            fields: RwLock::new(HashMap::new()),
        }))
    }

    fn instance(&self, id: ObjectId) -> Result<&Instance> {
        self.instances
            .get(id.0)
            .ok_or_else(|| Error::Error(format!("No instance {id} in this sandbox")))
    }

    /// The runtime class of an instance.
    pub(crate) fn class_of(&self, id: ObjectId) -> Result<ClassId> {
        Ok(self.instance(id)?.class)
    }

    /// Reads a field; unset fields read as [`Value::Null`].
    pub(crate) fn get_field(&self, id: ObjectId, name: &str) -> Result<Value> {
        let fields = read_lock!(self.instance(id)?.fields)?;
        Ok(fields.get(name).cloned().unwrap_or(Value::Null))
    }

    /// Writes a field, returning the previous value.
    pub(crate) fn set_field(&self, id: ObjectId, name: &str, value: Value) -> Result<Option<Value>> {
        let mut fields = write_lock!(self.instance(id)?.fields)?;
        Ok(fields.insert(name.to_string(), value))
    }

    /// Number of allocated instances.
    pub(crate) fn len(&self) -> usize {
        self.instances.count()
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap").field("instances", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_fields() {
        let heap = Heap::new();
        let a = heap.alloc(ClassId(0));
        let b = heap.alloc(ClassId(1));

        assert_ne!(a, b);
        assert_eq!(heap.class_of(b).unwrap(), ClassId(1));
        assert_eq!(heap.get_field(a, "x").unwrap(), Value::Null);

        assert_eq!(heap.set_field(a, "x", Value::Int(4)).unwrap(), None);
        assert_eq!(heap.get_field(a, "x").unwrap(), Value::Int(4));
        assert_eq!(heap.get_field(b, "x").unwrap(), Value::Null);
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_unknown_instance() {
        let heap = Heap::new();
        assert!(heap.class_of(ObjectId(9)).is_err());
    }
}
