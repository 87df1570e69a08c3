//! The table of objects created by the write phase.

use std::fmt;
use std::sync::OnceLock;

use s3bench_service::EndpointId;

use crate::error::{Error, Result};

/// An object written during the write phase.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    /// The position of the object in the registry.
    pub sequence_id: usize,
    /// The object key.
    pub key: String,
    /// The etag reported by the backend on write.
    pub etag: String,
    /// The number of bytes written.
    pub size: u64,
    /// The endpoint holding the object.
    pub endpoint: EndpointId,
}

/// Objects of a benchmark run, indexed by sequence id.
///
/// Every slot is written at most once, by the worker that claimed its sequence id. Workers of
/// later phases only read.
pub struct ObjectRegistry {
    slots: Box<[OnceLock<ObjectRecord>]>,
}

impl ObjectRegistry {
    /// Creates a registry for sequence ids `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
        }
    }

    /// The number of objects this registry was created for.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Records an object in the slot of its sequence id.
    ///
    /// Returns the record back if the sequence id is out of range or already taken.
    pub fn insert(&self, record: ObjectRecord) -> Result<(), ObjectRecord> {
        match self.slots.get(record.sequence_id) {
            Some(slot) => slot.set(record),
            None => Err(record),
        }
    }

    /// Looks up the object with the given sequence id.
    pub fn get(&self, sequence_id: usize) -> Result<&ObjectRecord> {
        self.slots
            .get(sequence_id)
            .and_then(OnceLock::get)
            .ok_or(Error::MissingRecord { sequence_id })
    }

    /// The number of recorded objects.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns `true` if no object has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails unless every sequence id has a recorded object.
    pub fn ensure_complete(&self) -> Result<()> {
        let actual = self.len();
        if actual != self.capacity() {
            return Err(Error::IncompleteRegistry {
                expected: self.capacity(),
                actual,
            });
        }
        Ok(())
    }

    /// Iterates over all recorded objects in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &ObjectRecord> {
        self.slots.iter().filter_map(OnceLock::get)
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use s3bench_service::EndpointPool;
    use s3bench_service::backend::InMemoryBackend;
    use s3bench_service::{Endpoint, RetryPolicy};

    use super::*;

    fn endpoint_id() -> EndpointId {
        let endpoint = Endpoint::new(
            "test",
            Box::new(InMemoryBackend::default()),
            RetryPolicy::default(),
            None,
        );
        EndpointPool::new(vec![endpoint]).unwrap().route(0)
    }

    fn record(sequence_id: usize) -> ObjectRecord {
        ObjectRecord {
            sequence_id,
            key: format!("benchmark/{sequence_id:032x}.png"),
            etag: "etag".into(),
            size: 16 * 1024,
            endpoint: endpoint_id(),
        }
    }

    #[test]
    fn records_each_slot_once() {
        let registry = ObjectRegistry::new(2);
        assert!(registry.is_empty());

        registry.insert(record(1)).unwrap();
        assert_eq!(registry.get(1).unwrap().sequence_id, 1);
        assert!(registry.insert(record(1)).is_err());
        assert!(registry.insert(record(2)).is_err());

        assert!(matches!(
            registry.get(0),
            Err(Error::MissingRecord { sequence_id: 0 })
        ));
    }

    #[test]
    fn detects_incomplete_registries() {
        let registry = ObjectRegistry::new(3);
        registry.insert(record(0)).unwrap();
        registry.insert(record(2)).unwrap();

        assert!(matches!(
            registry.ensure_complete(),
            Err(Error::IncompleteRegistry {
                expected: 3,
                actual: 2
            })
        ));

        registry.insert(record(1)).unwrap();
        registry.ensure_complete().unwrap();

        let ids: Vec<_> = registry.iter().map(|r| r.sequence_id).collect();
        assert_eq!(ids, [0, 1, 2]);
    }
}
