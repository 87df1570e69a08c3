//! In-memory backend for tests and dry runs.
//!
//! This provides a [`Backend`] backed by a `HashMap`, removing the need for a running storage
//! service in tests. The backend is [`Clone`] so tests can hold a handle for direct inspection
//! and fault injection while an [`Endpoint`](crate::Endpoint) owns a boxed copy.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use uuid::Uuid;

use super::common::{Backend, BackendError, BackendResult, ObjectStat, PayloadStream, PutResponse};

/// Size of the chunks yielded by [`InMemoryBackend::get_object`].
const CHUNK_SIZE: usize = 4096;

/// A primitive operation, as recorded in the [journal](InMemoryBackend::journal).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BackendOp {
    Put,
    Head,
    Get,
    Delete,
    Copy,
}

/// A failure to inject into the next call of an [`InMemoryBackend`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    /// Fail with the given HTTP status.
    Status(u16),
    /// Fail with an I/O error of the given kind.
    Io(io::ErrorKind),
    /// Never answer.
    Stall,
}

#[derive(Debug)]
struct StoredObject {
    etag: String,
    contents: Bytes,
}

#[derive(Debug, Default)]
struct Store {
    objects: HashMap<String, StoredObject>,
    journal: Vec<(BackendOp, String)>,
    faults: VecDeque<Fault>,
    omit_etags: bool,
}

/// A [`Backend`] keeping objects in process memory.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    name: &'static str,
    store: Arc<Mutex<Store>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemoryBackend {
    /// Creates an empty backend reporting the given name.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            store: Arc::new(Mutex::new(Store::default())),
        }
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        // A poisoned store only means another test thread panicked.
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes the next `count` calls fail with `fault`, in addition to already queued faults.
    pub fn inject(&self, count: usize, fault: Fault) {
        self.store().faults.extend(std::iter::repeat_n(fault, count));
    }

    /// Makes subsequent puts answer without an etag.
    pub fn omit_etags(&self, omit: bool) {
        self.store().omit_etags = omit;
    }

    /// Replaces the stored contents of `key` while keeping its etag.
    ///
    /// Returns `false` if there is no such object.
    pub fn tamper(&self, key: &str, contents: impl Into<Bytes>) -> bool {
        match self.store().objects.get_mut(key) {
            Some(object) => {
                object.contents = contents.into();
                true
            }
            None => false,
        }
    }

    /// Returns a clone of the stored contents, if present.
    pub fn get_stored(&self, key: &str) -> Option<Bytes> {
        self.store()
            .objects
            .get(key)
            .map(|object| object.contents.clone())
    }

    /// Returns `true` if the backend contains an entry for the given key.
    pub fn contains(&self, key: &str) -> bool {
        self.store().objects.contains_key(key)
    }

    /// Returns the number of stored objects.
    pub fn len(&self) -> usize {
        self.store().objects.len()
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.store().objects.is_empty()
    }

    /// Returns every call received so far, in order, including failed ones.
    pub fn journal(&self) -> Vec<(BackendOp, String)> {
        self.store().journal.clone()
    }

    async fn enter(&self, op: BackendOp, key: &str) -> BackendResult<()> {
        let fault = {
            let mut store = self.store();
            store.journal.push((op, key.to_owned()));
            store.faults.pop_front()
        };

        match fault {
            None => Ok(()),
            Some(Fault::Status(404)) => Err(BackendError::NotFound),
            Some(Fault::Status(status)) => Err(BackendError::Status {
                status,
                body: "injected failure".into(),
            }),
            Some(Fault::Io(kind)) => Err(io::Error::new(kind, "injected failure").into()),
            Some(Fault::Stall) => std::future::pending().await,
        }
    }
}

#[async_trait::async_trait]
impl Backend for InMemoryBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn put_object(&self, key: &str, contents: Bytes) -> BackendResult<PutResponse> {
        self.enter(BackendOp::Put, key).await?;

        let etag = Uuid::new_v4().simple().to_string();
        let mut store = self.store();
        store.objects.insert(
            key.to_owned(),
            StoredObject {
                etag: etag.clone(),
                contents,
            },
        );

        let etag = (!store.omit_etags).then_some(etag);
        Ok(PutResponse { etag })
    }

    async fn head_object(&self, key: &str) -> BackendResult<ObjectStat> {
        self.enter(BackendOp::Head, key).await?;

        let store = self.store();
        let object = store.objects.get(key).ok_or(BackendError::NotFound)?;
        Ok(ObjectStat {
            etag: object.etag.clone(),
            size: object.contents.len() as u64,
            last_modified: None,
        })
    }

    async fn get_object(&self, key: &str) -> BackendResult<(ObjectStat, PayloadStream)> {
        self.enter(BackendOp::Get, key).await?;

        let (etag, contents) = {
            let store = self.store();
            let object = store.objects.get(key).ok_or(BackendError::NotFound)?;
            (object.etag.clone(), object.contents.clone())
        };

        let stat = ObjectStat {
            etag,
            size: contents.len() as u64,
            last_modified: None,
        };
        let chunks: Vec<io::Result<Bytes>> = (0..contents.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(contents.slice(start..(start + CHUNK_SIZE).min(contents.len()))))
            .collect();

        Ok((stat, stream::iter(chunks).boxed()))
    }

    async fn delete_object(&self, key: &str) -> BackendResult<()> {
        self.enter(BackendOp::Delete, key).await?;
        self.store().objects.remove(key);
        Ok(())
    }

    async fn copy_object(&self, dst: &str, src: &str) -> BackendResult<()> {
        self.enter(BackendOp::Copy, src).await?;

        let mut store = self.store();
        let object = store.objects.get(src).ok_or(BackendError::NotFound)?;
        let copy = StoredObject {
            etag: object.etag.clone(),
            contents: object.contents.clone(),
        };
        store.objects.insert(dst.to_owned(), copy);
        Ok(())
    }
}
