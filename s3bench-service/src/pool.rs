use std::fmt;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

/// Identifies an [`Endpoint`] within its [`EndpointPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(usize);

impl EndpointId {
    /// The position of the endpoint in the pool.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The set of endpoints a benchmark shards its workers across.
///
/// The pool is cheap to clone and shared between all workers of a phase.
#[derive(Clone, Debug)]
pub struct EndpointPool(Arc<[Endpoint]>);

impl EndpointPool {
    /// Creates a pool from at least one endpoint.
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::EmptyPool);
        }
        Ok(Self(endpoints.into()))
    }

    /// The number of endpoints in the pool. Never zero.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`, pools cannot be empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Selects the endpoint serving the given worker, round-robin.
    pub fn route(&self, worker_id: usize) -> EndpointId {
        EndpointId(worker_id % self.0.len())
    }

    /// Returns the endpoint with the given id.
    ///
    /// Ids handed out by the same pool are always valid.
    pub fn get(&self, id: EndpointId) -> &Endpoint {
        &self.0[id.0 % self.0.len()]
    }

    /// Iterates over all endpoints together with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (EndpointId, &Endpoint)> {
        self.0
            .iter()
            .enumerate()
            .map(|(index, endpoint)| (EndpointId(index), endpoint))
    }

    /// The sum of all endpoints' recoverable error counters.
    pub fn total_retries(&self) -> u64 {
        self.0.iter().map(Endpoint::retry_count).sum()
    }

    /// Resets every endpoint's recoverable error counter.
    pub fn reset_retries(&self) {
        for endpoint in self.0.iter() {
            endpoint.reset_retries();
        }
    }
}
