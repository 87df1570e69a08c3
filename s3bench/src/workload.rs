//! Generation of object keys and payloads for the write phase.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Default size of generated payloads.
pub const DEFAULT_PAYLOAD_SIZE: u64 = 4 * 4096;

/// Default prefix of generated object keys.
pub const DEFAULT_KEY_PREFIX: &str = "benchmark/";

/// Produces random keys and payloads for benchmark objects.
///
/// Payload sizes are drawn uniformly from `min_size..=max_size`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PayloadGenerator {
    min_size: u64,
    max_size: u64,
    key_prefix: String,
}

impl Default for PayloadGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_PAYLOAD_SIZE, DEFAULT_PAYLOAD_SIZE, DEFAULT_KEY_PREFIX)
    }
}

impl PayloadGenerator {
    /// Creates a generator. Swapped bounds are put in order.
    pub fn new(min_size: u64, max_size: u64, key_prefix: impl Into<String>) -> Self {
        Self {
            min_size: min_size.min(max_size),
            max_size: max_size.max(min_size),
            key_prefix: key_prefix.into(),
        }
    }

    /// A fresh random number generator for one worker.
    pub fn rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(rand::random())
    }

    /// A random key of the form `<prefix><32 hex chars>.png`.
    pub fn key(&self, rng: &mut impl Rng) -> String {
        format!("{}{:032x}.png", self.key_prefix, rng.random::<u128>())
    }

    /// A payload of random size filled with random bytes.
    pub fn payload(&self, rng: &mut impl Rng) -> Bytes {
        let len = rng.random_range(self.min_size..=self.max_size);
        let mut buf = vec![0u8; len as usize];
        rng.fill(buf.as_mut_slice());
        Bytes::from(buf)
    }
}
