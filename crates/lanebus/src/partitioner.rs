//! Identifier → lane routing.
//!
//! The mapping must be stable for the lifetime of a bus: every event carrying
//! a given identifier has to land on the same lane, otherwise per-key
//! ordering is lost. Collisions between identifiers only cost parallelism.

use fxhash::FxHasher32;
use std::fmt::Debug;
use std::hash::Hasher;
use std::num::NonZeroUsize;

/// Maps an event identifier to a lane index in `0..lanes`.
///
/// Implementations must be pure: the same `(identifier, lanes)` pair always
/// yields the same index.
///
/// The default [`HashPartitioner`] scales the hash into range with
/// `(hash * lanes) >> 32`, so its lane layout differs from `hash % lanes`.
/// Code that needs the modulo layout, for example to match lane numbers
/// chosen elsewhere, should plug in its own implementation.
pub trait Partitioner: Debug + Send + Sync + 'static {
    fn partition(&self, identifier: &str, lanes: NonZeroUsize) -> usize;
}

/// Default partitioner: unseeded 32-bit Fx hash over the identifier bytes,
/// reduced to `0..lanes` with a multiply-shift on the high bits of the hash.
///
/// The low bits of a multiplicative hash ignore the upper bytes of the last
/// word, so a plain `% lanes` would send `"id-0"`..`"id-9"` to one lane.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPartitioner;

impl HashPartitioner {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Raw 32-bit hash of an identifier.
    #[inline]
    #[must_use]
    pub fn hash(identifier: &str) -> u32 {
        let mut hasher = FxHasher32::default();
        hasher.write(identifier.as_bytes());
        #[allow(clippy::cast_possible_truncation)]
        let hash = hasher.finish() as u32;
        hash
    }
}

impl Partitioner for HashPartitioner {
    #[inline]
    fn partition(&self, identifier: &str, lanes: NonZeroUsize) -> usize {
        let scaled = u64::from(Self::hash(identifier)) * lanes.get() as u64;
        #[allow(clippy::cast_possible_truncation)]
        let lane = (scaled >> 32) as usize;
        lane
    }
}
