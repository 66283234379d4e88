//! Core of an in-memory key/value cache: a specialized integer
//! open-addressing map, a byte-slab arena, and the shard that composes
//! them with TTL expiration. See each module for its responsibility.
//!
//! Hash selection, iteration order, cross-key transactions, persistence,
//! and a network-facing routing layer are all out of scope here — this
//! crate is the single-shard core a "big map" sharding layer would fan
//! requests out to by hashing on the high bits of the caller-supplied key.

pub mod arena;
pub mod clock;
pub mod error;
pub mod intmap;
pub mod shard;

pub use arena::{Arena, SlabId};
pub use error::{CacheError, Result};
pub use intmap::IntMap;
pub use shard::{Shard, ShardConfig};

/// Test-only helpers (not part of the stable API). Kept `pub` so both unit
/// tests and the `tests/` integration suite can reach them, `doc(hidden)`
/// so they don't show up in generated docs.
#[doc(hidden)]
pub mod test_support;
