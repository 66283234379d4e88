//! Shard — the unit of concurrency isolation: one [`IntMap`](crate::intmap::IntMap)
//! bound to one [`Arena`](crate::arena::Arena) behind a single lock, with
//! optional per-slab TTL expiration.
//!
//! A shard is the thing a routing layer ("big map") would fan keys out to
//! by hashing on the high bits — that routing layer is a straightforward
//! external collaborator and is not implemented here.

mod sweeper;

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::arena::{Arena, SlabId};
use crate::clock;
use crate::error::{CacheError, Result};
use crate::intmap::IntMap;

/// Caps the number of backing-array slots a single sweeper wake visits, so
/// one wake-up can never take longer than a bounded amount of work
/// regardless of shard size.
const SWEEP_MAX_VISITS_PER_WAKE: usize = 4096;

/// Construction parameters for a [`Shard`]. There is no file/environment
/// loading here — this is a plain struct the caller fills in, same as
/// passing `NewShard(initial_capacity, arena_chunk_size, ttl)` directly.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Initial `IntMap` backing-array size (rounded up to a power of two).
    pub initial_intmap_capacity: usize,
    /// Size of each arena chunk, in bytes. Values larger than this get a
    /// dedicated oversized chunk.
    pub arena_chunk_size: usize,
    /// Values longer than this are rejected by `put` with `ValueTooLarge`.
    pub max_value_size: usize,
    /// `Duration::ZERO` disables expiration.
    pub ttl: Duration,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            initial_intmap_capacity: 1024,
            arena_chunk_size: 64 * 1024,
            max_value_size: 1024 * 1024,
            ttl: Duration::ZERO,
        }
    }
}

struct ShardData {
    intmap: IntMap<SlabId>,
    arena: Arena,
}

/// A self-contained cache partition: one `IntMap`, one `Arena`, an
/// optional expiration sweeper, all protected by a single read-write lock.
pub struct Shard {
    data: RwLock<ShardData>,
    max_value_size: usize,
    ttl_ms: i64,
    scan_cursor: AtomicUsize,
    shutdown_token: CancellationToken,
}

impl Shard {
    /// Creates a shard and, if `cfg.ttl` is non-zero, spawns its
    /// background sweeper. The sweeper holds only a [`std::sync::Weak`]
    /// reference, so it exits cleanly on its next wake after the shard is
    /// dropped rather than keeping it alive.
    pub fn new(cfg: ShardConfig) -> Arc<Self> {
        let shutdown_token = CancellationToken::new();
        let ttl_ms = cfg.ttl.as_millis() as i64;

        let shard = Arc::new(Self {
            data: RwLock::new(ShardData {
                intmap: IntMap::new(cfg.initial_intmap_capacity),
                arena: Arena::new(cfg.arena_chunk_size),
            }),
            max_value_size: cfg.max_value_size,
            ttl_ms,
            scan_cursor: AtomicUsize::new(0),
            shutdown_token: shutdown_token.clone(),
        });

        if ttl_ms > 0 {
            let weak = Arc::downgrade(&shard);
            tokio::task::spawn(sweeper::run(weak, cfg.ttl, shutdown_token));
        }

        shard
    }

    /// Stores `value` under `key`, replacing and freeing any prior slab
    /// for the same key. Rejects values over `max_value_size` without
    /// touching the existing entry, if any (a failed `put` never performs
    /// a partial update).
    pub fn put(&self, key: u64, value: &[u8]) -> Result<()> {
        if value.len() > self.max_value_size {
            return Err(CacheError::ValueTooLarge { size: value.len(), max: self.max_value_size });
        }

        let now = clock::now_millis();
        let mut data = self.data.write();

        let (old_id, had_old) = data.intmap.get(key);
        if had_old {
            data.arena.free(old_id);
        }

        let new_id = data.arena.alloc(value, now);
        data.intmap.put(key, new_id);
        Ok(())
    }

    /// Looks up `key`. Takes the shard lock in shared mode first; if the
    /// resolved slab turns out to be expired, re-acquires the lock
    /// exclusively and redoes the lookup before reclaiming it, so the
    /// common non-expired path never pays for a lock upgrade.
    pub fn get(&self, key: u64) -> Option<Bytes> {
        {
            let data = self.data.read();
            let (slab_id, hit) = data.intmap.get(key);
            if !hit {
                return None;
            }
            let (bytes, created_at_ms) = data.arena.get(slab_id);
            if !self.is_expired(created_at_ms) {
                return Some(bytes);
            }
        }

        let mut data = self.data.write();
        let (slab_id, hit) = data.intmap.get(key);
        if !hit {
            return None;
        }
        let (bytes, created_at_ms) = data.arena.get(slab_id);
        if self.is_expired(created_at_ms) {
            data.arena.free(slab_id);
            data.intmap.delete(key);
            None
        } else {
            Some(bytes)
        }
    }

    /// Removes `key`, freeing its slab. Idempotent: a second `delete` of
    /// the same key returns `false`.
    pub fn delete(&self, key: u64) -> bool {
        let mut data = self.data.write();
        let (slab_id, hit) = data.intmap.delete(key);
        if hit {
            data.arena.free(slab_id);
        }
        hit
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut data = self.data.write();
        data.intmap.clear();
        data.arena.clear();
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.data.read().intmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of slabs the arena currently considers alive. Used by tests
    /// (and callers with diagnostic needs) to confirm deletes and
    /// expirations actually free the underlying storage, not just the
    /// index entry.
    pub fn live_slab_count(&self) -> usize {
        self.data.read().arena.live_count()
    }

    #[inline]
    fn is_expired(&self, created_at_ms: i64) -> bool {
        self.ttl_ms > 0 && clock::now_millis() - created_at_ms >= self.ttl_ms
    }

    /// Runs one bounded expiration pass: the zero-key shadow (checked
    /// every wake, since it's a single compare) plus up to
    /// `max_visits` backing-array slots resumed from where the previous
    /// pass left off. Returns the number of slabs reclaimed.
    pub(crate) fn sweep_once(&self, max_visits: usize) -> usize {
        if self.ttl_ms <= 0 {
            return 0;
        }

        let mut data = self.data.write();
        let now = clock::now_millis();
        let ttl_ms = self.ttl_ms;
        let mut expired: Vec<(u64, SlabId)> = Vec::new();

        {
            let ShardData { intmap, arena } = &*data;

            let (slab0, hit0) = intmap.get(0);
            if hit0 {
                let (_, ts) = arena.get(slab0);
                if now - ts >= ttl_ms {
                    expired.push((0, slab0));
                }
            }

            let start = self.scan_cursor.load(Ordering::Relaxed);
            let next = intmap.scan_chunk(start, max_visits, |k, slab_id| {
                let (_, ts) = arena.get(slab_id);
                if now - ts >= ttl_ms {
                    expired.push((k, slab_id));
                }
            });
            self.scan_cursor.store(next, Ordering::Relaxed);
        }

        for (key, slab_id) in expired.iter().copied() {
            data.arena.free(slab_id);
            data.intmap.delete(key);
        }

        expired.len()
    }

    /// Signals the sweeper to stop. Safe to call multiple times; also
    /// happens automatically on `Drop`.
    pub async fn close(&self) {
        self.shutdown_token.cancel();
    }
}

impl Drop for Shard {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
