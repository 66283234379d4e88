//! Cached monotonic clock.
//!
//! Slab timestamps and TTL checks need a monotonic time source that is cheap
//! to sample on every `Put`/`Get`. Rather than calling `Instant::now()` in the
//! hot path, the current offset (in milliseconds since a process-wide epoch)
//! is cached in an atomic and refreshed by a background ticker when one is
//! running (see [`start`]). Code paths with no ticker running (plain unit
//! tests) fall back to computing the offset directly, so the clock is always
//! correct, just not always syscall-free.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

static EPOCH: OnceLock<Instant> = OnceLock::new();
static CACHED_MILLIS: AtomicI64 = AtomicI64::new(-1);
static TICKER_RUNNING: AtomicU64 = AtomicU64::new(0);

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

fn sample_millis() -> i64 {
    epoch().elapsed().as_millis() as i64
}

/// Milliseconds elapsed since the process-wide epoch.
///
/// Uses the cached value when a ticker (see [`start`]) is refreshing it;
/// otherwise samples directly.
pub fn now_millis() -> i64 {
    if TICKER_RUNNING.load(Ordering::Relaxed) != 0 {
        CACHED_MILLIS.load(Ordering::Relaxed)
    } else {
        sample_millis()
    }
}

/// Starts a background ticker that refreshes the cached clock at the given
/// resolution. Returns a [`CancellationToken`] the caller can cancel to stop
/// the ticker. Intended to be called once per process by whichever shard (or
/// big-map) is constructed first; subsequent calls are harmless but wasteful.
pub fn start(resolution: Duration) -> CancellationToken {
    CACHED_MILLIS.store(sample_millis(), Ordering::Relaxed);
    TICKER_RUNNING.fetch_add(1, Ordering::Relaxed);

    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::task::spawn(async move {
        let mut interval = tokio::time::interval(resolution);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    CACHED_MILLIS.store(sample_millis(), Ordering::Relaxed);
                }
                _ = token_clone.cancelled() => {
                    break;
                }
            }
        }
        TICKER_RUNNING.fetch_sub(1, Ordering::Relaxed);
    });

    token
}
