//! Background expiration sweeper.
//!
//! One long-lived task per shard wakes at an interval derived from the
//! TTL, reclaims a bounded batch of expired slabs, and goes back to sleep.
//! Lazy expiration in `Shard::get` is the correctness backstop for
//! whatever the sweeper hasn't gotten to yet; the sweeper's job is only to
//! bound worst-case memory held by entries nobody is reading.

use std::sync::Weak;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::Shard;

const MIN_INTERVAL: Duration = Duration::from_millis(100);
const MAX_INTERVAL: Duration = Duration::from_secs(1);

fn sweep_interval(ttl: Duration) -> Duration {
    (ttl / 8).clamp(MIN_INTERVAL, MAX_INTERVAL)
}

pub(super) async fn run(shard: Weak<Shard>, ttl: Duration, shutdown: CancellationToken) {
    let interval_dur = sweep_interval(ttl);
    info!(?interval_dur, ?ttl, "sweeper: starting");

    let mut interval = tokio::time::interval(interval_dur);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("sweeper: shutting down");
                return;
            }
            _ = interval.tick() => {
                match shard.upgrade() {
                    Some(shard) => {
                        shard.sweep_once(super::SWEEP_MAX_VISITS_PER_WAKE);
                    }
                    None => {
                        info!("sweeper: shard dropped, exiting");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_clamped() {
        assert_eq!(sweep_interval(Duration::from_secs(1)), MIN_INTERVAL);
        assert_eq!(sweep_interval(Duration::from_secs(200)), MAX_INTERVAL);
        assert_eq!(sweep_interval(Duration::from_secs(8)), Duration::from_secs(1));
        assert_eq!(sweep_interval(Duration::from_secs(4)), Duration::from_millis(500));
    }
}
