//! Error types returned by the cache core.

/// Errors produced by [`crate::shard::Shard::put`].
///
/// `Get` and `Delete` never fail: a missing or expired key is reported as
/// `(None, false)`-shaped results, not as an error. Only `Put` can fail,
/// on an oversized value.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("value of {size} bytes exceeds the configured maximum of {max} bytes")]
    ValueTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, CacheError>;
