//! Bucket store — the shared, concurrently-accessed backing for rate-limit
//! state. Acquisitions are per-key atomic read-modify-write operations;
//! callers never see raw bucket fields.

use crate::bucket::{Acquisition, BucketSettings, TokenBucket};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket store unavailable: {0}")]
    Unavailable(String),
}

/// Narrow seam over the shared store. Production deployments back this
/// with a conditional-update against a distributed table; the in-memory
/// implementation uses sharded per-key locking.
pub trait BucketStore: Send + Sync {
    /// Atomically refill the keyed bucket and consume `tokens` if
    /// available. Must serialize concurrent callers per key: no lost
    /// updates, no double-spend.
    fn try_consume(
        &self,
        key: &str,
        settings: &BucketSettings,
        tokens: f64,
        now: DateTime<Utc>,
    ) -> Result<Acquisition, StoreError>;

    /// Current token count after refill, without consuming.
    fn available(
        &self,
        key: &str,
        settings: &BucketSettings,
        now: DateTime<Utc>,
    ) -> Result<f64, StoreError>;
}

/// In-process bucket store backed by `DashMap`. The entry API holds the
/// shard lock for the duration of the read-modify-write, which gives
/// single-writer-per-key serialization without a global lock.
#[derive(Default)]
pub struct MemoryBucketStore {
    buckets: DashMap<String, TokenBucket>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }
}

impl BucketStore for MemoryBucketStore {
    fn try_consume(
        &self,
        key: &str,
        settings: &BucketSettings,
        tokens: f64,
        now: DateTime<Utc>,
    ) -> Result<Acquisition, StoreError> {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(settings, now));
        Ok(bucket.try_consume(settings, tokens, now))
    }

    fn available(
        &self,
        key: &str,
        settings: &BucketSettings,
        now: DateTime<Utc>,
    ) -> Result<f64, StoreError> {
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(settings, now));
        bucket.refill(settings, now);
        Ok(bucket.tokens)
    }
}

/// Store double that reports every operation as unavailable. Used to
/// exercise the limiter's fail-closed path.
pub struct UnavailableBucketStore;

impl BucketStore for UnavailableBucketStore {
    fn try_consume(
        &self,
        _key: &str,
        _settings: &BucketSettings,
        _tokens: f64,
        _now: DateTime<Utc>,
    ) -> Result<Acquisition, StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }

    fn available(
        &self,
        _key: &str,
        _settings: &BucketSettings,
        _now: DateTime<Utc>,
    ) -> Result<f64, StoreError> {
        Err(StoreError::Unavailable("store offline".into()))
    }
}
