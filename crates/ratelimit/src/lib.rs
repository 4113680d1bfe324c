//! Distributed rate limiting — per-channel token buckets over a shared,
//! concurrently-accessed store with fail-closed semantics.

pub mod bucket;
pub mod limiter;
pub mod store;

pub use bucket::{Acquisition, BucketSettings, TokenBucket};
pub use limiter::{RateLimiter, ThroughputStats};
pub use store::{BucketStore, MemoryBucketStore, StoreError, UnavailableBucketStore};
