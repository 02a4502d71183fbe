//! Stable context-id bucketing.
use md5;

/// Maps a context identifier onto the rollout percentage space.
///
/// Implementations must be deterministic across process runs and platforms:
/// the same `context_id` always maps to the same bucket, and distinct ids
/// distribute approximately uniformly over `[0, 100)`.
pub trait Bucketer: Send + Sync {
    /// Map `context_id` to a bucket in `[0, 100)`.
    fn bucket(&self, context_id: &str) -> f64;
}

/// The default bucketer.
///
/// Interprets the first 4 bytes of the md5 digest as a big-endian `u32` and
/// scales it into the percentage space.
pub struct Md5Bucketer;

impl Bucketer for Md5Bucketer {
    fn bucket(&self, context_id: &str) -> f64 {
        let digest = md5::compute(context_id);
        let marker = u32::from_be_bytes(digest[0..4].try_into().unwrap());
        (marker as f64 / 4_294_967_296.0) * 100.0
    }
}
