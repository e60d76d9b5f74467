//! The chunk boundary predicate.
//!
//! Given the key at a tentative split point and the byte size accumulated
//! since the previous cut, decides whether to end the current chunk. The
//! decision hashes the **key**, never the content: a cut point is a
//! property of the tree's key space at that position, which keeps trees
//! history-independent and lets incremental writers re-synchronize with
//! boundaries drawn by earlier writers.
//!
//! Between the hard floor and ceiling, acceptance follows a Weibull
//! distribution with a soft target mean, so chunk sizes cluster around the
//! target instead of decaying geometrically.

use crate::chunk_config::{
    level_salt, CHUNK_TARGET_SIZE, INTERIOR_MIN_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE,
};
use xxhash_rust::xxh32::xxh32;

/// Weibull shape parameter. Higher values concentrate chunk sizes more
/// tightly around the target.
const WEIBULL_SHAPE: f64 = 4.0;

/// Weibull scale, chosen so the distribution mean sits at the target:
/// mean = scale * Gamma(1 + 1/shape), and Gamma(1.25) ~= 0.906402.
const WEIBULL_SCALE: f64 = CHUNK_TARGET_SIZE / 0.906_402;

fn weibull_cdf(x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    1.0 - (-(x / WEIBULL_SCALE).powf(WEIBULL_SHAPE)).exp()
}

/// Accept a cut with the probability mass the target distribution assigns
/// to the window `(total_size - this_size, total_size]`, conditioned on not
/// having cut before the window.
pub(crate) fn weibull_check(total_size: u32, this_size: u32, hash: u32) -> bool {
    let start = weibull_cdf(f64::from(total_size - this_size));
    let end = weibull_cdf(f64::from(total_size));
    let remaining = 1.0 - start;
    if remaining <= 0.0 {
        return true;
    }
    let p = f64::from(hash) / f64::from(u32::MAX);
    p < (end - start) / remaining
}

/// Decide whether a chunk ending at `key` with `total_size` accumulated
/// bytes should be cut, where `this_size` is the size of the last item
/// appended (for whole-buffer candidates, pass `total_size` again).
///
/// Pure function of `(key, sizes, level)`: same inputs, same decision.
pub fn crosses_boundary(key: &[u8], total_size: u32, this_size: u32, level: u8) -> bool {
    let min = if level == 0 {
        MIN_CHUNK_SIZE
    } else {
        INTERIOR_MIN_CHUNK_SIZE
    };
    if total_size < min {
        return false;
    }
    if total_size > MAX_CHUNK_SIZE {
        return true;
    }
    let h = xxh32(key, level_salt(level));
    weibull_check(total_size, this_size, h)
}
