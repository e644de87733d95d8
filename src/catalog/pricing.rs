//! Per-file price derivation
//!
//! Category cards are navigation-only; prices live on the individual files.
//! A file's price is derived from the category's base price and member count,
//! snapped into a small set of familiar buckets, with a small deterministic
//! per-file variation so not every file in a category costs the same.

use crate::catalog::slug::md5_seed;

/// The fixed set of shop prices
pub const PRICE_BUCKETS: [f64; 6] = [19.0, 29.0, 39.0, 49.0, 59.0, 69.0];

/// Base price assumed when a category has none configured
pub const DEFAULT_BASE_PRICE: f64 = 79.0;

const OFFSETS: [f64; 5] = [0.0, 0.0, 0.0, 10.0, -10.0];

/// Snap a raw value to the closest bucket.
///
/// The ascending bucket list is scanned in order and the first minimal
/// distance wins, so an exact midpoint resolves to the lower bucket.
pub fn nearest_bucket(value: f64) -> f64 {
    let mut best = PRICE_BUCKETS[0];
    let mut best_dist = (PRICE_BUCKETS[0] - value).abs();
    for &bucket in &PRICE_BUCKETS[1..] {
        let dist = (bucket - value).abs();
        if dist < best_dist {
            best = bucket;
            best_dist = dist;
        }
    }
    best
}

/// Shrink factor by member count: more files in a package, cheaper per file
fn shrink_factor(member_count: usize) -> f64 {
    match member_count {
        n if n >= 10 => 0.30,
        n if n >= 7 => 0.34,
        n if n >= 5 => 0.38,
        n if n >= 3 => 0.42,
        _ => 0.48,
    }
}

/// Derive the price of one member file.
///
/// Pure function of its inputs: the same `member_key` always yields the same
/// price for the same base inputs.
pub fn price_for(base_price: Option<f64>, member_count: usize, member_key: &str) -> f64 {
    let base = match base_price {
        Some(p) if p > 0.0 => p,
        _ => DEFAULT_BASE_PRICE,
    };
    let count = member_count.max(1);

    let snapped = nearest_bucket(base * shrink_factor(count));
    let offset = OFFSETS[(md5_seed(member_key) % OFFSETS.len() as u32) as usize];
    nearest_bucket((snapped + offset).clamp(19.0, 69.0))
}
