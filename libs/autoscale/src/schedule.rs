//! Target fleet size evaluation.
//!
//! A machine type's desired size at an instant is decided in two steps:
//! the first active daily window (document order) supplies the baseline,
//! falling back to the pool's own `target_size`; load-based rules, when
//! present, replace the baseline with the utilization signal clamped into
//! the intersection of their bounds.

use chrono::{DateTime, Datelike, Timelike, Utc};

use botfleet_config::PoolConfig;

/// Compute the desired fleet size for a pool at `now`.
///
/// `utilization` is the externally measured demand for the pool (busy plus
/// pending machines); it only matters when load-based rules exist. The
/// result is never negative by construction.
pub fn compute_target_size(pool: &PoolConfig, now: DateTime<Utc>, utilization: u32) -> u32 {
    // Mon=0 .. Sun=6, matching days_of_the_week.
    let weekday = now.weekday().num_days_from_monday();
    let minute = (now.hour() * 60 + now.minute()) as u16;

    // Overlapping windows are legal; the first in document order wins.
    let baseline = pool
        .daily
        .iter()
        .find(|w| w.is_active(weekday, minute))
        .map(|w| w.target_size)
        .unwrap_or(pool.target_size);

    if pool.load_based.is_empty() {
        return baseline;
    }

    let lo = pool
        .load_based
        .iter()
        .map(|b| b.minimum_size)
        .max()
        .unwrap_or(0);
    let hi = pool
        .load_based
        .iter()
        .map(|b| b.maximum_size)
        .min()
        .unwrap_or(0);

    // An empty intersection collapses to the tighter lower bound: the
    // minimum is a capacity floor and wins over a conflicting ceiling.
    let hi = hi.max(lo);

    utilization.clamp(lo, hi)
}
