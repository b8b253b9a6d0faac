//! Gap-based ordering keys for tasks inside a plan
//!
//! Positions are spaced `POSITION_STEP` apart on append, and a move lands
//! halfway between its new neighbours, so siblings never need renumbering
//! until float precision runs out between two adjacent keys.

/// Spacing between consecutive appended tasks
pub const POSITION_STEP: f64 = 1024.0;

/// Position for a task appended after `last`
pub fn append_after(last: Option<f64>) -> f64 {
    match last {
        Some(p) => p + POSITION_STEP,
        None => POSITION_STEP,
    }
}

/// Position strictly between `before` and `after` (either may be open).
///
/// Returns `None` when the two neighbours are too close to split.
pub fn between(before: Option<f64>, after: Option<f64>) -> Option<f64> {
    match (before, after) {
        (None, None) => Some(POSITION_STEP),
        (Some(b), None) => Some(b + POSITION_STEP),
        (None, Some(a)) => Some(a - POSITION_STEP),
        (Some(b), Some(a)) => {
            let mid = b + (a - b) / 2.0;
            (mid > b && mid < a).then_some(mid)
        }
    }
}

/// Evenly spaced positions for `count` tasks
pub fn spaced(count: usize) -> Vec<f64> {
    (1..=count).map(|i| i as f64 * POSITION_STEP).collect()
}
