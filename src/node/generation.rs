//! Wrap-safe generation arithmetic
//!
//! Generations are unsigned counters that wrap after ~49 days at a 1 kHz
//! publish rate, so every comparison here has to work across the wrap
//! point. Plain `<` / `>` on generations is always a bug.

use crate::config;

/// Per-node publish counter, incremented once per publish
pub type Generation = u32;

/// Wrap-safe "is `value` between `left` and `right` going forward"
///
/// When `right` has wrapped past zero while `left` has not, the window
/// consists of two disjoint unsigned ranges; membership is the union.
pub fn is_in_range(left: Generation, value: Generation, right: Generation) -> bool {
    if right > left {
        left <= value && value <= right
    } else {
        // wraparound occurred between left and right
        left <= value || value <= right
    }
}

/// Round a requested queue depth up to the next power of two
///
/// 0 and 1 both yield 1; 60 yields 64; anything above the cap saturates
/// at [`config::MAX_QUEUE_SIZE`] rather than overflowing.
pub fn round_up_queue_size(requested: usize) -> usize {
    requested.next_power_of_two().min(config::MAX_QUEUE_SIZE)
}
