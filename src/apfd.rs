//! Average Percentage of Faults Detected
//!
//! The single evaluation metric shared by every prioritization strategy:
//!
//! ```text
//! APFD = 1 - (sum of 1-based ranks of faulty tests) / (|faults| * |tests|)
//!          + 1 / (2 * |tests|)
//! ```
//!
//! `faults` indexes faulty tests within the original, unordered input;
//! `order` is the produced permutation as a list of original indices.

use std::collections::HashSet;

/// Compute APFD for a fault set and an execution order.
///
/// Returns the neutral midpoint 0.5 when there are no faults or no tests.
pub fn apfd(faults: &[usize], order: &[usize]) -> f64 {
    if faults.is_empty() || order.is_empty() {
        return 0.5;
    }
    let fault_set: HashSet<usize> = faults.iter().copied().collect();
    let mut rank_sum = 0.0;
    for (position, original_idx) in order.iter().enumerate() {
        if fault_set.contains(original_idx) {
            rank_sum += (position + 1) as f64;
        }
    }
    let n = order.len() as f64;
    1.0 - rank_sum / (faults.len() as f64 * n) + 1.0 / (2.0 * n)
}
