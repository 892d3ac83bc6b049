//! Coverage-based prioritization over reachable-operation sets
//!
//! `sets[i]` is the estimated set of kernel operations test `i` can reach.
//! Total greedy ranks by set size alone; additional greedy ranks by marginal
//! gain over what earlier picks already cover, restarting coverage once no
//! remaining test adds anything new.

use std::collections::HashSet;

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CgStrategy {
    Total,
    Additional,
}

impl CgStrategy {
    /// Stable label used in result records.
    pub fn name(&self) -> &'static str {
        match self {
            CgStrategy::Total => "total",
            CgStrategy::Additional => "additional",
        }
    }

    pub fn order(&self, sets: &[HashSet<String>]) -> Vec<usize> {
        match self {
            CgStrategy::Total => total_order(sets),
            CgStrategy::Additional => additional_order(sets),
        }
    }
}

/// Descending by reachable-set size; ties keep the original order.
pub fn total_order(sets: &[HashSet<String>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..sets.len()).collect();
    order.sort_by(|&a, &b| sets[b].len().cmp(&sets[a].len()));
    order
}

/// Greedy maximum marginal gain over the covered-operation set.
///
/// When every remaining test has zero gain the covered set is reset, so
/// later picks again differentiate by raw coverage.
pub fn additional_order(sets: &[HashSet<String>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = (0..sets.len()).collect();
    let mut order = Vec::with_capacity(sets.len());
    let mut covered: HashSet<String> = HashSet::new();

    while !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_gain: i64 = -1;
        for (pos, &i) in remaining.iter().enumerate() {
            let gain = sets[i].difference(&covered).count() as i64;
            if gain > best_gain {
                best_gain = gain;
                best_pos = pos;
            }
        }
        let winner = remaining.remove(best_pos);
        if best_gain == 0 {
            covered.clear();
        } else {
            covered.extend(sets[winner].iter().cloned());
        }
        order.push(winner);
    }
    order
}
