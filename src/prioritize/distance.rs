//! String distance metrics and adaptive random prioritization
//!
//! Adaptive random prioritization orders tests by greedy max-min diversity:
//! each round samples a candidate set and picks the candidate farthest (by
//! its minimum distance) from everything already selected. Distances compare
//! whole source files as character strings.

use std::collections::HashSet;

use clap::ValueEnum;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::cache::DistanceCache;

/// A pair with no precomputed distance ranks ahead of any known pair.
const UNKNOWN_DISTANCE: f64 = 10000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DistanceMetric {
    Hamming,
    Edit,
    Euclidean,
    Manhattan,
    Ncd,
}

impl DistanceMetric {
    /// Stable label used in result records.
    pub fn name(&self) -> &'static str {
        match self {
            DistanceMetric::Hamming => "hamming_distance",
            DistanceMetric::Edit => "edit_distance",
            DistanceMetric::Euclidean => "euclidean_string_distance",
            DistanceMetric::Manhattan => "manhattan_string_distance",
            DistanceMetric::Ncd => "normalized_compression_distance",
        }
    }

    pub fn compute(&self, a: &str, b: &str) -> f64 {
        match self {
            DistanceMetric::Hamming => hamming(a, b),
            DistanceMetric::Edit => edit(a, b) as f64,
            DistanceMetric::Euclidean => euclidean(a, b),
            DistanceMetric::Manhattan => manhattan(a, b),
            DistanceMetric::Ncd => ncd(a, b),
        }
    }
}

/// Pair the characters of both strings, padding the shorter with NUL.
fn padded_pairs(a: &str, b: &str) -> impl Iterator<Item = (u32, u32)> {
    let av: Vec<u32> = a.chars().map(u32::from).collect();
    let bv: Vec<u32> = b.chars().map(u32::from).collect();
    let len = av.len().max(bv.len());
    (0..len).map(move |i| {
        (
            av.get(i).copied().unwrap_or(0),
            bv.get(i).copied().unwrap_or(0),
        )
    })
}

fn hamming(a: &str, b: &str) -> f64 {
    padded_pairs(a, b).filter(|(x, y)| x != y).count() as f64
}

fn euclidean(a: &str, b: &str) -> f64 {
    padded_pairs(a, b)
        .map(|(x, y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn manhattan(a: &str, b: &str) -> f64 {
    padded_pairs(a, b)
        .map(|(x, y)| (x as f64 - y as f64).abs())
        .sum()
}

/// Levenshtein distance with a two-row table.
fn edit(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitute.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Run-length compressed size in bytes, runs capped at 255.
fn rle_len(data: &[u8]) -> usize {
    let mut runs = 0usize;
    let mut i = 0usize;
    while i < data.len() {
        let byte = data[i];
        let mut run = 1usize;
        while i + run < data.len() && data[i + run] == byte && run < 255 {
            run += 1;
        }
        runs += 1;
        i += run;
    }
    runs * 2
}

/// Normalized compression distance with an RLE size estimator.
fn ncd(a: &str, b: &str) -> f64 {
    let ca = rle_len(a.as_bytes());
    let cb = rle_len(b.as_bytes());
    let mut joined = String::with_capacity(a.len() + b.len());
    joined.push_str(a);
    joined.push_str(b);
    let cab = rle_len(joined.as_bytes());
    let max = ca.max(cb);
    if max == 0 {
        return 0.0;
    }
    (cab.saturating_sub(ca.min(cb))) as f64 / max as f64
}

/// Precompute the pairwise distance table for `cases` into `cache`.
///
/// Each case is identified by its file path; an unreadable file compares as
/// the empty string. Already cached pairs are not recomputed.
pub fn precompute(metric: DistanceMetric, cases: &[String], cache: &mut DistanceCache) {
    let contents: Vec<String> = cases
        .iter()
        .map(|p| std::fs::read_to_string(p).unwrap_or_default())
        .collect();
    let mut computed = 0usize;
    for i in 0..cases.len() {
        for j in (i + 1)..cases.len() {
            if cache.contains(&cases[i], &cases[j]) {
                continue;
            }
            let d = metric.compute(&contents[i], &contents[j]);
            cache.insert(&cases[i], &cases[j], d);
            computed += 1;
        }
    }
    debug!(
        metric = metric.name(),
        cases = cases.len(),
        computed,
        "distance table ready"
    );
}

/// Adaptive random order over `cases`, returning original indices.
///
/// Each round draws up to `k` random candidates from the unselected tests
/// and picks the one whose minimum distance to the selected set is largest.
/// The very first pick is uniformly random. Ties keep the earliest
/// candidate, so a constant metric still consumes every test exactly once.
pub fn adaptive_random_order<R: Rng>(
    cases: &[String],
    k: usize,
    distances: &DistanceCache,
    rng: &mut R,
) -> Vec<usize> {
    if cases.is_empty() {
        return Vec::new();
    }
    let mut remaining: Vec<usize> = (0..cases.len()).collect();
    let mut order = Vec::with_capacity(cases.len());
    let mut selected: HashSet<usize> = HashSet::new();

    let first = rng.gen_range(0..remaining.len());
    let first = remaining.swap_remove(first);
    order.push(first);
    selected.insert(first);

    while !remaining.is_empty() {
        let sample: Vec<usize> = remaining
            .choose_multiple(rng, k.max(1).min(remaining.len()))
            .copied()
            .collect();
        let mut best = sample[0];
        let mut best_score = f64::MIN;
        for &candidate in &sample {
            let score = selected
                .iter()
                .map(|&s| {
                    distances
                        .get(&cases[candidate], &cases[s])
                        .unwrap_or(UNKNOWN_DISTANCE)
                })
                .fold(f64::INFINITY, f64::min);
            if score > best_score {
                best_score = score;
                best = candidate;
            }
        }
        if let Some(pos) = remaining.iter().position(|&i| i == best) {
            remaining.swap_remove(pos);
        }
        order.push(best);
        selected.insert(best);
    }
    order
}
