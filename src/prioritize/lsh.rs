//! Similarity-based greedy prioritization over an LSH index
//!
//! Orders tests by repeatedly excluding the near-neighborhood of what has
//! already been covered: the index recalls tests similar to the running
//! coverage signature, and the next pick comes from everything outside that
//! neighborhood. When the neighborhood swallows all remaining tests the
//! coverage signature is re-seeded and selection continues.

use tracing::debug;

use crate::error::Result;
use crate::prioritize::minhash::{LshIndex, MinHash, MinHasher};

/// Greedy LSH prioritization, returning original indices.
///
/// `tokens[i]` is the token list of `cases[i]`; a test that produced no
/// tokens is given a placeholder signature so it still participates. Ties
/// keep the earliest case, so the order is deterministic for fixed inputs.
pub fn lsh_greedy_order(
    cases: &[String],
    tokens: &[Vec<String>],
    bands: usize,
    rows: usize,
    num_perm: usize,
) -> Result<Vec<usize>> {
    debug_assert_eq!(cases.len(), tokens.len());
    let mut index = LshIndex::new(bands, rows, num_perm)?;
    if cases.is_empty() {
        return Ok(Vec::new());
    }

    let hasher = MinHasher::new(num_perm);
    let signatures: Vec<MinHash> = tokens
        .iter()
        .map(|t| {
            if t.is_empty() {
                hasher.empty_signature()
            } else {
                hasher.signature(t)
            }
        })
        .collect();
    for (case, signature) in cases.iter().zip(&signatures) {
        index.insert(case, signature);
    }

    let mut selected = vec![false; cases.len()];
    let mut order = Vec::with_capacity(cases.len());
    let mut covered = MinHash::empty();

    for _ in 0..cases.len() {
        let mut near = index.query(&covered);
        if near.is_empty() && !covered.is_empty() {
            // Everything left is far from the covered set; start a new pass.
            covered = MinHash::empty();
            near.clear();
        }
        let mut candidates: Vec<usize> = (0..cases.len())
            .filter(|&i| !selected[i] && !near.contains(&cases[i]))
            .collect();
        if candidates.is_empty() {
            candidates = (0..cases.len()).filter(|&i| !selected[i]).collect();
        }
        let mut best = candidates[0];
        let mut best_score = f64::MIN;
        for &i in &candidates {
            let score = signatures[i].jaccard(&covered);
            if score > best_score {
                best_score = score;
                best = i;
            }
        }
        selected[best] = true;
        index.remove(&cases[best], &signatures[best]);
        covered.union(&signatures[best]);
        order.push(best);
    }
    debug!(cases = cases.len(), "lsh order complete");
    Ok(order)
}
