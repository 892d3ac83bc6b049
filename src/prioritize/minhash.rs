//! MinHash signatures and banded locality-sensitive hashing
//!
//! Signatures approximate Jaccard similarity between token sets; the banded
//! index recalls likely-similar tests in sub-quadratic time. Permutation
//! parameters come from a fixed-seed generator, so signatures are comparable
//! across runs and cache sessions.

use std::collections::HashSet;
use std::hash::Hasher;

use fnv::{FnvHashMap, FnvHasher};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};

const MERSENNE_PRIME: u64 = (1 << 61) - 1;
const PERMUTATION_SEED: u64 = 1;

fn token_hash(token: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(token.as_bytes());
    hasher.finish() % MERSENNE_PRIME
}

fn permute(hash: u64, a: u64, b: u64) -> u64 {
    ((a as u128 * hash as u128 + b as u128) % MERSENNE_PRIME as u128) as u64
}

/// Family of `num_perm` universal-hash permutations.
#[derive(Debug, Clone)]
pub struct MinHasher {
    a: Vec<u64>,
    b: Vec<u64>,
}

impl MinHasher {
    pub fn new(num_perm: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(PERMUTATION_SEED);
        let a = (0..num_perm)
            .map(|_| rng.gen_range(1..MERSENNE_PRIME))
            .collect();
        let b = (0..num_perm)
            .map(|_| rng.gen_range(0..MERSENNE_PRIME))
            .collect();
        MinHasher { a, b }
    }

    pub fn num_perm(&self) -> usize {
        self.a.len()
    }

    pub fn signature(&self, tokens: &[String]) -> MinHash {
        let hashes: Vec<u64> = tokens.iter().map(|t| token_hash(t)).collect();
        let values = self
            .a
            .iter()
            .zip(&self.b)
            .map(|(&a, &b)| {
                hashes
                    .iter()
                    .map(|&h| permute(h, a, b))
                    .min()
                    .unwrap_or(MERSENNE_PRIME)
            })
            .collect();
        MinHash { values }
    }

    /// Signature for a test whose token derivation came back empty.
    pub fn empty_signature(&self) -> MinHash {
        self.signature(&[String::new()])
    }
}

/// A MinHash signature vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinHash {
    values: Vec<u64>,
}

impl MinHash {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Estimated Jaccard similarity: the fraction of agreeing slots.
    pub fn jaccard(&self, other: &MinHash) -> f64 {
        if self.values.is_empty() || self.values.len() != other.values.len() {
            return 0.0;
        }
        let equal = self
            .values
            .iter()
            .zip(&other.values)
            .filter(|(a, b)| a == b)
            .count();
        equal as f64 / self.values.len() as f64
    }

    /// Merge another signature in, keeping the slot-wise minimum. The result
    /// is the signature of the union of the underlying token sets.
    pub fn union(&mut self, other: &MinHash) {
        if self.values.is_empty() {
            self.values = other.values.clone();
            return;
        }
        for (slot, v) in self.values.iter_mut().zip(&other.values) {
            *slot = (*slot).min(*v);
        }
    }

    pub fn empty() -> Self {
        MinHash { values: Vec::new() }
    }

    fn band(&self, band: usize, rows: usize) -> u64 {
        let mut hasher = FnvHasher::default();
        for v in &self.values[band * rows..(band + 1) * rows] {
            hasher.write_u64(*v);
        }
        hasher.finish()
    }
}

/// Banded LSH index over MinHash signatures, keyed by test identity.
#[derive(Debug)]
pub struct LshIndex {
    bands: usize,
    rows: usize,
    buckets: Vec<FnvHashMap<u64, HashSet<String>>>,
}

impl LshIndex {
    /// The banding must tile the signature exactly.
    pub fn new(bands: usize, rows: usize, num_perm: usize) -> Result<Self> {
        if bands * rows != num_perm {
            return Err(Error::LshConfig {
                bands,
                rows,
                num_perm,
            });
        }
        Ok(LshIndex {
            bands,
            rows,
            buckets: vec![FnvHashMap::default(); bands],
        })
    }

    pub fn insert(&mut self, key: &str, signature: &MinHash) {
        for (band, bucket) in self.buckets.iter_mut().enumerate() {
            bucket
                .entry(signature.band(band, self.rows))
                .or_default()
                .insert(key.to_string());
        }
    }

    pub fn remove(&mut self, key: &str, signature: &MinHash) {
        for (band, bucket) in self.buckets.iter_mut().enumerate() {
            if let Some(members) = bucket.get_mut(&signature.band(band, self.rows)) {
                members.remove(key);
            }
        }
    }

    /// Keys sharing at least one band with `signature`.
    pub fn query(&self, signature: &MinHash) -> HashSet<String> {
        if signature.is_empty() {
            return HashSet::new();
        }
        let mut near = HashSet::new();
        for (band, bucket) in self.buckets.iter().enumerate() {
            if let Some(members) = bucket.get(&signature.band(band, self.rows)) {
                near.extend(members.iter().cloned());
            }
        }
        near
    }

    pub fn bands(&self) -> usize {
        self.bands
    }
}
