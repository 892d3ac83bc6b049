//! Test-case prioritization strategies
//!
//! Three strategy families share the same shape: take the test cases of one
//! checkout, produce a permutation of their indices, and let APFD judge how
//! early the faulty ones land.

pub mod distance;
pub mod lsh;
pub mod minhash;
pub mod reach;

pub use distance::{adaptive_random_order, precompute, DistanceMetric};
pub use lsh::lsh_greedy_order;
pub use minhash::{LshIndex, MinHash, MinHasher};
pub use reach::{additional_order, total_order, CgStrategy};
