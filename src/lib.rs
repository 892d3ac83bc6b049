//! # Priorizar
//!
//! Regression test-case prioritization over historical CI results.
//!
//! The crate ingests raw checkout records from a kernel CI system,
//! normalizes them into a clean per-commit history, and replays that history
//! under competing prioritization strategies, scoring each produced order
//! with APFD:
//!
//! - **Adaptive random** ([`prioritize::distance`]): greedy max-min
//!   diversity over string distances between test sources.
//! - **Similarity-based** ([`prioritize::lsh`]): MinHash signatures and a
//!   banded LSH index over lexical tokens.
//! - **Call-graph reachability** ([`prioritize::reach`]): total and
//!   additional greedy over the kernel operations each test can reach.

pub mod apfd;
pub mod cache;
pub mod callgraph;
pub mod cli;
pub mod config;
pub mod error;
pub mod experiment;
pub mod path_mapping;
pub mod pipeline;
pub mod prioritize;
pub mod record;
pub mod syscalls;
pub mod tokenizer;

pub use error::{Error, Result};
