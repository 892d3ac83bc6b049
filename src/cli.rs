//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::prioritize::{CgStrategy, DistanceMetric};

#[derive(Debug, Parser)]
#[command(author, version, about = "Regression test prioritization over CI history")]
pub struct Cli {
    /// Run configuration file (TOML); defaults apply when omitted.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `priorizar=debug`.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Ingest raw checkout records and emit the normalized history log.
    Normalize {
        /// Directory of raw checkout records; overrides the configured one.
        #[arg(long)]
        checkout_dir: Option<PathBuf>,

        /// Minimum cases a build or checkout must carry.
        #[arg(long)]
        min_cases: Option<usize>,
    },

    /// Adaptive random prioritization sweep over a history log.
    Arp {
        history_log: PathBuf,

        #[arg(long, value_enum, default_value_t = DistanceMetric::Hamming)]
        metric: DistanceMetric,

        /// Candidate sample size per selection round.
        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },

    /// Similarity-based (LSH) prioritization sweep over a history log.
    Fast {
        history_log: PathBuf,

        #[arg(long, default_value_t = 16)]
        bands: usize,

        #[arg(long, default_value_t = 8)]
        rows: usize,

        /// Signature length; must equal bands times rows.
        #[arg(long, default_value_t = 128)]
        num_perm: usize,
    },

    /// Call-graph reachability prioritization sweep over a history log.
    Callgraph {
        history_log: PathBuf,

        #[arg(long, value_enum, default_value_t = CgStrategy::Additional)]
        strategy: CgStrategy,
    },
}
