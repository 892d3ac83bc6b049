//! Run configuration
//!
//! One TOML document points at the data the experiments consume: the raw
//! checkout records, the path mapping, the static call-graph dumps and the
//! cache files. Every field has a default, so a partial document only
//! overrides what it names.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Worker threads for batch-parallel jobs and experiment units.
    pub workers: usize,
    /// Minimum resolved cases a build or checkout must carry to survive.
    pub min_test_cases: usize,
    /// Directory of raw checkout records, one JSON document each.
    pub checkout_dir: PathBuf,
    /// Optional raw-path to file-path mapping table.
    pub mapping_file: Option<PathBuf>,
    /// Per-version kernel call graphs, `<sha>-cg.txt` each.
    pub kernel_cg_dir: PathBuf,
    /// Static call-graph dumps of compiled test cases.
    pub test_cg_dir: PathBuf,
    /// Same, for the selftest suite.
    pub selftest_cg_dir: PathBuf,
    /// Shell execution traces, `<stem>.txt` each.
    pub sh_trace_dir: PathBuf,
    /// Library call graph as a `caller : callee` edge list.
    pub library_graph: PathBuf,
    /// Syscall wrapper names considered interesting.
    pub syscall_list: PathBuf,
    /// Kernel syscall table mapping wrappers to entry symbols.
    pub syscall_table: PathBuf,
    /// Token cache file; omitted means in-memory only.
    pub token_cache: Option<PathBuf>,
    /// Distance cache file; omitted means in-memory only.
    pub distance_cache: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            workers: 4,
            min_test_cases: 100,
            checkout_dir: PathBuf::from("data/checkouts"),
            mapping_file: None,
            kernel_cg_dir: PathBuf::from("data/kernel_cg"),
            test_cg_dir: PathBuf::from("data/test_cg"),
            selftest_cg_dir: PathBuf::from("data/selftest_cg"),
            sh_trace_dir: PathBuf::from("data/sh_traces"),
            library_graph: PathBuf::from("data/library_cg.txt"),
            syscall_list: PathBuf::from("data/syscalls.txt"),
            syscall_table: PathBuf::from("data/syscall_64.tbl"),
            token_cache: None,
            distance_cache: None,
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}
