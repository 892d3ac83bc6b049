//! Experiment drivers over a normalized history log
//!
//! A history log is the line-oriented output of the normalize step: for each
//! checkout a `checkout:` line, the ordered `total_cases:` list and the
//! `fail_cases:` subset. Each driver replays every checkout as one
//! evaluation unit, prioritizes its cases, scores the order with APFD and
//! reports the average over all scored units.
//!
//! Units are independent and run on the rayon pool. A unit with no failures
//! carries no signal and is skipped; a unit that cannot be evaluated is
//! skipped with a warning rather than failing the sweep.

use std::path::Path;

use anyhow::Result;
use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::apfd::apfd;
use crate::cache::{DistanceCache, TokenCache};
use crate::error::Error;
use crate::prioritize::minhash::LshIndex;
use crate::prioritize::{
    adaptive_random_order, lsh_greedy_order, precompute, CgStrategy, DistanceMetric,
};
use crate::syscalls::ReachabilityContext;
use crate::tokenizer::Tokenizer;

/// One checkout of a history log: the ordered case list and its failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutInfo {
    pub git_sha: String,
    pub total_cases: Vec<String>,
    pub fail_cases: Vec<String>,
}

impl CheckoutInfo {
    /// Indices of the failing cases within `total_cases`.
    pub fn fault_indices(&self) -> Vec<usize> {
        self.total_cases
            .iter()
            .enumerate()
            .filter(|(_, c)| self.fail_cases.contains(c))
            .map(|(i, _)| i)
            .collect()
    }
}

fn parse_case_list(line: &str, list_re: &Regex) -> Option<Vec<String>> {
    let inner = list_re.captures(line)?.get(1)?.as_str();
    let cases = inner
        .split(", ")
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|item| !item.is_empty())
        .collect();
    Some(cases)
}

/// Parse a history log into checkout records.
///
/// A record is three consecutive labeled lines; incomplete records are
/// skipped with a warning so one corrupt entry does not discard the sweep.
pub fn parse_history_log(path: &Path) -> Result<Vec<CheckoutInfo>, Error> {
    let text = std::fs::read_to_string(path).map_err(|e| Error::HistoryLog {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let list_re = Regex::new(r"\[(.*)\]").map_err(|e| Error::HistoryLog {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut records = Vec::new();
    let mut sha: Option<String> = None;
    let mut total: Option<Vec<String>> = None;
    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("checkout: ") {
            if sha.is_some() {
                warn!(path = %path.display(), "incomplete record, skipping");
            }
            sha = Some(rest.trim().to_string());
            total = None;
        } else if line.starts_with("total_cases: ") {
            total = parse_case_list(line, &list_re);
        } else if line.starts_with("fail_cases: ") {
            match (sha.take(), total.take(), parse_case_list(line, &list_re)) {
                (Some(git_sha), Some(total_cases), Some(fail_cases)) => {
                    records.push(CheckoutInfo {
                        git_sha,
                        total_cases,
                        fail_cases,
                    });
                }
                _ => warn!(path = %path.display(), "incomplete record, skipping"),
            }
        }
    }
    Ok(records)
}

fn summarize(label: &str, scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        warn!("{} produced no scorable checkouts", label);
        return None;
    }
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    info!("{}, units: {}, avg apfd: {:.4}", label, scores.len(), avg);
    Some(avg)
}

/// Adaptive random prioritization sweep.
///
/// Pairwise distances are filled into the cache up front; the per-checkout
/// units then run in parallel against the read-only table.
pub fn run_arp(
    infos: &[CheckoutInfo],
    metric: DistanceMetric,
    k: usize,
    distances: &mut DistanceCache,
) -> Option<f64> {
    for info in infos {
        precompute(metric, &info.total_cases, distances);
    }
    let distances = &*distances;
    let scores: Vec<f64> = infos
        .par_iter()
        .filter_map(|info| {
            let faults = info.fault_indices();
            if faults.is_empty() {
                return None;
            }
            let mut rng = rand::thread_rng();
            let order = adaptive_random_order(&info.total_cases, k, distances, &mut rng);
            let score = apfd(&faults, &order);
            debug!(
                "distance_metric: {}, commit: {}, apfd: {:.4}",
                metric.name(),
                info.git_sha,
                score
            );
            Some(score)
        })
        .collect();
    summarize(&format!("distance_metric: {}", metric.name()), &scores)
}

/// Similarity-based (LSH) prioritization sweep.
pub fn run_fast(
    infos: &[CheckoutInfo],
    bands: usize,
    rows: usize,
    num_perm: usize,
    tokens: &mut TokenCache,
    tokenizer: &dyn Tokenizer,
) -> Result<Option<f64>> {
    // Reject an impossible banding before any unit runs.
    LshIndex::new(bands, rows, num_perm)?;
    for info in infos {
        for case in &info.total_cases {
            tokens.ensure(case, tokenizer);
        }
    }
    let tokens = &*tokens;
    let scores: Vec<f64> = infos
        .par_iter()
        .filter_map(|info| {
            let faults = info.fault_indices();
            if faults.is_empty() {
                return None;
            }
            let token_lists: Vec<Vec<String>> = info
                .total_cases
                .iter()
                .map(|c| tokens.get(c).cloned().unwrap_or_default())
                .collect();
            let order =
                match lsh_greedy_order(&info.total_cases, &token_lists, bands, rows, num_perm) {
                    Ok(order) => order,
                    Err(e) => {
                        warn!(commit = %info.git_sha, error = %e, "skipping checkout");
                        return None;
                    }
                };
            let score = apfd(&faults, &order);
            debug!(
                "bands: {}, rows: {}, h: {}, commit: {}, apfd: {:.4}",
                bands, rows, num_perm, info.git_sha, score
            );
            Some(score)
        })
        .collect();
    Ok(summarize(
        &format!("bands: {bands}, rows: {rows}, h: {num_perm}"),
        &scores,
    ))
}

/// Call-graph reachability prioritization sweep.
///
/// Each unit binds the shared context to its own version's kernel graph,
/// read from `kernel_cg_dir/<sha>-cg.txt`.
pub fn run_callgraph(
    infos: &[CheckoutInfo],
    strategy: CgStrategy,
    ctx: &ReachabilityContext,
    kernel_cg_dir: &Path,
) -> Option<f64> {
    // Units stream their scores through a channel; each one holds a full
    // kernel graph, so nothing accumulates beyond the scalar results.
    let (tx, rx) = crossbeam::channel::unbounded();
    infos.par_iter().for_each_with(tx, |tx, info| {
        let faults = info.fault_indices();
        if faults.is_empty() {
            return;
        }
        let kernel_cg = kernel_cg_dir.join(format!("{}-cg.txt", info.git_sha));
        let mut index = match ctx.for_kernel(&kernel_cg) {
            Ok(index) => index,
            Err(e) => {
                warn!(commit = %info.git_sha, error = %e, "skipping checkout");
                return;
            }
        };
        let sets: Vec<_> = info
            .total_cases
            .iter()
            .map(|c| index.reachable_operations(c))
            .collect();
        let order = strategy.order(&sets);
        let score = apfd(&faults, &order);
        debug!(
            "strategy: {}, commit: {}, apfd: {:.4}",
            strategy.name(),
            info.git_sha,
            score
        );
        let _ = tx.send(score);
    });
    let scores: Vec<f64> = rx.iter().collect();
    summarize(&format!("strategy: {}", strategy.name()), &scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const LOG: &str = "\
checkout: abc123
total_cases: ['a.c', 'b.c', 'c.sh']
fail_cases: ['b.c']
checkout: def456
total_cases: ['a.c']
fail_cases: []
";

    #[test]
    fn test_parse_history_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.log");
        fs::write(&path, LOG).unwrap();
        let infos = parse_history_log(&path).unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].git_sha, "abc123");
        assert_eq!(infos[0].total_cases, vec!["a.c", "b.c", "c.sh"]);
        assert_eq!(infos[0].fail_cases, vec!["b.c"]);
        assert!(infos[1].fail_cases.is_empty());
    }

    #[test]
    fn test_parse_skips_incomplete_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.log");
        fs::write(
            &path,
            "checkout: lonely\ncheckout: ok\ntotal_cases: ['a.c']\nfail_cases: ['a.c']\n",
        )
        .unwrap();
        let infos = parse_history_log(&path).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].git_sha, "ok");
    }

    #[test]
    fn test_parse_missing_file_is_error() {
        assert!(parse_history_log(Path::new("/no/such/history.log")).is_err());
    }

    #[test]
    fn test_fault_indices() {
        let info = CheckoutInfo {
            git_sha: "abc".to_string(),
            total_cases: vec!["a.c".into(), "b.c".into(), "c.c".into()],
            fail_cases: vec!["c.c".into(), "a.c".into()],
        };
        assert_eq!(info.fault_indices(), vec![0, 2]);
    }

    #[test]
    fn test_run_arp_scores_only_failing_checkouts() {
        let infos = vec![
            CheckoutInfo {
                git_sha: "abc".to_string(),
                total_cases: vec!["a.c".into(), "b.c".into()],
                fail_cases: vec!["a.c".into()],
            },
            CheckoutInfo {
                git_sha: "def".to_string(),
                total_cases: vec!["a.c".into()],
                fail_cases: vec![],
            },
        ];
        let mut cache = DistanceCache::in_memory();
        let avg = run_arp(&infos, DistanceMetric::Hamming, 5, &mut cache).unwrap();
        assert!((0.0..=1.0).contains(&avg));
    }

    #[test]
    fn test_run_fast_rejects_bad_banding() {
        let mut tokens = TokenCache::in_memory();
        let tokenizer = crate::tokenizer::LexicalTokenizer::new();
        assert!(run_fast(&[], 16, 9, 128, &mut tokens, &tokenizer).is_err());
    }
}
