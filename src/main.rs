use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use priorizar::cache::{DistanceCache, TokenCache};
use priorizar::cli::{Cli, Command};
use priorizar::config::RunConfig;
use priorizar::experiment::{parse_history_log, run_arp, run_callgraph, run_fast};
use priorizar::path_mapping::PathMapping;
use priorizar::pipeline::{CiHistory, Job};
use priorizar::record::load_checkouts;
use priorizar::syscalls::ReachabilityContext;
use priorizar::tokenizer::LexicalTokenizer;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };

    match cli.command {
        Command::Normalize {
            checkout_dir,
            min_cases,
        } => normalize(
            &config,
            checkout_dir
                .as_deref()
                .unwrap_or_else(|| config.checkout_dir.as_path()),
            min_cases.unwrap_or(config.min_test_cases),
        ),
        Command::Arp {
            history_log,
            metric,
            k,
        } => {
            let infos = parse_history_log(&history_log)?;
            let mut distances = match &config.distance_cache {
                Some(path) => DistanceCache::load(path.clone()),
                None => DistanceCache::in_memory(),
            };
            if let Some(avg) = run_arp(&infos, metric, k, &mut distances) {
                println!("avg apfd: {avg:.4}");
            }
            distances.save().context("saving distance cache")?;
            Ok(())
        }
        Command::Fast {
            history_log,
            bands,
            rows,
            num_perm,
        } => {
            let infos = parse_history_log(&history_log)?;
            let mut tokens = match &config.token_cache {
                Some(path) => TokenCache::load(path.clone()),
                None => TokenCache::in_memory(),
            };
            let tokenizer = LexicalTokenizer::new();
            if let Some(avg) = run_fast(&infos, bands, rows, num_perm, &mut tokens, &tokenizer)? {
                println!("avg apfd: {avg:.4}");
            }
            tokens.save().context("saving token cache")?;
            Ok(())
        }
        Command::Callgraph {
            history_log,
            strategy,
        } => {
            let infos = parse_history_log(&history_log)?;
            let ctx = ReachabilityContext::load(
                config.test_cg_dir.clone(),
                config.selftest_cg_dir.clone(),
                config.sh_trace_dir.clone(),
                &config.library_graph,
                &config.syscall_list,
                &config.syscall_table,
            )?;
            if let Some(avg) = run_callgraph(&infos, strategy, &ctx, &config.kernel_cg_dir) {
                println!("avg apfd: {avg:.4}");
            }
            Ok(())
        }
    }
}

/// Run the normalization pipeline and print the history log to stdout.
fn normalize(config: &RunConfig, checkout_dir: &Path, min_cases: usize) -> Result<()> {
    let checkouts = load_checkouts(checkout_dir)
        .with_context(|| format!("reading checkouts from {}", checkout_dir.display()))?;
    info!(checkouts = checkouts.len(), "loaded raw history");
    let mut history = CiHistory::new(checkouts, config.workers);

    let mapping = match &config.mapping_file {
        Some(path) => Some(PathMapping::load(path)?),
        None => None,
    };
    if let Some(mapping) = &mapping {
        history.run(&[
            Job::FilterNoFileCases(mapping),
            Job::FilterUnknownCases,
            Job::FilterCasesByType,
        ])?;
    } else {
        history.run(&[Job::FilterUnknownCases])?;
    }
    history.run(&CiHistory::default_reduction(min_cases))?;
    history.statistics();

    for checkout in &history.checkouts {
        let total: Vec<String> = checkout
            .test_cases()
            .filter_map(|tc| tc.file_path.as_ref())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let fail: Vec<String> = checkout
            .test_cases()
            .filter(|tc| tc.is_failed())
            .filter_map(|tc| tc.file_path.as_ref())
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        println!("checkout: {}", checkout.git_sha);
        println!("total_cases: {}", format_case_list(&total));
        println!("fail_cases: {}", format_case_list(&fail));
    }
    Ok(())
}

fn format_case_list(cases: &[String]) -> String {
    let quoted: Vec<String> = cases.iter().map(|c| format!("'{c}'")).collect();
    format!("[{}]", quoted.join(", "))
}
