//! Normalization pipeline over historical CI results
//!
//! A [`CiHistory`] owns the ordered checkout list and applies [`Job`]s to it.
//! Per-checkout jobs run batch-parallel on a bounded worker pool; jobs whose
//! semantics depend on cross-checkout state (reordering, canonical-build
//! election, recurring-failure suppression) run sequentially over the list in
//! commit order.
//!
//! Jobs are idempotent: applying the same job twice leaves the history
//! unchanged after the first application.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::path_mapping::PathMapping;
use crate::record::{Build, Checkout, TestCase, TestCaseType};

#[cfg(test)]
mod tests;

/// One normalization step.
#[derive(Debug, Clone, Copy)]
pub enum Job<'a> {
    /// Sort checkouts by commit time, oldest first.
    Reorder,
    /// Merge repeated observations of the same test file within a checkout.
    CombineDuplicateCases,
    /// Merge builds of a checkout that compiled the same configuration.
    CombineEquivalentConfigs,
    /// Drop cases whose outcome never resolved to pass or fail.
    FilterUnknownCases,
    /// Keep only cases backed by a supported source type (C or shell).
    FilterCasesByType,
    /// Drop cases that do not map to an existing source file.
    FilterNoFileCases(&'a PathMapping),
    /// Drop known-issue cases and cases that never passed anywhere in the
    /// history; a permanently red test carries no fault signal.
    FilterAlwaysFailingCases,
    /// Drop builds with at most `min_cases` cases, then checkouts that fell
    /// below `min_cases` in total.
    FilterSmallBranches { min_cases: usize },
    /// Suppress repeats of a failure until the case passes again, so each
    /// fault is charged to the checkout that introduced it.
    FilterRecurringFailures,
    /// Elect one build configuration for the whole history and keep only
    /// builds matching it.
    ChooseCanonicalBuild,
}

impl Job<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Job::Reorder => "reorder",
            Job::CombineDuplicateCases => "combine_duplicate_cases",
            Job::CombineEquivalentConfigs => "combine_equivalent_configs",
            Job::FilterUnknownCases => "filter_unknown_cases",
            Job::FilterCasesByType => "filter_cases_by_type",
            Job::FilterNoFileCases(_) => "filter_no_file_cases",
            Job::FilterAlwaysFailingCases => "filter_always_failing_cases",
            Job::FilterSmallBranches { .. } => "filter_small_branches",
            Job::FilterRecurringFailures => "filter_recurring_failures",
            Job::ChooseCanonicalBuild => "choose_canonical_build",
        }
    }
}

/// The checkout history under normalization.
#[derive(Debug)]
pub struct CiHistory {
    pub checkouts: Vec<Checkout>,
    workers: usize,
}

impl CiHistory {
    pub fn new(checkouts: Vec<Checkout>, workers: usize) -> Self {
        CiHistory {
            checkouts,
            workers: workers.max(1),
        }
    }

    /// The default reduction applied before any prioritization experiment.
    pub fn default_reduction(min_cases: usize) -> Vec<Job<'static>> {
        vec![
            Job::Reorder,
            Job::CombineDuplicateCases,
            Job::FilterSmallBranches { min_cases },
            Job::CombineEquivalentConfigs,
            Job::ChooseCanonicalBuild,
            Job::FilterSmallBranches { min_cases },
            Job::FilterRecurringFailures,
        ]
    }

    pub fn run(&mut self, jobs: &[Job]) -> Result<()> {
        for job in jobs {
            self.apply(job)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, job: &Job) -> Result<()> {
        debug!(
            job = job.name(),
            checkouts = self.checkouts.len(),
            cases = self.case_count(),
            "before job"
        );
        match job {
            Job::Reorder => self.reorder(),
            Job::CombineDuplicateCases => self.parallel(combine_duplicate_cases)?,
            Job::CombineEquivalentConfigs => self.parallel(combine_equivalent_configs)?,
            Job::FilterUnknownCases => {
                self.parallel(|c| retain_cases(c, |tc| !tc.is_unknown()))?;
            }
            Job::FilterCasesByType => {
                self.parallel(|c| {
                    retain_cases(c, |tc| {
                        matches!(tc.case_type(), TestCaseType::C | TestCaseType::Sh)
                    });
                })?;
            }
            Job::FilterNoFileCases(mapping) => {
                self.parallel(|c| {
                    for build in &mut c.builds {
                        for run in &mut build.test_runs {
                            run.tests.retain_mut(|tc| tc.resolve(mapping));
                        }
                    }
                })?;
            }
            Job::FilterAlwaysFailingCases => self.filter_always_failing()?,
            Job::FilterSmallBranches { min_cases } => self.filter_small_branches(*min_cases),
            Job::FilterRecurringFailures => self.filter_recurring_failures(),
            Job::ChooseCanonicalBuild => self.choose_canonical_build(),
        }
        debug!(
            job = job.name(),
            checkouts = self.checkouts.len(),
            cases = self.case_count(),
            "after job"
        );
        Ok(())
    }

    pub fn case_count(&self) -> usize {
        self.checkouts.iter().map(Checkout::case_count).sum()
    }

    /// Log summary counters for the current state of the history.
    pub fn statistics(&self) {
        let builds: usize = self.checkouts.iter().map(|c| c.builds.len()).sum();
        let cases = self.case_count();
        let failed: usize = self
            .checkouts
            .iter()
            .flat_map(Checkout::test_cases)
            .filter(|tc| tc.is_failed())
            .count();
        let distinct: HashSet<&PathBuf> = self
            .checkouts
            .iter()
            .flat_map(Checkout::test_cases)
            .filter_map(|tc| tc.file_path.as_ref())
            .collect();
        info!(
            checkouts = self.checkouts.len(),
            builds,
            cases,
            failed,
            distinct_files = distinct.len(),
            "history statistics"
        );
    }

    fn parallel<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&mut Checkout) + Sync + Send,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .context("building worker pool")?;
        pool.install(|| self.checkouts.par_iter_mut().for_each(|c| f(c)));
        Ok(())
    }

    fn reorder(&mut self) {
        self.checkouts.sort_by_key(|c| c.commit_time);
    }

    fn filter_small_branches(&mut self, min_cases: usize) {
        for checkout in &mut self.checkouts {
            checkout.retain_builds_with_min_cases(min_cases);
        }
        self.checkouts.retain(|c| c.case_count() >= min_cases);
    }

    fn filter_always_failing(&mut self) -> Result<()> {
        let mut ever_passed: HashMap<String, bool> = HashMap::new();
        for tc in self.checkouts.iter().flat_map(Checkout::test_cases) {
            let entry = ever_passed.entry(tc.raw_path.clone()).or_insert(false);
            if tc.is_pass() {
                *entry = true;
            }
        }
        self.parallel(|c| {
            retain_cases(c, |tc| {
                !tc.has_known_issues && ever_passed.get(&tc.raw_path).copied().unwrap_or(false)
            });
        })
    }

    fn filter_recurring_failures(&mut self) {
        let mut still_failing: HashSet<PathBuf> = HashSet::new();
        for checkout in &mut self.checkouts {
            for build in &mut checkout.builds {
                for run in &mut build.test_runs {
                    run.tests.retain(|tc| {
                        let path = tc
                            .file_path
                            .clone()
                            .unwrap_or_else(|| PathBuf::from(&tc.raw_path));
                        if tc.is_failed() {
                            // Only the first failure of a streak survives.
                            still_failing.insert(path)
                        } else {
                            still_failing.remove(&path);
                            true
                        }
                    });
                }
            }
        }
    }

    fn choose_canonical_build(&mut self) {
        // (config key, first-seen name, build count, case total)
        let mut stats: Vec<(Vec<String>, String, usize, usize)> = Vec::new();
        for build in self.checkouts.iter().flat_map(|c| c.builds.iter()) {
            let key = build.config_key();
            match stats.iter_mut().find(|(k, ..)| *k == key) {
                Some((_, _, count, cases)) => {
                    *count += 1;
                    *cases += build.case_count();
                }
                None => stats.push((key, build.name.clone(), 1, build.case_count())),
            }
        }
        for build in self.checkouts.iter_mut().flat_map(|c| c.builds.iter_mut()) {
            let key = build.config_key();
            if let Some((_, name, ..)) = stats.iter().find(|(k, ..)| *k == key) {
                build.canonical_name = Some(name.clone());
            }
        }
        let best = stats.iter().max_by(|a, b| {
            let avg_a = a.3 as f64 / a.2 as f64;
            let avg_b = b.3 as f64 / b.2 as f64;
            avg_a.total_cmp(&avg_b)
        });
        if let Some((_, name, count, cases)) = best {
            let avg = *cases as f64 / *count as f64;
            info!(
                "select {} as build name with {:.1} test cases per build, total {} builds.",
                name, avg, count
            );
            for checkout in &mut self.checkouts {
                checkout.select_build_by_label(name);
            }
        }
    }
}

fn retain_cases<F>(checkout: &mut Checkout, keep: F)
where
    F: Fn(&TestCase) -> bool,
{
    for build in &mut checkout.builds {
        for run in &mut build.test_runs {
            run.tests.retain(&keep);
        }
    }
}

/// Merge every later observation of a file path into its first occurrence.
fn combine_duplicate_cases(checkout: &mut Checkout) {
    let mut first: HashMap<PathBuf, (usize, usize, usize)> = HashMap::new();
    let mut merged: HashMap<PathBuf, TestCase> = HashMap::new();
    for (bi, build) in checkout.builds.iter().enumerate() {
        for (ri, run) in build.test_runs.iter().enumerate() {
            for (ti, tc) in run.tests.iter().enumerate() {
                let Some(path) = tc.file_path.clone() else {
                    continue;
                };
                match merged.get_mut(&path) {
                    Some(kept) => kept.merge_status(tc),
                    None => {
                        first.insert(path.clone(), (bi, ri, ti));
                        merged.insert(path, tc.clone());
                    }
                }
            }
        }
    }
    for (bi, build) in checkout.builds.iter_mut().enumerate() {
        for (ri, run) in build.test_runs.iter_mut().enumerate() {
            let mut kept = Vec::with_capacity(run.tests.len());
            for (ti, tc) in run.tests.drain(..).enumerate() {
                match tc.file_path.as_ref() {
                    Some(path) => match (first.get(path), merged.get(path)) {
                        (Some(&pos), Some(m)) if pos == (bi, ri, ti) => kept.push(m.clone()),
                        (Some(_), _) => {}
                        _ => kept.push(tc),
                    },
                    None => kept.push(tc),
                }
            }
            run.tests = kept;
        }
    }
}

/// Consolidate builds that compiled the same configuration. The survivor is
/// the build with the shortest name; the others contribute their test runs
/// and are recorded in `merged_names`. Case duplicates introduced by the
/// merge are combined immediately.
fn combine_equivalent_configs(checkout: &mut Checkout) {
    let mut groups: Vec<(Vec<String>, Vec<Build>)> = Vec::new();
    for build in checkout.builds.drain(..) {
        let key = build.config_key();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(build),
            None => groups.push((key, vec![build])),
        }
    }
    let mut builds = Vec::with_capacity(groups.len());
    for (_, mut group) in groups {
        let mut survivor_idx = 0;
        for (i, build) in group.iter().enumerate() {
            if build.name.len() < group[survivor_idx].name.len() {
                survivor_idx = i;
            }
        }
        let mut survivor = group.remove(survivor_idx);
        for other in group {
            survivor.merged_names.insert(other.name);
            survivor.merged_names.extend(other.merged_names);
            survivor.test_runs.extend(other.test_runs);
        }
        builds.push(survivor);
    }
    checkout.builds = builds;
    combine_duplicate_cases(checkout);
}
