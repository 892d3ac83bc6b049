//! Canonical in-memory model of historical CI results
//!
//! One [`Checkout`] per evaluated commit, owning builds, test runs and test
//! case outcomes. Raw CI statuses collapse to a pass/fail/unknown tri-state
//! at ingest; everything downstream (normalization jobs, prioritization
//! strategies, APFD scoring) works on this model only.
//!
//! Ingest reads one JSON document per checkout. Relational storage of the
//! raw records is an external collaborator and out of scope here.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::path_mapping::PathMapping;

/// Collapsed outcome of a single test case execution.
///
/// Raw CI records carry four statuses (pass / fail / regressed / unknown);
/// "regressed" collapses into `Fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestStatus {
    Pass,
    Fail,
    Unknown,
}

impl TestStatus {
    /// Collapse a raw CI status string to the tri-state.
    pub fn from_raw(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();
        if lower == "pass" || raw == "Test executed successfully" {
            TestStatus::Pass
        } else if lower == "fail"
            || raw == "Test execution failed"
            || raw == "Test execution regressed"
        {
            TestStatus::Fail
        } else {
            TestStatus::Unknown
        }
    }
}

/// Source-file classification of a test case, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestCaseType {
    Unknown,
    C,
    Sh,
    Py,
}

impl TestCaseType {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("c") => TestCaseType::C,
            Some(ext) if ext.eq_ignore_ascii_case("sh") => TestCaseType::Sh,
            Some(ext) if ext.eq_ignore_ascii_case("py") => TestCaseType::Py,
            None => TestCaseType::Sh,
            _ => TestCaseType::Unknown,
        }
    }
}

/// One test case outcome within a test run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    /// Raw identifier as reported by CI; may be ambiguous.
    pub raw_path: String,
    /// Stable file-path identity, set at ingest or resolved via the mapping.
    pub file_path: Option<PathBuf>,
    pub status: TestStatus,
    pub has_known_issues: bool,
    /// Memoized source type, filled on first resolution.
    case_type: Option<TestCaseType>,
}

impl TestCase {
    pub fn new(
        id: String,
        raw_path: String,
        file_path: Option<PathBuf>,
        status: TestStatus,
        has_known_issues: bool,
    ) -> Self {
        // A failing case flagged as a known issue is not a fault signal.
        let status = if status == TestStatus::Fail && has_known_issues {
            TestStatus::Pass
        } else {
            status
        };
        let case_type = file_path.as_deref().map(TestCaseType::from_path);
        TestCase {
            id,
            raw_path,
            file_path,
            status,
            has_known_issues,
            case_type,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == TestStatus::Pass
    }

    pub fn is_failed(&self) -> bool {
        self.status == TestStatus::Fail
    }

    pub fn is_unknown(&self) -> bool {
        self.status == TestStatus::Unknown
    }

    /// Source type of the resolved file, memoized after the first resolution.
    pub fn case_type(&self) -> TestCaseType {
        match self.case_type {
            Some(t) => t,
            None => self
                .file_path
                .as_deref()
                .map(TestCaseType::from_path)
                .unwrap_or(TestCaseType::Unknown),
        }
    }

    /// Merge another observation of the same file path into this record.
    ///
    /// Any pass wins over fail; fail wins over unknown.
    pub fn merge_status(&mut self, other: &TestCase) {
        if self.is_pass() || other.is_pass() {
            self.status = TestStatus::Pass;
        } else if self.is_failed() || other.is_failed() {
            self.status = TestStatus::Fail;
        } else {
            self.status = TestStatus::Unknown;
        }
    }

    /// Resolve the file path via direct identity or the mapping table.
    ///
    /// Returns true when the case maps to an existing regular file. The
    /// resolved path and source type are memoized on success.
    pub fn resolve(&mut self, mapping: &PathMapping) -> bool {
        if self.file_path.is_none() {
            if let Some(mapped) = mapping.resolve(&self.raw_path) {
                self.file_path = Some(PathBuf::from(mapped));
            }
        }
        match self.file_path.as_deref() {
            Some(p) if p.exists() && p.is_file() => {
                if self.case_type.is_none() {
                    self.case_type = Some(TestCaseType::from_path(p));
                }
                true
            }
            _ => false,
        }
    }

    /// Suite classification derived from the file-path prefix.
    pub fn suite_name(&self) -> &'static str {
        let path = self
            .file_path
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.starts_with("test_cases/ltp") {
            "ltp"
        } else if path.starts_with("test_cases/selftests") {
            "selftest"
        } else {
            "unknown"
        }
    }

    /// Display name used by downstream harness tooling.
    ///
    /// Selftest cases render as `parent_dir:stem`, with the historical quirks
    /// of the suite (x86 cases run as 64-bit, futex functional tests run via
    /// a wrapper script) preserved.
    pub fn display_name(&self) -> String {
        let path = match self.file_path.as_deref() {
            Some(p) => p,
            None => return String::new(),
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.suite_name() != "selftest" {
            return stem;
        }
        let parent = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut name = format!("{parent}:{stem}");
        if parent == "x86" {
            name.push_str("_64");
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("sh") => name.push_str(".sh"),
            Some("py") => name.push_str(".py"),
            _ => {}
        }
        if name.contains("functional:futex") {
            name = "futex:run.sh".to_string();
        }
        if name == "exec:load_address" {
            name = "exec:load_address_16777216".to_string();
        }
        name
    }
}

/// One invocation unit within a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: String,
    pub tests: Vec<TestCase>,
}

/// One compiled configuration of a checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub name: String,
    /// Raw configuration description: a whitespace-separated token multiset.
    pub kconfig: String,
    pub arch: String,
    pub duration: f64,
    pub test_runs: Vec<TestRun>,
    /// Canonical name assigned by the choose-canonical-build job.
    pub canonical_name: Option<String>,
    /// Names of builds merged into this one by config consolidation.
    pub merged_names: BTreeSet<String>,
}

impl Build {
    /// Effective build label: canonical name when assigned, raw name otherwise.
    pub fn label(&self) -> &str {
        self.canonical_name.as_deref().unwrap_or(&self.name)
    }

    /// Order-insensitive configuration identity.
    pub fn config_key(&self) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .kconfig
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();
        tokens.sort();
        tokens
    }

    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_runs.iter().flat_map(|r| r.tests.iter())
    }

    pub fn case_count(&self) -> usize {
        self.test_runs.iter().map(|r| r.tests.len()).sum()
    }
}

/// One version-control commit evaluated by CI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub git_sha: String,
    pub branch: String,
    pub status: String,
    pub commit_time: DateTime<Utc>,
    pub builds: Vec<Build>,
}

impl Checkout {
    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.builds.iter().flat_map(|b| b.test_cases())
    }

    pub fn case_count(&self) -> usize {
        self.builds.iter().map(|b| b.case_count()).sum()
    }

    pub fn case_by_file_path(&self, file_path: &Path) -> Option<&TestCase> {
        self.test_cases()
            .find(|t| t.file_path.as_deref() == Some(file_path))
    }

    /// Drop builds with fewer resolved test cases than `min_cases`.
    pub fn retain_builds_with_min_cases(&mut self, min_cases: usize) {
        self.builds.retain(|b| b.case_count() > min_cases);
    }

    /// Keep only builds whose effective label matches `config_name`.
    pub fn select_build_by_label(&mut self, config_name: &str) {
        self.builds.retain(|b| b.label() == config_name);
    }
}

#[derive(Debug, Deserialize)]
struct RawTest {
    id: String,
    path: String,
    #[serde(default)]
    file_path: Option<String>,
    status: String,
    #[serde(default)]
    has_known_issues: bool,
}

#[derive(Debug, Deserialize)]
struct RawTestRun {
    id: String,
    #[serde(default)]
    tests: Vec<RawTest>,
}

#[derive(Debug, Deserialize)]
struct RawBuild {
    build_name: String,
    #[serde(default)]
    kconfig: String,
    #[serde(default)]
    arch: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    testruns: Vec<RawTestRun>,
}

#[derive(Debug, Deserialize)]
struct RawCheckout {
    git_sha: String,
    #[serde(default)]
    git_repo_branch: String,
    #[serde(default)]
    status: String,
    git_commit_datetime: DateTime<Utc>,
    #[serde(default)]
    builds: Vec<RawBuild>,
}

impl From<RawCheckout> for Checkout {
    fn from(raw: RawCheckout) -> Self {
        Checkout {
            git_sha: raw.git_sha,
            branch: raw.git_repo_branch,
            status: raw.status,
            commit_time: raw.git_commit_datetime,
            builds: raw
                .builds
                .into_iter()
                .map(|b| Build {
                    name: b.build_name,
                    kconfig: b.kconfig,
                    arch: b.arch,
                    duration: b.duration,
                    test_runs: b
                        .testruns
                        .into_iter()
                        .map(|r| TestRun {
                            id: r.id,
                            tests: r
                                .tests
                                .into_iter()
                                .map(|t| {
                                    TestCase::new(
                                        t.id,
                                        t.path,
                                        t.file_path.map(PathBuf::from),
                                        TestStatus::from_raw(&t.status),
                                        t.has_known_issues,
                                    )
                                })
                                .collect(),
                        })
                        .collect(),
                    canonical_name: None,
                    merged_names: BTreeSet::new(),
                })
                .collect(),
        }
    }
}

/// Load raw checkout records from a directory of JSON documents.
///
/// Unreadable or malformed documents are skipped with a warning; sibling
/// records are unaffected.
pub fn load_checkouts(dir: &Path) -> std::io::Result<Vec<Checkout>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .collect();
    paths.sort();

    let mut checkouts = Vec::with_capacity(paths.len());
    for path in paths {
        let text = match fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable checkout record");
                continue;
            }
        };
        match serde_json::from_str::<RawCheckout>(&text) {
            Ok(raw) => checkouts.push(Checkout::from(raw)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed checkout record");
            }
        }
    }
    Ok(checkouts)
}
