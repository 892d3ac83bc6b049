use std::collections::BTreeSet;
use std::path::PathBuf;

use chrono::DateTime;

use super::*;
use crate::record::{TestRun, TestStatus};

fn case(path: &str, status: TestStatus) -> TestCase {
    TestCase::new(
        format!("id-{path}"),
        path.to_string(),
        Some(PathBuf::from(path)),
        status,
        false,
    )
}

fn build(name: &str, kconfig: &str, tests: Vec<TestCase>) -> Build {
    Build {
        name: name.to_string(),
        kconfig: kconfig.to_string(),
        arch: "x86_64".to_string(),
        duration: 0.0,
        test_runs: vec![TestRun {
            id: format!("run-{name}"),
            tests,
        }],
        canonical_name: None,
        merged_names: BTreeSet::new(),
    }
}

fn checkout(sha: &str, hour: i64, builds: Vec<Build>) -> Checkout {
    Checkout {
        git_sha: sha.to_string(),
        branch: "master".to_string(),
        status: "done".to_string(),
        commit_time: DateTime::from_timestamp(hour * 3600, 0).unwrap(),
        builds,
    }
}

#[test]
fn test_reorder_sorts_by_commit_time() {
    let mut history = CiHistory::new(
        vec![
            checkout("b", 2, vec![]),
            checkout("a", 1, vec![]),
            checkout("c", 3, vec![]),
        ],
        2,
    );
    history.apply(&Job::Reorder).unwrap();
    let shas: Vec<&str> = history.checkouts.iter().map(|c| c.git_sha.as_str()).collect();
    assert_eq!(shas, vec!["a", "b", "c"]);
}

#[test]
fn test_combine_duplicate_cases_any_pass_wins() {
    let mut history = CiHistory::new(
        vec![checkout(
            "a",
            1,
            vec![build(
                "gcc",
                "C=y",
                vec![
                    case("a.c", TestStatus::Fail),
                    case("b.c", TestStatus::Fail),
                    case("a.c", TestStatus::Pass),
                ],
            )],
        )],
        1,
    );
    history.apply(&Job::CombineDuplicateCases).unwrap();
    let co = &history.checkouts[0];
    assert_eq!(co.case_count(), 2);
    let merged = co.case_by_file_path(&PathBuf::from("a.c")).unwrap();
    assert!(merged.is_pass());
    assert!(co
        .case_by_file_path(&PathBuf::from("b.c"))
        .unwrap()
        .is_failed());
}

#[test]
fn test_combine_duplicate_cases_is_idempotent() {
    let mut history = CiHistory::new(
        vec![checkout(
            "a",
            1,
            vec![build(
                "gcc",
                "C=y",
                vec![case("a.c", TestStatus::Fail), case("a.c", TestStatus::Unknown)],
            )],
        )],
        1,
    );
    history.apply(&Job::CombineDuplicateCases).unwrap();
    let once = history.checkouts[0].case_count();
    history.apply(&Job::CombineDuplicateCases).unwrap();
    assert_eq!(history.checkouts[0].case_count(), once);
    assert_eq!(once, 1);
}

#[test]
fn test_combine_equivalent_configs_shortest_name_survives() {
    let mut history = CiHistory::new(
        vec![checkout(
            "a",
            1,
            vec![
                build("gcc-13-long", "B=y A=y", vec![case("a.c", TestStatus::Pass)]),
                build("gcc", "A=y B=y", vec![case("b.c", TestStatus::Fail)]),
                build("clang", "OTHER=y", vec![case("c.c", TestStatus::Pass)]),
            ],
        )],
        1,
    );
    history.apply(&Job::CombineEquivalentConfigs).unwrap();
    let co = &history.checkouts[0];
    assert_eq!(co.builds.len(), 2);
    let merged = co.builds.iter().find(|b| b.name == "gcc").unwrap();
    assert!(merged.merged_names.contains("gcc-13-long"));
    assert_eq!(merged.case_count(), 2);
}

#[test]
fn test_filter_unknown_and_type() {
    let mut history = CiHistory::new(
        vec![checkout(
            "a",
            1,
            vec![build(
                "gcc",
                "C=y",
                vec![
                    case("a.c", TestStatus::Pass),
                    case("b.sh", TestStatus::Fail),
                    case("c.rs", TestStatus::Pass),
                    case("d.c", TestStatus::Unknown),
                ],
            )],
        )],
        1,
    );
    history.apply(&Job::FilterUnknownCases).unwrap();
    history.apply(&Job::FilterCasesByType).unwrap();
    let paths: Vec<String> = history.checkouts[0]
        .test_cases()
        .map(|tc| tc.raw_path.clone())
        .collect();
    assert_eq!(paths, vec!["a.c", "b.sh"]);
}

#[test]
fn test_filter_always_failing_drops_never_passed() {
    let mut history = CiHistory::new(
        vec![
            checkout(
                "a",
                1,
                vec![build(
                    "gcc",
                    "C=y",
                    vec![case("flaky.c", TestStatus::Fail), case("red.c", TestStatus::Fail)],
                )],
            ),
            checkout(
                "b",
                2,
                vec![build(
                    "gcc",
                    "C=y",
                    vec![case("flaky.c", TestStatus::Pass), case("red.c", TestStatus::Fail)],
                )],
            ),
        ],
        2,
    );
    history.apply(&Job::FilterAlwaysFailingCases).unwrap();
    for co in &history.checkouts {
        assert!(co.case_by_file_path(&PathBuf::from("red.c")).is_none());
        assert!(co.case_by_file_path(&PathBuf::from("flaky.c")).is_some());
    }
}

#[test]
fn test_filter_small_branches() {
    let mut history = CiHistory::new(
        vec![
            checkout(
                "big",
                1,
                vec![build(
                    "gcc",
                    "C=y",
                    vec![
                        case("a.c", TestStatus::Pass),
                        case("b.c", TestStatus::Pass),
                        case("c.c", TestStatus::Pass),
                    ],
                )],
            ),
            checkout(
                "small",
                2,
                vec![build("gcc", "C=y", vec![case("a.c", TestStatus::Pass)])],
            ),
        ],
        1,
    );
    history
        .apply(&Job::FilterSmallBranches { min_cases: 2 })
        .unwrap();
    assert_eq!(history.checkouts.len(), 1);
    assert_eq!(history.checkouts[0].git_sha, "big");
}

#[test]
fn test_filter_recurring_failures_keeps_first_of_streak() {
    let mut history = CiHistory::new(
        vec![
            checkout(
                "a",
                1,
                vec![build("gcc", "C=y", vec![case("x.c", TestStatus::Fail)])],
            ),
            checkout(
                "b",
                2,
                vec![build("gcc", "C=y", vec![case("x.c", TestStatus::Fail)])],
            ),
            checkout(
                "c",
                3,
                vec![build("gcc", "C=y", vec![case("x.c", TestStatus::Pass)])],
            ),
            checkout(
                "d",
                4,
                vec![build("gcc", "C=y", vec![case("x.c", TestStatus::Fail)])],
            ),
        ],
        1,
    );
    history.apply(&Job::FilterRecurringFailures).unwrap();
    let counts: Vec<usize> = history.checkouts.iter().map(Checkout::case_count).collect();
    // First failure kept, repeat dropped, pass resets, new failure kept.
    assert_eq!(counts, vec![1, 0, 1, 1]);
}

#[test]
fn test_choose_canonical_build_selects_largest_average() {
    let mut history = CiHistory::new(
        vec![
            checkout(
                "a",
                1,
                vec![
                    build(
                        "defconfig",
                        "A=y",
                        vec![case("a.c", TestStatus::Pass), case("b.c", TestStatus::Pass)],
                    ),
                    build("tiny", "T=y", vec![case("a.c", TestStatus::Pass)]),
                ],
            ),
            checkout(
                "b",
                2,
                vec![build(
                    "defconfig-renamed",
                    "A=y",
                    vec![case("a.c", TestStatus::Pass), case("b.c", TestStatus::Fail)],
                )],
            ),
        ],
        1,
    );
    history.apply(&Job::ChooseCanonicalBuild).unwrap();
    // Renamed build carries the first-seen canonical label and survives.
    assert_eq!(history.checkouts[1].builds.len(), 1);
    assert_eq!(history.checkouts[1].builds[0].label(), "defconfig");
    assert!(history.checkouts[0]
        .builds
        .iter()
        .all(|b| b.label() == "defconfig"));
}

#[test]
fn test_default_reduction_smoke() {
    let mut history = CiHistory::new(
        vec![
            checkout(
                "b",
                2,
                vec![build(
                    "gcc",
                    "A=y",
                    vec![
                        case("a.c", TestStatus::Pass),
                        case("b.c", TestStatus::Fail),
                        case("a.c", TestStatus::Pass),
                    ],
                )],
            ),
            checkout(
                "a",
                1,
                vec![build(
                    "gcc",
                    "A=y",
                    vec![case("a.c", TestStatus::Pass), case("b.c", TestStatus::Pass)],
                )],
            ),
        ],
        2,
    );
    let jobs = CiHistory::default_reduction(1);
    history.run(&jobs).unwrap();
    assert_eq!(history.checkouts.len(), 2);
    assert_eq!(history.checkouts[0].git_sha, "a");
    assert_eq!(history.checkouts[0].case_count(), 2);
    assert_eq!(history.checkouts[1].case_count(), 2);
}
