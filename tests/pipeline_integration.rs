//! End-to-end normalization over synthetic checkout records.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use priorizar::pipeline::CiHistory;
use priorizar::record::load_checkouts;

fn checkout_json(sha: &str, time: &str, tests: &[(&str, &str)]) -> String {
    let tests_json: Vec<String> = tests
        .iter()
        .enumerate()
        .map(|(i, (path, status))| {
            format!(
                r#"{{"id": "t{i}", "path": "{path}", "file_path": "{path}", "status": "{status}", "has_known_issues": false}}"#
            )
        })
        .collect();
    format!(
        r#"{{
  "git_sha": "{sha}",
  "git_repo_branch": "master",
  "status": "done",
  "git_commit_datetime": "{time}",
  "builds": [
    {{
      "build_name": "defconfig",
      "kconfig": "CONFIG_A=y CONFIG_B=y",
      "arch": "x86_64",
      "duration": 120.5,
      "testruns": [{{"id": "r1", "tests": [{}]}}]
    }}
  ]
}}"#,
        tests_json.join(", ")
    )
}

#[test]
fn test_ingest_and_default_reduction() {
    let dir = TempDir::new().unwrap();
    // Named so lexical order disagrees with commit order.
    fs::write(
        dir.path().join("01-newer.json"),
        checkout_json(
            "bbb",
            "2024-02-01T00:00:00Z",
            &[("a.c", "fail"), ("b.c", "pass"), ("a.c", "pass")],
        ),
    )
    .unwrap();
    fs::write(
        dir.path().join("02-older.json"),
        checkout_json(
            "aaa",
            "2024-01-01T00:00:00Z",
            &[("a.c", "pass"), ("b.c", "fail")],
        ),
    )
    .unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    fs::write(dir.path().join("ignored.txt"), "not a record").unwrap();

    let checkouts = load_checkouts(dir.path()).unwrap();
    assert_eq!(checkouts.len(), 2);

    let mut history = CiHistory::new(checkouts, 2);
    history.run(&CiHistory::default_reduction(1)).unwrap();

    assert_eq!(history.checkouts.len(), 2);
    assert_eq!(history.checkouts[0].git_sha, "aaa");
    assert_eq!(history.checkouts[1].git_sha, "bbb");

    // The duplicate a.c observations merged; any pass wins.
    let newer = &history.checkouts[1];
    assert_eq!(newer.case_count(), 2);
    assert!(newer
        .case_by_file_path(&PathBuf::from("a.c"))
        .unwrap()
        .is_pass());
}

#[test]
fn test_recurring_failure_suppressed_across_checkouts() {
    let dir = TempDir::new().unwrap();
    for (name, sha, time, status) in [
        ("1.json", "aaa", "2024-01-01T00:00:00Z", "fail"),
        ("2.json", "bbb", "2024-01-02T00:00:00Z", "fail"),
    ] {
        fs::write(
            dir.path().join(name),
            checkout_json(sha, time, &[("x.c", status), ("y.c", "pass")]),
        )
        .unwrap();
    }

    let mut history = CiHistory::new(load_checkouts(dir.path()).unwrap(), 1);
    history.run(&CiHistory::default_reduction(1)).unwrap();

    let failing: Vec<&str> = history
        .checkouts
        .iter()
        .flat_map(|c| c.test_cases())
        .filter(|tc| tc.is_failed())
        .map(|tc| tc.raw_path.as_str())
        .collect();
    // Only the first checkout of the streak charges the x.c failure.
    assert_eq!(failing, vec!["x.c"]);
    assert!(history.checkouts[1]
        .case_by_file_path(&PathBuf::from("x.c"))
        .is_none());
}
