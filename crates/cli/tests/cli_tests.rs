//! CLI integration tests using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PATH: &str = "01J0000000000000000000PATH";
const INTRO: &str = "01J0000000000000000000MDA1";
const TOOLS: &str = "01J0000000000000000000MDB2";
const REVIEW: &str = "01J0000000000000000000MDC3";

fn catalog() -> serde_json::Value {
    serde_json::json!({
        "paths": [{
            "id": PATH,
            "name": "Warehouse onboarding",
            "capstone": {
                "title": "Final check",
                "questions": [
                    { "prompt": "Lift with?", "options": ["back", "legs"], "correct_index": 1 },
                    { "prompt": "Helmet?", "options": ["no", "yes"], "correct_index": 1 }
                ],
                "passing_score": 50,
                "max_attempts": 2
            }
        }],
        "modules": [
            { "id": INTRO, "path_id": PATH, "title": "Intro", "order_index": 1 },
            { "id": TOOLS, "path_id": PATH, "title": "Tools", "order_index": 2 },
            {
                "id": REVIEW,
                "path_id": PATH,
                "title": "Review",
                "order_index": 3,
                "quiz": { "questions": [
                    { "prompt": "Exit?", "options": ["left", "right", "up"], "correct_index": 1 },
                    { "prompt": "Badge?", "options": ["always", "never"], "correct_index": 0 }
                ]}
            }
        ]
    })
}

/// Temp workspace with the catalog already imported.
fn workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("catalog.json");
    std::fs::write(&file, catalog().to_string()).unwrap();
    trainpath(&dir)
        .arg("import")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 1 paths, 3 modules"));
    dir
}

fn trainpath(dir: &TempDir) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("trainpath").unwrap();
    cmd.current_dir(dir.path())
        .arg("--data")
        .arg(dir.path().join("data"))
        .env("TRAINPATH_LOG", "warn");
    cmd
}

fn as_learner(dir: &TempDir, args: &[&str]) -> assert_cmd::assert::Assert {
    trainpath(dir).args(["--learner", "emp-1"]).args(args).assert()
}

#[test]
fn paths_lists_imported_catalog() {
    let dir = workspace();
    trainpath(&dir)
        .arg("paths")
        .assert()
        .success()
        .stdout(predicate::str::contains("Warehouse onboarding"))
        .stdout(predicate::str::contains("3 modules + capstone"));
}

#[test]
fn fresh_learner_sees_only_first_module_open() {
    let dir = workspace();
    as_learner(&dir, &["access", PATH])
        .success()
        .stdout(predicate::str::contains("[OPEN  ] 1. Intro"))
        .stdout(predicate::str::contains("[LOCKED] 2. Tools"))
        .stdout(predicate::str::contains("Complete 'Intro' first"));
}

#[test]
fn locked_module_cannot_be_opened() {
    let dir = workspace();
    as_learner(&dir, &["view", TOOLS])
        .failure()
        .stderr(predicate::str::contains("is locked: Complete 'Intro' first"));
}

#[test]
fn completing_a_module_unlocks_the_next() {
    let dir = workspace();
    as_learner(&dir, &["view", INTRO])
        .success()
        .stdout(predicate::str::contains("IN PROGRESS"));
    as_learner(&dir, &["complete", INTRO])
        .success()
        .stdout(predicate::str::contains("COMPLETED"));

    as_learner(&dir, &["access", PATH])
        .success()
        .stdout(predicate::str::contains("[DONE  ] 1. Intro"))
        .stdout(predicate::str::contains("[OPEN  ] 2. Tools"));
    as_learner(&dir, &["summary", PATH])
        .success()
        .stdout(predicate::str::contains("Progress: 1/3 modules (33%)"));
}

#[test]
fn progress_is_per_learner() {
    let dir = workspace();
    as_learner(&dir, &["complete", INTRO]).success();
    trainpath(&dir)
        .args(["--learner", "emp-2", "access", PATH])
        .assert()
        .success()
        .stdout(predicate::str::contains("[LOCKED] 2. Tools"));
}

#[test]
fn quiz_module_completes_through_quiz_only() {
    let dir = workspace();
    as_learner(&dir, &["complete", INTRO]).success();
    as_learner(&dir, &["complete", TOOLS]).success();

    as_learner(&dir, &["complete", REVIEW])
        .failure()
        .stderr(predicate::str::contains("has a quiz"));
    as_learner(&dir, &["quiz", REVIEW, "--answers", "1,1"])
        .success()
        .stdout(predicate::str::contains("Score: 50% (1/2) - not passed"));
    as_learner(&dir, &["quiz", REVIEW, "--answers", "1,0"])
        .success()
        .stdout(predicate::str::contains("Score: 100% (2/2) - passed"))
        .stdout(predicate::str::contains("COMPLETED (attempt 2)"));

    as_learner(&dir, &["summary", PATH])
        .success()
        .stdout(predicate::str::contains("Progress: 3/3 modules (100%)"))
        .stdout(predicate::str::contains("All modules complete"));
}

#[test]
fn passing_score_comes_from_config_file() {
    let dir = workspace();
    std::fs::write(dir.path().join("trainpath.toml"), "module_passing_score = 50\n").unwrap();
    as_learner(&dir, &["complete", INTRO]).success();
    as_learner(&dir, &["complete", TOOLS]).success();

    as_learner(&dir, &["quiz", REVIEW, "--answers", "1,_"])
        .success()
        .stdout(predicate::str::contains("- passed"));
}

#[test]
fn capstone_is_gated_on_modules() {
    let dir = workspace();
    as_learner(&dir, &["capstone", PATH])
        .success()
        .stdout(predicate::str::contains("Locked until every module is complete (0/3)"));
    as_learner(&dir, &["capstone", PATH, "--answers", "1,1"])
        .failure()
        .stderr(predicate::str::contains("Capstone not available"));

    as_learner(&dir, &["complete", INTRO]).success();
    as_learner(&dir, &["complete", TOOLS]).success();
    as_learner(&dir, &["quiz", REVIEW, "--answers", "1,0"]).success();

    as_learner(&dir, &["capstone", PATH])
        .success()
        .stdout(predicate::str::contains("Open, 2 attempts remaining"));
    as_learner(&dir, &["capstone", PATH, "--answers", "0,0"])
        .success()
        .stdout(predicate::str::contains("not passed"))
        .stdout(predicate::str::contains("Attempts remaining: 1"));
    as_learner(&dir, &["capstone", PATH, "--answers", "1,1"])
        .success()
        .stdout(predicate::str::contains("Score: 100% (2/2) - passed"));
    as_learner(&dir, &["capstone", PATH])
        .success()
        .stdout(predicate::str::contains("Passed with 100%"));
}

#[test]
fn reset_relocks_following_modules() {
    let dir = workspace();
    as_learner(&dir, &["complete", INTRO]).success();
    as_learner(&dir, &["reset", INTRO])
        .success()
        .stdout(predicate::str::contains("NOT STARTED"));
    as_learner(&dir, &["access", PATH])
        .success()
        .stdout(predicate::str::contains("[LOCKED] 2. Tools"));
}

#[test]
fn learner_is_required() {
    let dir = workspace();
    trainpath(&dir)
        .args(["access", PATH])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--learner is required"));
}

#[test]
fn unknown_path_is_reported() {
    let dir = workspace();
    as_learner(&dir, &["access", "01J00000000000000000000000"])
        .failure()
        .stderr(predicate::str::contains("training path not found"));
    as_learner(&dir, &["access", "not-an-id"])
        .failure()
        .stderr(predicate::str::contains("Invalid path ID"));
}

#[test]
fn invalid_catalog_is_rejected() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("bad.json");
    std::fs::write(&file, "{ not json").unwrap();
    trainpath(&dir)
        .arg("import")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("parsing"));
}
