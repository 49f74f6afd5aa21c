use assert_cmd::Command;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn run_cli_raw(workdir: &Path, args: &[&str]) -> (bool, Value) {
    let output = Command::cargo_bin("jobmatch")
        .expect("binary")
        .current_dir(workdir)
        .env_remove("RUST_LOG")
        .args(["--config", "jobmatch.toml", "--quiet"])
        .args(args)
        .output()
        .expect("command run");

    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    (output.status.success(), body)
}

fn run_cli(workdir: &Path, args: &[&str]) -> Value {
    let (ok, body) = run_cli_raw(workdir, args);
    assert!(ok, "args: {args:?}\nstdout: {body}");
    assert_eq!(body["status"], "ok");
    body["data"].clone()
}

fn setup_workspace() -> tempfile::TempDir {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(
        root.join("jobmatch.toml"),
        "[store]\nembedding_dimension = 4\n\n[ingest]\nretention_window_months = 3\n",
    )
    .unwrap();
    fs::write(
        root.join("anchors.jsonl"),
        r#"{"job_title": "Data Engineer", "category": "Engineering", "embedding": [1.0, 0.0, 0.0, 0.0], "keywords": ["spark", "sql"]}
{"job_title": "Backend Engineer", "category": "Engineering", "embedding": [0.0, 1.0, 0.0, 0.0]}
"#,
    )
    .unwrap();
    fs::write(
        root.join("postings.jsonl"),
        r#"{"job_id": "j1", "title": "Data Engineer", "category": "Data Engineer", "embedding": [1.0, 0.02, 0.0, 0.01], "metadata": {"skills": ["sql", "airflow"]}}
{"job_id": "j2", "title": "Backend Engineer", "category": "Backend Engineer", "embedding": [0.02, 1.0, 0.01, 0.0], "metadata": {"skills": ["go"]}}
{"job_id": "j3", "title": "Broken", "category": "Data Engineer", "embedding": [1.0, 0.0, 0.0]}
"#,
    )
    .unwrap();
    fs::write(root.join("query.json"), "[0.99, 0.01, 0.0, 0.0]").unwrap();
    temp
}

#[test]
fn ingest_rebuild_match_and_status() {
    let temp = setup_workspace();
    let root = temp.path();

    let anchors = run_cli(root, &["ingest-anchors", "anchors.jsonl", "--rebuild"]);
    assert_eq!(anchors["report"]["committed"], 2);
    assert_eq!(anchors["rebuild"]["status"], "published");

    let postings = run_cli(
        root,
        &["ingest-postings", "postings.jsonl", "--month", "2026-01"],
    );
    assert_eq!(postings["report"]["committed"], 2);
    assert_eq!(postings["report"]["failed"].as_array().unwrap().len(), 1);
    assert_eq!(postings["report"]["failed"][0]["key"], "j3");
    assert!(postings["rebuild"].is_null());

    let rebuilt = run_cli(root, &["rebuild"]);
    assert_eq!(rebuilt[0]["status"], "unchanged");
    assert_eq!(rebuilt[1]["status"], "published");
    assert_eq!(rebuilt[1]["version"], 1);

    let matched = run_cli(
        root,
        &[
            "match",
            "query.json",
            "--top-categories",
            "1",
            "--top-jobs",
            "1",
            "--global-top",
            "1",
        ],
    );
    let results = matched["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["posting"]["job_id"], "j1");
    assert!(results[0]["explanation"]
        .as_str()
        .unwrap()
        .starts_with("matched because of category Data Engineer at"));

    let status = run_cli(root, &["status"]);
    assert_eq!(status["embedding_dimension"], 4);
    assert_eq!(status["partitions"]["2026-01"], 2);
    for collection in status["collections"].as_array().unwrap() {
        assert_eq!(collection["stale"], false);
        assert_eq!(collection["snapshot_version"], 1);
    }
    assert_eq!(status["health"]["snapshot_version"], 1);
}

#[test]
fn match_before_any_rebuild_reports_empty_collection() {
    let temp = setup_workspace();
    let root = temp.path();

    let (ok, body) = run_cli_raw(root, &["match", "query.json"]);
    assert!(!ok);
    assert_eq!(body["status"], "error");
    assert_eq!(body["command"], "match");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Collection anchors is empty"));
}

#[test]
fn drift_record_then_compare_needs_two_cycles() {
    let temp = setup_workspace();
    let root = temp.path();

    run_cli(
        root,
        &["ingest-postings", "postings.jsonl", "--month", "2026-01", "--rebuild"],
    );
    let recorded = run_cli(root, &["drift", "record", "--month", "2026-01"]);
    assert_eq!(recorded["postings"], 2);
    assert_eq!(
        recorded["recorded"],
        serde_json::json!(["Backend Engineer", "Data Engineer"])
    );

    let (ok, body) = run_cli_raw(
        root,
        &[
            "drift",
            "compare",
            "--category",
            "Data Engineer",
            "--from",
            "2026-01",
            "--to",
            "2026-02",
        ],
    );
    assert!(!ok);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("at least two are needed"));

    let distribution = run_cli(root, &["drift", "distribution"]);
    assert_eq!(distribution["total"], 2);
    assert_eq!(distribution["categories"][0]["priority"], "Low");
}

#[test]
fn retire_drops_partitions_outside_the_window() {
    let temp = setup_workspace();
    let root = temp.path();

    run_cli(
        root,
        &["ingest-postings", "postings.jsonl", "--month", "2025-11", "--rebuild"],
    );
    let retired = run_cli(root, &["retire", "--month", "2026-03"]);
    assert_eq!(retired["window_months"], 3);
    assert_eq!(retired["retired"]["2025-11"], 2);
    assert_eq!(retired["rebuild"]["status"], "published");
    assert_eq!(retired["rebuild"]["records"], 0);

    let rolled_back = run_cli(root, &["rollback", "postings"]);
    assert_eq!(rolled_back["version"], 1);
}

#[test]
fn invalid_config_is_rejected() {
    let temp = setup_workspace();
    let root = temp.path();
    fs::write(root.join("jobmatch.toml"), "[matcher]\ntop_categories = 0\n").unwrap();

    let (ok, body) = run_cli_raw(root, &["status"]);
    assert!(!ok);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Invalid [matcher] section"));
}

#[test]
#[allow(deprecated)]
fn missing_input_file_fails_with_error_envelope() {
    let temp = setup_workspace();
    Command::cargo_bin("jobmatch")
        .expect("binary")
        .current_dir(temp.path())
        .env_remove("RUST_LOG")
        .args(["--config", "jobmatch.toml", "--quiet"])
        .args(["ingest-anchors", "missing.jsonl"])
        .assert()
        .failure()
        .stdout(predicates::str::contains("\"status\":\"error\""))
        .stdout(predicates::str::contains("Failed to read missing.jsonl"));
}
