use std::fs;
use std::io::Write;
use std::path::Path;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use bench_results::config::{FileConnectorConfig, FileReporterConfig, WritePolicy};
use bench_results::connectors::FileConnector;
use bench_results::reporting::{Capability, FileReporter};
use bench_results::{dispatch, ReportError, Session, WorkerPool};

fn session_json() -> Value {
    json!({
        "stages": [
            {
                "summary": {"stage": "setup", "stage_type": "setup", "total_elapsed": 0.5}
            },
            {
                "summary": {
                    "stage": "execute_a",
                    "total_elapsed": 2.0,
                    "batch_size": 2,
                    "custom_metrics": [
                        {"name": "cache_hits", "value": 42.0, "metric_type": "COUNT"}
                    ],
                    "monitors": [
                        {
                            "stage": "execute_a",
                            "name": "worker",
                            "group": "memory",
                            "samples": [2097152.0, 4194304.0],
                            "visibility": true
                        },
                        {"stage": "execute_a", "name": "worker", "group": "cpu", "samples": [10.0, 30.0]}
                    ],
                    "experiment": {
                        "experiment": {"name": "checkout", "randomized": true},
                        "variant": {
                            "name": "control",
                            "weight": 0.5,
                            "mutations": [
                                {"name": "slow", "chance": 0.1, "targets": ["login"], "mutation_type": "delay"}
                            ]
                        }
                    }
                },
                "actions": [
                    {
                        "name": "login",
                        "engine": "http",
                        "url": "http://api.local/login",
                        "method": "POST",
                        "tags": [{"name": "service", "value": "auth"}]
                    },
                    {"name": "search", "engine": "http", "url": "http://api.local/search"}
                ],
                "workers": [
                    {
                        "worker": 0,
                        "results": [
                            {"name": "login", "type": "http", "timings": {"total": 0.1}},
                            {"name": "login", "type": "http", "timings": {"total": 0.2}},
                            {"name": "search", "type": "http", "error": "timeout", "timings": {"total": 0.3}}
                        ],
                        "streams": [{"completed": 3, "succeeded": 2, "failed": 1, "batch_elapsed": 1.0}]
                    },
                    {
                        "worker": 1,
                        "results": [
                            {"name": "login", "type": "http", "timings": {"total": 0.4}}
                        ],
                        "streams": [{"completed": 2, "succeeded": 2, "failed": 0, "batch_elapsed": 1.0}]
                    }
                ]
            },
            {
                "summary": {
                    "stage": "execute_b",
                    "total_elapsed": 1.0,
                    "batch_size": 1,
                    "experiment": {
                        "experiment": {"name": "checkout", "randomized": true},
                        "variant": {"name": "treatment", "weight": 0.5}
                    }
                },
                "workers": [
                    {
                        "worker": 0,
                        "results": [
                            {"name": "login", "type": "http", "timings": {"total": 0.2}},
                            {"name": "login", "type": "http", "timings": {"total": 0.2}}
                        ]
                    }
                ]
            }
        ]
    })
}

fn write_session(dir: &Path, session: &Value) -> std::path::PathBuf {
    let path = dir.join("session.json");
    let mut file = fs::File::create(&path).unwrap();
    file.write_all(session.to_string().as_bytes()).unwrap();
    path
}

fn read_rows(path: &Path) -> Vec<Value> {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

fn connector(path: std::path::PathBuf, pool: &WorkerPool) -> FileConnector {
    FileConnector::new(FileConnectorConfig { path }, pool.clone())
}

#[tokio::test]
async fn test_session_to_json_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_session(dir.path(), &session_json());
    let output = dir.path().join("results");
    let pool = WorkerPool::new(2);

    let report = Session::collect(&mut connector(input, &pool)).await.unwrap();

    // ── Stage summaries ─────────────────────────────────────────
    let stages: Vec<&str> = report.summaries.iter().map(|s| s.stage.as_str()).collect();
    assert_eq!(stages, vec!["setup", "execute_a", "execute_b"]);

    let setup = &report.summaries[0];
    assert_eq!(setup.total, 0);
    assert!(setup.streamed_completed.is_empty());

    let execute_a = &report.summaries[1];
    assert_eq!(execute_a.total, 4);
    assert_eq!(execute_a.succeeded, 3);
    assert_eq!(execute_a.failed, 1);
    assert_eq!(execute_a.actions_per_second, 2.0);
    // workers over-reported one completed, one succeeded
    assert_eq!(execute_a.streamed_completed, vec![4]);
    assert_eq!(execute_a.streamed_succeeded, vec![3]);
    assert_eq!(execute_a.streamed_failed, vec![1]);

    assert_eq!(report.payload.events.len(), 6);
    assert_eq!(report.payload.metrics_sets.len(), 3);
    assert!(report.payload.streams.contains_key("execute_a"));
    assert!(!report.payload.streams.contains_key("execute_b"));

    let login = report
        .payload
        .metrics_sets
        .iter()
        .find(|set| set.stage == "execute_a" && set.name == "login")
        .unwrap();
    assert_eq!(login.common_stats.total, 3);
    assert_eq!(login.common_stats.actions_per_second, 1.5);
    assert_eq!(login.tags.len(), 1);

    // ── Fan-out ─────────────────────────────────────────────────
    let mut reporter = FileReporter::new(
        FileReporterConfig {
            directory: output.clone(),
            policy: WritePolicy::Overwrite,
        },
        pool.clone(),
    );
    let dispatched = dispatch(&mut reporter, &report.payload, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(dispatched.submitted, Capability::ALL.to_vec());
    assert!(dispatched.skipped.is_empty());

    let shared = read_rows(&output.join("shared.json"));
    assert_eq!(shared.len(), 3);
    let search = shared
        .iter()
        .find(|row| row["name"] == "search")
        .unwrap();
    assert_eq!(search["group"], "common");
    assert_eq!(search["failed"], 1);
    assert_eq!(search["actions_per_second"], 0.5);

    let metrics = read_rows(&output.join("metrics.json"));
    assert!(metrics.iter().any(|row| row["name"] == "login" && row["group"] == "total"));

    let custom = read_rows(&output.join("custom.json"));
    assert!(!custom.is_empty());
    assert!(custom.iter().all(|row| row["stage"] == "execute_a"));
    assert_eq!(custom[0]["cache_hits"], json!(42));

    let errors = read_rows(&output.join("errors.json"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["error_message"], "timeout");
    assert_eq!(errors[0]["error_count"], 1);

    let events = read_rows(&output.join("events.json"));
    assert_eq!(events.len(), 6);

    let experiments = read_rows(&output.join("experiments.json"));
    assert_eq!(experiments.len(), 1);
    assert_eq!(experiments[0]["experiment_name"], "checkout");
    assert_eq!(experiments[0]["experiment_completed"], 6);
    assert_eq!(experiments[0]["experiment_median_aps"], 2.0);

    let variants = read_rows(&output.join("variants.json"));
    let control = variants
        .iter()
        .find(|row| row["variant_name"] == "control")
        .unwrap();
    assert_eq!(control["variant_completed"], 4);
    assert_eq!(control["variant_ratio_completed"], 0.67);

    let mutations = read_rows(&output.join("mutations.json"));
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0]["mutation_variant_name"], "control");

    let stage_system = read_rows(&output.join("stage_system_metrics.json"));
    let per_vu = stage_system
        .iter()
        .find(|row| row["name"] == "worker_mb_per_vu")
        .unwrap();
    // 2 MiB and 4 MiB over two VUs
    assert_eq!(per_vu["mean"], 1.5);

    let session_system = read_rows(&output.join("session_system_metrics.json"));
    assert_eq!(session_system.len(), 2);
    assert!(session_system.iter().all(|row| row.get("stage").is_none()));
}

#[tokio::test]
async fn test_append_policy_writes_json_lines() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_session(dir.path(), &session_json());
    let output = dir.path().join("results");
    let pool = WorkerPool::new(1);

    let report = Session::collect(&mut connector(input, &pool)).await.unwrap();
    let mut reporter = FileReporter::new(
        FileReporterConfig {
            directory: output.clone(),
            policy: WritePolicy::Append,
        },
        pool.clone(),
    );

    for _ in 0..2 {
        dispatch(&mut reporter, &report.payload, &CancellationToken::new())
            .await
            .unwrap();
    }

    let lines = fs::read_to_string(output.join("errors.json")).unwrap();
    let rows: Vec<Value> = lines
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|row| row["error_message"] == "timeout"));
}

#[tokio::test]
async fn test_cancelled_dispatch_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_session(dir.path(), &session_json());
    let output = dir.path().join("results");
    let pool = WorkerPool::new(1);

    let report = Session::collect(&mut connector(input, &pool)).await.unwrap();
    let mut reporter = FileReporter::new(
        FileReporterConfig {
            directory: output.clone(),
            policy: WritePolicy::Overwrite,
        },
        pool.clone(),
    );

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = dispatch(&mut reporter, &report.payload, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Cancelled(_)));
    assert!(!output.join("events.json").exists());
}

#[tokio::test]
async fn test_zero_elapsed_stage_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = json!({
        "stages": [{
            "summary": {"stage": "execute", "total_elapsed": 0.0},
            "workers": [{"worker": 0, "results": [{"name": "login", "type": "http", "timings": {"total": 0.1}}]}]
        }]
    });
    let input = write_session(dir.path(), &session);
    let pool = WorkerPool::new(1);

    let err = Session::collect(&mut connector(input, &pool)).await.unwrap_err();
    assert!(matches!(err, ReportError::InvariantViolation(_)));
}

#[tokio::test]
async fn test_results_without_identity_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let session = json!({
        "stages": [{
            "summary": {"stage": "execute", "total_elapsed": 1.0},
            "workers": [{"worker": 0, "results": [{"type": "http", "timings": {"total": 0.1}}]}]
        }]
    });
    let input = write_session(dir.path(), &session);
    let pool = WorkerPool::new(1);

    let err = Session::collect(&mut connector(input, &pool)).await.unwrap_err();
    assert!(matches!(err, ReportError::InvalidInput(_)));
}
