//! CLI contract tests
//!
//! Drives the compiled binary against a scratch database directory, so
//! `build` and the read commands run as separate processes.

use std::path::Path;
use std::process::Command;

fn kubegraph_bin() -> String {
    env!("CARGO_BIN_EXE_kubegraph").to_string()
}

fn write_snapshot(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("snapshot.json");
    std::fs::write(
        &path,
        r#"{
  "namespaces": [{"name": "prod", "uid": "1", "created": "2024-01-01T00:00:00Z", "labels": {}}],
  "pods": [
    {"name": "api-0", "namespace": "prod", "labels": {"app": "api"}, "service_account": "api",
     "containers": [{"name": "api", "image": "api:1", "privileged": true}]},
    {"name": "not-a-pod"}
  ],
  "services": [{"name": "api", "namespace": "prod", "labels": {"app": "api"}, "type": "LoadBalancer"}],
  "deployments": [{"name": "api", "namespace": "prod", "selector": {"app": "api"}}],
  "cluster_roles": [{"name": "admin", "rules": [{"verbs": ["*"], "resources": ["*"]}]}]
}"#,
    )
    .unwrap();
    path
}

/// Run kubegraph with an isolated config and database
fn run(dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(kubegraph_bin())
        .current_dir(dir)
        .env_remove("KUBEGRAPH_DB_PATH")
        .env_remove("KUBEGRAPH_QUERY_TIMEOUT_SECS")
        .env_remove("RUST_LOG")
        .arg("--db")
        .arg(dir.join("db"))
        .args(args)
        .output()
        .expect("Failed to run kubegraph");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn run_json(dir: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = args.to_vec();
    full.extend(["--format", "json"]);
    let (code, stdout, stderr) = run(dir, &full);
    assert_eq!(code, 0, "kubegraph {:?} failed: {}", args, stderr);
    serde_json::from_str(&stdout).expect("Invalid JSON")
}

#[test]
fn test_build_then_query_across_processes() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());

    let build = run_json(dir.path(), &["build", snapshot.to_str().unwrap()]);
    assert_eq!(build["success"], true);
    assert_eq!(build["data"]["vertices"]["Pod"], 1);
    assert_eq!(build["data"]["high_risk_pods"], 1);

    let stats = run_json(dir.path(), &["stats"]);
    // namespace, pod, service, deployment, role
    assert_eq!(stats["data"]["total_vertices"], 5);
    // contains x3, exposes, manages, potential_escalation
    assert_eq!(stats["data"]["total_edges"], 6);

    let risk = run_json(dir.path(), &["risk"]);
    assert_eq!(risk["data"]["privileged_pod_count"], 1);
    assert_eq!(risk["data"]["exposed_service_count"], 1);
    let factors = risk["data"]["risk_factors"].as_array().unwrap();
    assert_eq!(factors.len(), 3);
    assert_eq!(factors.last().unwrap()["factor"], "exposed_services");

    let paths = run_json(
        dir.path(),
        &["paths", "--source", "Service", "--target", "ClusterRole", "--max-depth", "3"],
    );
    let found = paths["data"]["paths"].as_array().unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0][0]["type"], "vertex");
    assert_eq!(found[0][1]["label"], "exposes");
}

#[test]
fn test_invalid_depth_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(dir.path(), &["paths", "--max-depth", "deep"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("max_depth"), "stderr: {}", stderr);

    let (code, stdout, _) = run(dir.path(), &["paths", "--max-depth", "99", "--format", "json"]);
    assert_ne!(code, 0);
    let response: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(response["success"], false);
}

#[test]
fn test_unopenable_store_exits_non_zero() {
    let dir = tempfile::tempdir().unwrap();
    // A plain file where the database directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "not a directory").unwrap();

    let output = Command::new(kubegraph_bin())
        .current_dir(dir.path())
        .arg("--db")
        .arg(&blocker)
        .arg("stats")
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Cannot open graph store"), "stderr: {}", stderr);
}

#[test]
fn test_init_writes_config() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(dir.path(), &["init"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("kubegraph.toml"));

    let written = std::fs::read_to_string(dir.path().join("kubegraph.toml")).unwrap();
    assert!(written.contains("[analysis]"));

    // the written config is picked up by later commands
    let status = run_json(dir.path(), &["status"]);
    assert_eq!(status["health"]["store_reachable"], true);
}

#[test]
fn test_viz_writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path());
    run_json(dir.path(), &["build", snapshot.to_str().unwrap()]);

    let out = dir.path().join("viz.json");
    let (code, _, stderr) = run(
        dir.path(),
        &["viz", "--namespace", "prod", "-o", out.to_str().unwrap()],
    );
    assert_eq!(code, 0, "{}", stderr);

    let viz: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    // namespace-scoped: pod, service, deployment
    assert_eq!(viz["statistics"]["node_count"], 3);
    assert!(viz["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .all(|n| n["namespace"] == "prod"));
}
