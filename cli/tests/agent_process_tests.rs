// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tests against the real `widthswarm-agent` and `widthswarm` binaries.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use widthswarm::ProcessLauncher;
use widthswarm_core::geometry::Position;
use widthswarm_core::record::ExitGeometry;
use widthswarm_core::swarm_config::SwarmSpec;
use widthswarm_swarm::{SharedArena, SwarmOrchestrator, ThreadLauncher};

fn agent_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_widthswarm-agent"))
}

fn unique_namespace() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("wst-cli-{}", &id[..12])
}

fn paired_spec(seed: u64) -> SwarmSpec {
    SwarmSpec {
        agents: 4,
        namespace: unique_namespace(),
        seed: Some(seed),
        window: Duration::from_millis(200),
        placements: vec![
            Position::new(5, 5),
            Position::new(7, 8),
            Position::new(60, 30),
            Position::new(62, 33),
        ],
        ..SwarmSpec::default()
    }
}

#[test]
fn test_agent_rejects_wrong_argument_count() {
    let status = Command::new(agent_bin())
        .args(["0", "10", "10"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));

    let status = Command::new(agent_bin())
        .args(["0", "10", "10", "4", "0", "extra"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_agent_rejects_out_of_range_settings() {
    let status = Command::new(agent_bin())
        .args(["0", "10", "10", "1", "4"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));

    let status = Command::new(agent_bin())
        .args(["0", "10", "10", "1", "0", "--radius=-1"])
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));

    let status = Command::new(agent_bin())
        .args(["0", "10", "10", "1", "0"])
        .env("WIDTHSWARM_RADIUS", "-3")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_agent_without_arena_exits_with_failure() {
    let status = Command::new(agent_bin())
        .args(["0", "10", "10", "1", "0"])
        .env("WIDTHSWARM_NAMESPACE", unique_namespace())
        .env("WIDTHSWARM_WINDOW_MS", "0")
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_and_thread_launchers_agree() {
    let by_process = SwarmOrchestrator::new(
        paired_spec(31),
        Arc::new(ProcessLauncher::new(agent_bin(), 0)),
    )
    .run()
    .await
    .unwrap();
    let in_process = SwarmOrchestrator::new(paired_spec(31), Arc::new(ThreadLauncher::new()))
        .run()
        .await
        .unwrap();

    assert!(by_process.failed_agents.is_empty());
    assert!(by_process.teardown_errors.is_empty());
    assert_eq!(by_process, in_process);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_process_run_cleans_up() {
    let spec = paired_spec(8);
    let namespace = spec.namespace.clone();
    SwarmOrchestrator::new(spec, Arc::new(ProcessLauncher::new(agent_bin(), 0)))
        .run()
        .await
        .unwrap();
    assert_eq!(SharedArena::purge(&namespace).unwrap(), 0);
}

#[test]
fn test_orchestrator_binary_prints_report() {
    let output = Command::new(env!("CARGO_BIN_EXE_widthswarm"))
        .args(["--agents", "3", "--seed", "4", "--window", "100ms"])
        .arg("--agent-bin")
        .arg(agent_bin())
        .env("WIDTHSWARM_NAMESPACE", unique_namespace())
        .env_remove("WIDTHSWARM_CONFIG_PATH")
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("True Width = "));
    assert!(stdout.contains("Estimated Width = "));
    assert!(stdout.contains("Difference = "));
}

#[test]
fn test_orchestrator_binary_needs_purge_after_a_crash() {
    let namespace = unique_namespace();
    let stale = ExitGeometry {
        width: 20,
        position: Position::new(99, 50),
    };
    drop(SharedArena::create(&namespace, 2, &stale).unwrap());

    let run = |purge: bool| {
        let mut command = Command::new(env!("CARGO_BIN_EXE_widthswarm"));
        command
            .args(["--agents", "2", "--seed", "9", "--window", "50ms"])
            .arg("--agent-bin")
            .arg(agent_bin())
            .env("WIDTHSWARM_NAMESPACE", &namespace)
            .env_remove("WIDTHSWARM_CONFIG_PATH");
        if purge {
            command.arg("--purge");
        }
        command.output().unwrap()
    };

    let refused = run(false);
    assert!(!refused.status.success());
    assert!(String::from_utf8_lossy(&refused.stderr).contains("already exists"));

    let purged = run(true);
    assert!(purged.status.success(), "{}", String::from_utf8_lossy(&purged.stderr));
    assert_eq!(SharedArena::purge(&namespace).unwrap(), 0);
}

#[test]
fn test_generated_config_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("widthswarm.yaml");

    let generate = Command::new(env!("CARGO_BIN_EXE_widthswarm"))
        .args(["config", "generate", "--output"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(generate.success());
    assert!(path.is_file());

    let validate = Command::new(env!("CARGO_BIN_EXE_widthswarm"))
        .args(["config", "validate"])
        .arg(&path)
        .status()
        .unwrap();
    assert!(validate.success());
}
