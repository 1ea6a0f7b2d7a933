#![cfg(unix)]

use launchdeck::config::TerminalSettings;
use launchdeck::process_manager::{InvocationDescriptor, TerminationOutcome};
use launchdeck::registry::{CommandOutcome, InstanceRegistry, RegistryCommand};
use launchdeck::terminal::{ProcessState, StopOutcome};
use launchdeck::tool::ToolKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn script(root: &Path, name: &str, body: &str) -> InvocationDescriptor {
    let path = root.join(format!("{name}.sh"));
    fs::write(&path, body).expect("write script");
    InvocationDescriptor::new(path, root)
}

#[test]
fn kill_all_terminates_dead_clean_and_stubborn_instances() {
    let root = temp_workspace("kill-all");
    let registry = InstanceRegistry::new(TerminalSettings {
        stop_grace: Duration::from_millis(400),
        ..TerminalSettings::default()
    });

    let dead = registry.create(ToolKind::TextGeneration);
    let clean = registry.create(ToolKind::Companion);
    let stubborn = registry.create(ToolKind::LocalLlm);
    registry
        .start(dead, script(&root, "dead", "echo bye\n"))
        .expect("start dead");
    registry
        .start(clean, script(&root, "clean", "while true; do sleep 0.1; done\n"))
        .expect("start clean");
    registry
        .start(
            stubborn,
            script(&root, "stubborn", "trap '' TERM\necho ready\nwhile true; do sleep 1; done\n"),
        )
        .expect("start stubborn");

    let dead_controller = registry.controller(dead).expect("dead controller");
    let deadline = Instant::now() + Duration::from_secs(5);
    while dead_controller.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!dead_controller.is_running());
    let stubborn_controller = registry.controller(stubborn).expect("stubborn controller");
    while stubborn_controller.line_count() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    let report = registry.kill_all();
    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(
        report.terminated,
        vec![
            (dead, StopOutcome::AlreadyStopped),
            (clean, StopOutcome::Terminated(TerminationOutcome::Graceful)),
            (stubborn, StopOutcome::Terminated(TerminationOutcome::Forced)),
        ]
    );
    assert!(registry
        .list()
        .iter()
        .all(|summary| summary.state == ProcessState::Stopped && summary.pid.is_none()));
    assert_eq!(registry.len(), 3);
}

#[test]
fn execute_routes_lifecycle_commands_for_real_processes() {
    let root = temp_workspace("execute");
    let registry = InstanceRegistry::new(TerminalSettings::default());
    let key = match registry
        .execute(RegistryCommand::Create(ToolKind::VoiceConversion))
        .expect("create")
    {
        CommandOutcome::Created(key) => key,
        other => panic!("unexpected outcome: {other:?}"),
    };

    let outcome = registry
        .execute(RegistryCommand::Start {
            key,
            invocation: script(&root, "idle", "while true; do sleep 0.1; done\n"),
        })
        .expect("start");
    assert!(matches!(outcome, CommandOutcome::Started(started) if started == key));

    match registry.execute(RegistryCommand::List).expect("list") {
        CommandOutcome::Listed(rows) => {
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].state, ProcessState::Running);
            assert!(rows[0].pid.is_some());
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let removed = registry
        .execute(RegistryCommand::Remove(key))
        .expect("remove");
    assert!(matches!(removed, CommandOutcome::Removed(removed) if removed == key));
    assert!(registry.is_empty());
}

#[test]
fn registry_force_kill_does_not_wait_for_a_pending_stop() {
    let root = temp_workspace("registry-cancel-grace");
    let registry = InstanceRegistry::new(TerminalSettings {
        stop_grace: Duration::from_secs(3),
        ..TerminalSettings::default()
    });
    let key = registry.create(ToolKind::TextGeneration);
    registry
        .start(
            key,
            script(&root, "stubborn", "trap '' TERM\necho ready\nwhile true; do sleep 1; done\n"),
        )
        .expect("start");
    let controller = registry.controller(key).expect("controller");
    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.line_count() == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    let started = Instant::now();
    let stopped = std::thread::scope(|scope| {
        let stopping = scope.spawn(|| registry.stop(key));
        std::thread::sleep(Duration::from_millis(200));
        registry.force_kill(key).expect("force kill");
        stopping.join().expect("stop thread")
    });
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert_eq!(
        stopped.expect("stop"),
        StopOutcome::Terminated(TerminationOutcome::Forced)
    );
    assert!(!controller.is_running());
}

fn temp_workspace(name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("launchdeck-registry-{name}-{ts}"));
    fs::create_dir_all(&root).expect("mkdir workspace");
    root
}
