#![cfg(unix)]

use launchdeck::config::TerminalSettings;
use launchdeck::process_manager::{InvocationDescriptor, TerminationOutcome};
use launchdeck::terminal::{
    ControllerError, ExportFormat, ExportScope, ProcessState, StopOutcome, TerminalController,
};
use launchdeck::tool::ToolKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn settings(stop_grace: Duration) -> TerminalSettings {
    TerminalSettings {
        max_buffer_size: 10_000,
        max_history: 100,
        render_interval: Duration::from_millis(10),
        stop_grace,
    }
}

fn script(root: &Path, name: &str, body: &str) -> InvocationDescriptor {
    let path = root.join(format!("{name}.sh"));
    fs::write(&path, body).expect("write script");
    InvocationDescriptor::new(path, root)
}

fn wait_for<F>(timeout: Duration, mut done: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    done()
}

fn rendered_text(controller: &TerminalController) -> Vec<String> {
    controller
        .render()
        .iter()
        .map(|line| line.raw_text.clone())
        .collect()
}

#[test]
fn initial_population_ignores_filter_then_errors_only_applies() {
    let root = temp_workspace("initial-population");
    let invocation = script(
        &root,
        "echo",
        "printf 'INFO: booting\\nERROR: disk full\\ndone\\n'\nwhile IFS= read -r line; do printf '%s\\n' \"$line\"; done\n",
    );
    let controller = TerminalController::new(ToolKind::TextGeneration, 0, settings(Duration::from_secs(2)));
    controller.update_filter(|filter| filter.errors_only = true);
    controller.start(invocation).expect("start");

    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 3));
    assert_eq!(
        rendered_text(&controller),
        vec!["INFO: booting", "ERROR: disk full", "done"]
    );

    controller.send_input("INFO: idle").expect("send idle");
    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 4));
    controller.send_input("ERROR: retry").expect("send retry");
    controller.send_input("INFO: tick").expect("send tick");
    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 6));

    assert_eq!(
        rendered_text(&controller),
        vec!["INFO: booting", "ERROR: disk full", "done", "ERROR: retry"]
    );
    assert_eq!(controller.history_entries(), vec!["INFO: idle", "ERROR: retry", "INFO: tick"]);

    let outcome = controller.stop().expect("stop");
    assert!(matches!(outcome, StopOutcome::Terminated(_)));
    assert_eq!(controller.state(), ProcessState::Stopped);
    let exit = controller.last_exit().expect("exit recorded");
    assert!(exit.requested);
    assert!(!exit.crashed);
}

#[test]
fn send_input_after_exit_returns_not_running() {
    let root = temp_workspace("input-after-exit");
    let invocation = script(&root, "quick", "echo 'Model loaded successfully'\n");
    let controller = TerminalController::new(ToolKind::Companion, 0, settings(Duration::from_secs(2)));
    controller.start(invocation).expect("start");

    assert!(wait_for(Duration::from_secs(5), || !controller.is_running()));
    let err = controller.send_input("hello").expect_err("process has exited");
    assert!(matches!(err, ControllerError::NotRunning { .. }), "{err:?}");

    assert!(controller.drain_output(Duration::from_secs(2)));
    assert_eq!(controller.line_count(), 1);
    let exit = controller.last_exit().expect("exit recorded");
    assert_eq!(exit.diagnostic, "exit=0");
    assert!(!exit.crashed);
}

#[test]
fn non_zero_exit_is_recorded_as_crash() {
    let root = temp_workspace("crash");
    let invocation = script(
        &root,
        "crash",
        "echo 'Traceback (most recent call last):' 1>&2\nexit 3\n",
    );
    let controller = TerminalController::new(ToolKind::LocalLlm, 0, settings(Duration::from_secs(2)));
    controller.start(invocation).expect("start");

    assert!(wait_for(Duration::from_secs(5), || !controller.is_running()));
    let exit = controller.last_exit().expect("exit recorded");
    assert_eq!(exit.diagnostic, "exit=3");
    assert!(exit.crashed);
    assert!(!exit.requested);

    controller.drain_output(Duration::from_secs(2));
    let stats = controller.statistics();
    assert_eq!(stats.stderr_lines, 1);
    assert_eq!(stats.error_rate, 1.0);
}

#[test]
fn stop_twice_is_idempotent() {
    let root = temp_workspace("idempotent-stop");
    let invocation = script(&root, "loop", "while true; do sleep 0.1; done\n");
    let controller = TerminalController::new(ToolKind::VoiceConversion, 0, settings(Duration::from_secs(3)));
    controller.start(invocation).expect("start");
    assert!(controller.is_running());
    assert!(controller.pid().is_some());

    let first = controller.stop().expect("first stop");
    assert_eq!(first, StopOutcome::Terminated(TerminationOutcome::Graceful));
    let second = controller.stop().expect("second stop");
    assert_eq!(second, StopOutcome::AlreadyStopped);
    assert_eq!(controller.pid(), None);
}

#[test]
fn stop_escalates_to_kill_when_term_is_ignored() {
    let root = temp_workspace("escalation");
    let invocation = script(&root, "stubborn", "trap '' TERM\necho ready\nwhile true; do sleep 1; done\n");
    let controller = TerminalController::new(ToolKind::TextGeneration, 0, settings(Duration::from_millis(300)));
    controller.start(invocation).expect("start");
    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 1));

    let started = Instant::now();
    let outcome = controller.stop().expect("stop");
    assert_eq!(outcome, StopOutcome::Terminated(TerminationOutcome::Forced));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!controller.is_running());
    assert_eq!(controller.last_exit().expect("exit").diagnostic, "signal=9");
}

#[test]
fn restart_reattaches_and_keeps_previous_lines() {
    let root = temp_workspace("restart");
    let invocation = script(&root, "boot", "echo 'INFO: booting'\nwhile true; do sleep 0.1; done\n");
    let controller = TerminalController::new(ToolKind::Companion, 1, settings(Duration::from_secs(3)));
    controller.start(invocation.clone()).expect("start");
    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 1));
    let first_pid = controller.pid().expect("pid");

    controller.restart().expect("restart");
    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 2));
    assert_ne!(controller.pid(), Some(first_pid));
    assert_eq!(controller.summary().restarts, 1);
    assert_eq!(controller.invocation(), Some(invocation));

    let err = controller.start(script(&root, "other", "true\n")).expect_err("already running");
    assert!(matches!(err, ControllerError::AlreadyRunning { .. }));
    controller.stop().expect("stop");
}

#[test]
fn export_to_dir_writes_filtered_json() {
    let root = temp_workspace("export");
    let invocation = script(
        &root,
        "mixed",
        "echo 'INFO: booting'\necho 'WARNING: low VRAM'\necho 'ERROR: CUDA out of memory'\n",
    );
    let controller = TerminalController::new(ToolKind::LocalLlm, 4, settings(Duration::from_secs(2)));
    controller.start(invocation).expect("start");
    assert!(wait_for(Duration::from_secs(5), || !controller.is_running()));
    controller.drain_output(Duration::from_secs(2));

    controller.update_filter(|filter| filter.warnings_only = true);
    let path = controller
        .export_to_dir(&root.join("exports"), ExportFormat::Json, ExportScope::Filtered)
        .expect("export");
    let name = path.file_name().and_then(|name| name.to_str()).expect("file name");
    assert!(name.starts_with("local-llm-4-"), "{name}");
    assert!(name.ends_with(".json"), "{name}");

    let written = fs::read_to_string(&path).expect("read export");
    let records: serde_json::Value = serde_json::from_str(&written).expect("json export");
    let records = records.as_array().expect("array");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["category"], "warning");
    assert_eq!(records[0]["text"], "WARNING: low VRAM");

    let full = controller.export(ExportFormat::Text, ExportScope::Full).expect("full export");
    assert_eq!(full.lines().count(), 3);
}

#[test]
fn carriage_return_progress_shows_before_the_line_ends() {
    let root = temp_workspace("cr-progress");
    let invocation = script(
        &root,
        "progress",
        "printf 'Loading model: 10%%\\r' 1>&2\nsleep 0.2\nprintf '50%%\\r' 1>&2\nsleep 30\n",
    );
    let controller = TerminalController::new(ToolKind::TextGeneration, 0, settings(Duration::from_secs(2)));
    controller.start(invocation).expect("start");

    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 2));
    assert!(controller.is_running());
    assert_eq!(rendered_text(&controller), vec!["Loading model: 10%", "50%"]);
    controller.force_kill().expect("force kill");
}

#[test]
fn force_kill_cuts_a_graceful_stop_short() {
    let root = temp_workspace("cancel-grace");
    let invocation = script(&root, "stubborn", "trap '' TERM\necho ready\nwhile true; do sleep 1; done\n");
    let controller = TerminalController::new(ToolKind::LocalLlm, 0, settings(Duration::from_secs(3)));
    controller.start(invocation).expect("start");
    assert!(wait_for(Duration::from_secs(5), || controller.line_count() == 1));

    let started = Instant::now();
    let (stopped, killed) = std::thread::scope(|scope| {
        let stopping = scope.spawn(|| controller.stop());
        std::thread::sleep(Duration::from_millis(200));
        let killed = controller.force_kill();
        (stopping.join().expect("stop thread"), killed)
    });

    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    assert_eq!(
        stopped.expect("stop"),
        StopOutcome::Terminated(TerminationOutcome::Forced)
    );
    killed.expect("force kill");
    assert!(!controller.is_running());
    assert!(!controller.last_exit().expect("exit").crashed);
}

#[test]
fn closed_stdout_does_not_stop_stderr_capture() {
    let root = temp_workspace("closed-stdout");
    let invocation = script(
        &root,
        "half",
        "exec 1>&-\nsleep 0.3\necho 'ERROR: late' 1>&2\n",
    );
    let controller = TerminalController::new(ToolKind::Companion, 0, settings(Duration::from_secs(2)));
    controller.start(invocation).expect("start");

    assert!(wait_for(Duration::from_secs(5), || !controller.is_running()));
    assert!(controller.drain_output(Duration::from_secs(2)));
    assert_eq!(rendered_text(&controller), vec!["ERROR: late"]);
    let stats = controller.statistics();
    assert_eq!(stats.stderr_lines, 1);
    assert_eq!(stats.stdout_lines, 0);
}

#[test]
fn exit_by_signal_is_recorded_as_crash() {
    let root = temp_workspace("signal-crash");
    let invocation = script(&root, "suicide", "echo 'INFO: booting'\nkill -9 $$\n");
    let controller = TerminalController::new(ToolKind::VoiceConversion, 0, settings(Duration::from_secs(2)));
    controller.start(invocation).expect("start");

    assert!(wait_for(Duration::from_secs(5), || !controller.is_running()));
    let exit = controller.last_exit().expect("exit recorded");
    assert_eq!(exit.diagnostic, "signal=9");
    assert!(exit.crashed);
}

#[test]
fn send_input_does_not_block_when_child_never_reads() {
    let root = temp_workspace("stdin-backlog");
    let invocation = script(&root, "deaf", "exec sleep 30\n");
    let controller = TerminalController::new(ToolKind::Companion, 0, settings(Duration::from_secs(2)));
    controller.start(invocation).expect("start");

    let chunk = "x".repeat(4096);
    let started = Instant::now();
    for _ in 0..64 {
        controller.send_input(&chunk).expect("queue input");
    }
    assert!(started.elapsed() < Duration::from_secs(2), "{:?}", started.elapsed());
    controller.force_kill().expect("force kill");
}

fn temp_workspace(name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("launchdeck-process-{name}-{ts}"));
    fs::create_dir_all(&root).expect("mkdir workspace");
    root
}
