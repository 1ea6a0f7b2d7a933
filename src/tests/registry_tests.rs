use super::{CommandOutcome, InstanceKey, InstanceRegistry, RegistryCommand, RegistryError};
use crate::config::TerminalSettings;
use crate::process_manager::InvocationDescriptor;
use crate::terminal::{ControllerError, ProcessState, StopOutcome};
use crate::tool::ToolKind;

fn registry() -> InstanceRegistry {
    InstanceRegistry::new(TerminalSettings::default())
}

#[test]
fn indices_are_monotonic_per_tool() {
    let registry = registry();
    let first = registry.create(ToolKind::TextGeneration);
    let second = registry.create(ToolKind::TextGeneration);
    assert_eq!((first.index, second.index), (0, 1));

    registry.remove(first).expect("remove stopped instance");
    let third = registry.create(ToolKind::TextGeneration);
    assert_eq!(third.index, 2);
}

#[test]
fn indices_are_independent_across_tools() {
    let registry = registry();
    registry.create(ToolKind::TextGeneration);
    registry.create(ToolKind::TextGeneration);
    let companion = registry.create(ToolKind::Companion);
    assert_eq!(companion, InstanceKey::new(ToolKind::Companion, 0));
}

#[test]
fn indices_are_never_shared_under_churn() {
    let registry = registry();
    let mut seen = Vec::new();
    for round in 0..20 {
        let key = registry.create(ToolKind::LocalLlm);
        assert!(!seen.contains(&key.index));
        seen.push(key.index);
        if round % 3 == 0 {
            registry.remove(key).expect("remove");
        }
    }
    assert_eq!(seen, (0..20).collect::<Vec<u32>>());
    assert_eq!(registry.len(), 13);
}

#[test]
fn created_instance_is_listed_as_stopped() {
    let registry = registry();
    registry.create(ToolKind::VoiceConversion);
    registry.create(ToolKind::Companion);
    let rows = registry.list();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].tool, ToolKind::Companion);
    assert_eq!(rows[1].tool, ToolKind::VoiceConversion);
    assert!(rows.iter().all(|row| row.state == ProcessState::Stopped));
}

#[test]
fn operations_on_unknown_instances_report_errors() {
    let registry = registry();
    let missing = InstanceKey::new(ToolKind::Companion, 9);
    assert!(matches!(
        registry.stop(missing),
        Err(RegistryError::UnknownInstance(key)) if key == missing
    ));
    assert!(matches!(
        registry.remove(missing),
        Err(RegistryError::UnknownInstance(_))
    ));
    assert!(matches!(
        registry.restart(missing),
        Err(RegistryError::UnknownInstance(_))
    ));
}

#[test]
fn stop_on_stopped_instance_is_a_reported_no_op() {
    let registry = registry();
    let key = registry.create(ToolKind::Companion);
    assert_eq!(registry.stop(key).expect("stop"), StopOutcome::AlreadyStopped);
    assert_eq!(registry.stop(key).expect("stop again"), StopOutcome::AlreadyStopped);
}

#[test]
fn spawn_failure_leaves_instance_stopped() {
    let registry = registry();
    let key = registry.create(ToolKind::LocalLlm);
    let missing = std::env::temp_dir().join("launchdeck-missing-runner-binary");
    let result = registry.start(key, InvocationDescriptor::new(&missing, std::env::temp_dir()));
    assert!(matches!(
        result,
        Err(RegistryError::Controller(ControllerError::Process { .. }))
    ));
    let controller = registry.controller(key).expect("controller");
    assert_eq!(controller.state(), ProcessState::Stopped);
}

#[test]
fn execute_routes_commands() {
    let registry = registry();
    let created = registry
        .execute(RegistryCommand::Create(ToolKind::TextGeneration))
        .expect("create");
    let CommandOutcome::Created(key) = created else {
        panic!("unexpected outcome: {created:?}");
    };
    assert_eq!(
        CommandOutcome::Created(key).describe(),
        "created text-generation#0"
    );

    let listed = registry.execute(RegistryCommand::List).expect("list");
    assert!(matches!(listed, CommandOutcome::Listed(ref rows) if rows.len() == 1));

    let killed = registry.execute(RegistryCommand::KillAll).expect("kill all");
    let CommandOutcome::KilledAll(report) = killed else {
        panic!("unexpected outcome");
    };
    assert!(report.is_clean());
    assert_eq!(report.terminated, vec![(key, StopOutcome::AlreadyStopped)]);

    registry
        .execute(RegistryCommand::Remove(key))
        .expect("remove");
    assert!(registry.is_empty());
}
