use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::config::TerminalSettings;
use crate::process_manager::InvocationDescriptor;
use crate::terminal::{ControllerError, InstanceSummary, StopOutcome, TerminalController};
use crate::tool::ToolKind;

/// Identity of one instance: its tool kind and its index among that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceKey {
    pub tool: ToolKind,
    pub index: u32,
}

impl InstanceKey {
    pub fn new(tool: ToolKind, index: u32) -> Self {
        Self { tool, index }
    }
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tool.slug(), self.index)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no instance {0}")]
    UnknownInstance(InstanceKey),
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// Per-instance result of [`InstanceRegistry::kill_all`].
#[derive(Debug, Default)]
pub struct KillAllReport {
    pub terminated: Vec<(InstanceKey, StopOutcome)>,
    pub failures: Vec<(InstanceKey, String)>,
}

impl KillAllReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Message form of every registry operation, so callers never touch
/// controllers directly.
#[derive(Debug, Clone)]
pub enum RegistryCommand {
    Create(ToolKind),
    Start {
        key: InstanceKey,
        invocation: InvocationDescriptor,
    },
    Stop(InstanceKey),
    ForceKill(InstanceKey),
    Restart(InstanceKey),
    Remove(InstanceKey),
    List,
    KillAll,
}

#[derive(Debug)]
pub enum CommandOutcome {
    Created(InstanceKey),
    Started(InstanceKey),
    Stopped(InstanceKey, StopOutcome),
    Restarted(InstanceKey),
    Removed(InstanceKey),
    Listed(Vec<InstanceSummary>),
    KilledAll(KillAllReport),
}

impl CommandOutcome {
    /// One-line status message for the UI.
    pub fn describe(&self) -> String {
        match self {
            CommandOutcome::Created(key) => format!("created {key}"),
            CommandOutcome::Started(key) => format!("started {key}"),
            CommandOutcome::Stopped(key, StopOutcome::AlreadyStopped) => {
                format!("{key} was not running")
            }
            CommandOutcome::Stopped(key, StopOutcome::Terminated(outcome)) => {
                format!("stopped {key} ({outcome:?})").to_lowercase()
            }
            CommandOutcome::Restarted(key) => format!("restarted {key}"),
            CommandOutcome::Removed(key) => format!("removed {key}"),
            CommandOutcome::Listed(rows) => format!("{} instance(s)", rows.len()),
            CommandOutcome::KilledAll(report) if report.is_clean() => {
                format!("terminated {} instance(s)", report.terminated.len())
            }
            CommandOutcome::KilledAll(report) => format!(
                "terminated {} instance(s), {} failure(s)",
                report.terminated.len(),
                report.failures.len()
            ),
        }
    }
}

#[derive(Default)]
struct Slots {
    instances: BTreeMap<InstanceKey, Arc<TerminalController>>,
    next_index: HashMap<ToolKind, u32>,
}

/// The single shared table of instances.
///
/// Mutating operations are serialized through `writer`; the slot table lock is
/// only held for lookups, so listing never waits on a stop grace period.
pub struct InstanceRegistry {
    settings: TerminalSettings,
    slots: Mutex<Slots>,
    writer: Mutex<()>,
}

impl InstanceRegistry {
    pub fn new(settings: TerminalSettings) -> Self {
        Self {
            settings,
            slots: Mutex::new(Slots::default()),
            writer: Mutex::new(()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new stopped instance. Indices per kind only ever grow.
    pub fn create(&self, tool: ToolKind) -> InstanceKey {
        let _writer = self.writer();
        let mut slots = self.slots();
        let next = slots.next_index.entry(tool).or_insert(0);
        let key = InstanceKey::new(tool, *next);
        *next += 1;
        slots.instances.insert(
            key,
            Arc::new(TerminalController::new(tool, key.index, self.settings)),
        );
        tracing::info!(tool = %tool, index = key.index, "instance created");
        key
    }

    pub fn controller(&self, key: InstanceKey) -> Option<Arc<TerminalController>> {
        self.slots().instances.get(&key).cloned()
    }

    fn require(&self, key: InstanceKey) -> Result<Arc<TerminalController>, RegistryError> {
        self.controller(key)
            .ok_or(RegistryError::UnknownInstance(key))
    }

    pub fn keys(&self) -> Vec<InstanceKey> {
        self.slots().instances.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.slots().instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().instances.is_empty()
    }

    pub fn start(&self, key: InstanceKey, invocation: InvocationDescriptor) -> Result<(), RegistryError> {
        let _writer = self.writer();
        self.require(key)?.start(invocation)?;
        Ok(())
    }

    pub fn stop(&self, key: InstanceKey) -> Result<StopOutcome, RegistryError> {
        let _writer = self.writer();
        Ok(self.require(key)?.stop()?)
    }

    /// Kills without a grace period. A stop of the same instance that is
    /// holding the writer lock is interrupted first so this never waits it out.
    pub fn force_kill(&self, key: InstanceKey) -> Result<StopOutcome, RegistryError> {
        self.require(key)?.interrupt_stop();
        let _writer = self.writer();
        Ok(self.require(key)?.force_kill()?)
    }

    pub fn restart(&self, key: InstanceKey) -> Result<(), RegistryError> {
        let _writer = self.writer();
        self.require(key)?.restart()?;
        Ok(())
    }

    /// Stops the instance if needed, then drops it. The entry stays when the
    /// stop fails.
    pub fn remove(&self, key: InstanceKey) -> Result<StopOutcome, RegistryError> {
        let _writer = self.writer();
        let controller = self.require(key)?;
        let outcome = controller.stop()?;
        self.slots().instances.remove(&key);
        tracing::info!(tool = %key.tool, index = key.index, "instance removed");
        Ok(outcome)
    }

    /// Summaries ordered by tool kind, then index.
    pub fn list(&self) -> Vec<InstanceSummary> {
        let controllers = self
            .slots()
            .instances
            .values()
            .cloned()
            .collect::<Vec<Arc<TerminalController>>>();
        controllers
            .iter()
            .map(|controller| controller.summary())
            .collect()
    }

    /// Stops every instance concurrently. Each instance is attempted
    /// independently and failures are collected rather than aborting.
    pub fn kill_all(&self) -> KillAllReport {
        let _writer = self.writer();
        let controllers = self
            .slots()
            .instances
            .iter()
            .map(|(key, controller)| (*key, controller.clone()))
            .collect::<Vec<(InstanceKey, Arc<TerminalController>)>>();
        tracing::info!(count = controllers.len(), "stopping all instances");

        let results = thread::scope(|scope| {
            let handles = controllers
                .iter()
                .map(|(key, controller)| (*key, scope.spawn(move || controller.stop())))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|(key, handle)| {
                    let result = match handle.join() {
                        Ok(result) => result.map_err(|error| error.to_string()),
                        Err(_) => Err(format!("{key}: stop panicked")),
                    };
                    (key, result)
                })
                .collect::<Vec<_>>()
        });

        let mut report = KillAllReport::default();
        for (key, result) in results {
            match result {
                Ok(outcome) => report.terminated.push((key, outcome)),
                Err(error) => {
                    tracing::error!(tool = %key.tool, index = key.index, "kill-all failed: {error}");
                    report.failures.push((key, error));
                }
            }
        }
        report
    }

    pub fn execute(&self, command: RegistryCommand) -> Result<CommandOutcome, RegistryError> {
        match command {
            RegistryCommand::Create(tool) => Ok(CommandOutcome::Created(self.create(tool))),
            RegistryCommand::Start { key, invocation } => {
                self.start(key, invocation)?;
                Ok(CommandOutcome::Started(key))
            }
            RegistryCommand::Stop(key) => {
                let outcome = self.stop(key)?;
                Ok(CommandOutcome::Stopped(key, outcome))
            }
            RegistryCommand::ForceKill(key) => {
                let outcome = self.force_kill(key)?;
                Ok(CommandOutcome::Stopped(key, outcome))
            }
            RegistryCommand::Restart(key) => {
                self.restart(key)?;
                Ok(CommandOutcome::Restarted(key))
            }
            RegistryCommand::Remove(key) => {
                self.remove(key)?;
                Ok(CommandOutcome::Removed(key))
            }
            RegistryCommand::List => Ok(CommandOutcome::Listed(self.list())),
            RegistryCommand::KillAll => Ok(CommandOutcome::KilledAll(self.kill_all())),
        }
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
