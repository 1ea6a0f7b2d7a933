use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::config::TerminalSettings;
use crate::process_manager::{
    format_exit_diagnostic, InvocationDescriptor, ManagedChild, ProcessManagerError,
    ShutdownProgress, SpawnedProcess, TerminationOutcome,
};
use crate::tool::ToolKind;

use super::buffer::{BufferedLine, FilterState, LineFilter, RenderThrottle, TerminalBuffer};
use super::export::{render_export, write_export, ExportError, ExportFormat, ExportScope};
use super::history::CommandHistory;
use super::line::{OutputLine, StreamKind};
use super::reader::spawn_stream_reader;
use super::stats::Statistics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
}

impl ProcessState {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
        }
    }
}

/// How the last process attached to a controller ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRecord {
    pub diagnostic: String,
    pub at: DateTime<Local>,
    /// The exit followed a stop, kill or restart issued through the controller.
    pub requested: bool,
    /// Unrequested exit with a non-zero status or a signal.
    pub crashed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyStopped,
    Terminated(TerminationOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceUsage {
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

/// Point-in-time view of one controller, used by the registry listing.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSummary {
    pub tool: ToolKind,
    pub index: u32,
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub started_at: Option<DateTime<Local>>,
    pub uptime: Option<Duration>,
    pub usage: Option<ResourceUsage>,
    pub line_count: usize,
    pub restarts: u32,
    pub last_exit: Option<ExitRecord>,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("{label} is already running")]
    AlreadyRunning { label: String },
    #[error("{label} is not running")]
    NotRunning { label: String },
    #[error("{label} has never been started")]
    NoInvocation { label: String },
    #[error("{label}: {source}")]
    Process {
        label: String,
        #[source]
        source: ProcessManagerError,
    },
    #[error("{label}: failed to start output reader: {error}")]
    ReaderSpawn {
        label: String,
        error: std::io::Error,
    },
    #[error(transparent)]
    Export(#[from] ExportError),
}

struct Session {
    child: Option<Arc<ManagedChild>>,
    readers: Vec<JoinHandle<()>>,
    invocation: Option<InvocationDescriptor>,
    state: ProcessState,
    started_at: Option<(Instant, DateTime<Local>)>,
    pid: Option<u32>,
    stop_requested: bool,
    last_exit: Option<ExitRecord>,
    filter: FilterState,
    compiled: LineFilter,
    history: CommandHistory,
    throttle: RenderThrottle,
    restarts: u32,
    usage: Option<ResourceUsage>,
}

/// Owns one instance's process handle, output buffer and view state.
///
/// Every method takes `&self`; lock order is `lifecycle` -> `session` -> `buffer`,
/// and the reader threads only ever take `buffer`.
pub struct TerminalController {
    tool: ToolKind,
    index: u32,
    label: String,
    settings: TerminalSettings,
    buffer: Arc<Mutex<TerminalBuffer>>,
    session: Mutex<Session>,
    lifecycle: Mutex<()>,
}

impl std::fmt::Debug for TerminalController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalController")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl TerminalController {
    pub fn new(tool: ToolKind, index: u32, settings: TerminalSettings) -> Self {
        Self {
            tool,
            index,
            label: format!("{}#{index}", tool.slug()),
            settings,
            buffer: Arc::new(Mutex::new(TerminalBuffer::new(settings.max_buffer_size))),
            session: Mutex::new(Session {
                child: None,
                readers: Vec::new(),
                invocation: None,
                state: ProcessState::Stopped,
                started_at: None,
                pid: None,
                stop_requested: false,
                last_exit: None,
                filter: FilterState::default(),
                compiled: LineFilter::default(),
                history: CommandHistory::new(settings.max_history),
                throttle: RenderThrottle::new(settings.render_interval),
                restarts: 0,
                usage: None,
            }),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn tool(&self) -> ToolKind {
        self.tool
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn buffer(&self) -> MutexGuard<'_, TerminalBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns `invocation` and attaches to it. A spawn failure leaves the
    /// controller stopped.
    pub fn start(&self, invocation: InvocationDescriptor) -> Result<(), ControllerError> {
        let _guard = self.lifecycle();
        self.start_locked(invocation)
    }

    fn start_locked(&self, invocation: InvocationDescriptor) -> Result<(), ControllerError> {
        if self.refresh_state() != ProcessState::Stopped {
            return Err(ControllerError::AlreadyRunning {
                label: self.label.clone(),
            });
        }
        self.session().state = ProcessState::Starting;
        tracing::info!(tool = %self.tool, index = self.index, command = %invocation.display(), "starting instance");
        match ManagedChild::spawn(&invocation) {
            Ok(spawned) => self.attach_locked(spawned, invocation),
            Err(source) => {
                self.session().state = ProcessState::Stopped;
                tracing::error!(tool = %self.tool, index = self.index, "spawn failed: {source}");
                Err(ControllerError::Process {
                    label: self.label.clone(),
                    source,
                })
            }
        }
    }

    /// Binds a freshly spawned process to this controller. A process that has
    /// already exited is logged and its remaining output is still drained.
    pub fn attach(
        &self,
        spawned: SpawnedProcess,
        invocation: InvocationDescriptor,
    ) -> Result<(), ControllerError> {
        let _guard = self.lifecycle();
        if self.refresh_state() == ProcessState::Running {
            return Err(ControllerError::AlreadyRunning {
                label: self.label.clone(),
            });
        }
        self.attach_locked(spawned, invocation)
    }

    fn attach_locked(
        &self,
        spawned: SpawnedProcess,
        invocation: InvocationDescriptor,
    ) -> Result<(), ControllerError> {
        let SpawnedProcess {
            child,
            stdout,
            stderr,
        } = spawned;
        let child = Arc::new(child);
        let pid = child.pid();

        self.buffer().begin_population();
        let readers = match self.spawn_readers(stdout, stderr) {
            Ok(readers) => readers,
            Err(error) => {
                let _ = child.force_kill();
                self.session().state = ProcessState::Stopped;
                return Err(ControllerError::ReaderSpawn {
                    label: self.label.clone(),
                    error,
                });
            }
        };

        let mut session = self.session();
        session.readers = readers;
        session.invocation = Some(invocation);
        session.throttle.invalidate();
        session.usage = None;
        session.last_exit = None;

        if let Ok(Some(status)) = child.try_exit() {
            let diagnostic = format_exit_diagnostic(status);
            tracing::warn!(tool = %self.tool, index = self.index, pid, %diagnostic, "attached process had already exited");
            session.state = ProcessState::Stopped;
            session.child = None;
            session.pid = None;
            session.started_at = None;
            session.last_exit = Some(ExitRecord {
                crashed: !status.success(),
                diagnostic,
                at: Local::now(),
                requested: false,
            });
            return Ok(());
        }

        session.child = Some(child);
        session.pid = Some(pid);
        session.state = ProcessState::Running;
        session.stop_requested = false;
        session.started_at = Some((Instant::now(), Local::now()));
        tracing::info!(tool = %self.tool, index = self.index, pid, "attached");
        Ok(())
    }

    fn spawn_readers(
        &self,
        stdout: std::process::ChildStdout,
        stderr: std::process::ChildStderr,
    ) -> std::io::Result<Vec<JoinHandle<()>>> {
        let label = format!("{}-{}", self.tool.slug(), self.index);
        let out = spawn_stream_reader(&label, StreamKind::Stdout, stdout, self.buffer.clone())?;
        let err = spawn_stream_reader(&label, StreamKind::Stderr, stderr, self.buffer.clone())?;
        Ok(vec![out, err])
    }

    /// Polls the child for exit and moves to `Stopped` when it has gone.
    pub fn refresh_state(&self) -> ProcessState {
        let mut session = self.session();
        let Some(child) = session.child.clone() else {
            return session.state;
        };
        match child.try_exit() {
            Ok(None) => session.state,
            Ok(Some(status)) => {
                child.reap_group();
                let requested = session.stop_requested;
                self.finish_exit(&mut session, Some(status), requested);
                session.state
            }
            Err(err) => {
                tracing::warn!(tool = %self.tool, index = self.index, "exit probe failed: {err}");
                session.state
            }
        }
    }

    /// Records how the child ended. `status` is `None` when it could not be
    /// collected after a kill.
    fn finish_exit(&self, session: &mut Session, status: Option<ExitStatus>, requested: bool) {
        let diagnostic = status.map_or_else(|| "exit=unknown".to_owned(), format_exit_diagnostic);
        let crashed = !requested && !status.is_some_and(|status| status.success());
        let pid = session.pid;
        if crashed {
            tracing::warn!(tool = %self.tool, index = self.index, pid, %diagnostic, "crash detected");
        } else {
            tracing::info!(tool = %self.tool, index = self.index, pid, %diagnostic, "process exited");
        }
        session.last_exit = Some(ExitRecord {
            diagnostic,
            at: Local::now(),
            requested,
            crashed,
        });
        session.child = None;
        session.pid = None;
        session.started_at = None;
        session.usage = None;
        session.stop_requested = false;
        session.state = ProcessState::Stopped;
    }

    /// Waits up to `timeout` for the output readers of the last attach to hit
    /// EOF. Returns `false` if some reader is still running, e.g. because a
    /// detached grandchild keeps the pipe open.
    pub fn drain_output(&self, timeout: Duration) -> bool {
        let readers = std::mem::take(&mut self.session().readers);
        let deadline = Instant::now() + timeout;
        while readers.iter().any(|reader| !reader.is_finished()) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        let mut drained = true;
        for reader in readers {
            if reader.is_finished() {
                let _ = reader.join();
            } else {
                drained = false;
            }
        }
        drained
    }

    pub fn state(&self) -> ProcessState {
        self.refresh_state()
    }

    pub fn is_running(&self) -> bool {
        self.refresh_state() == ProcessState::Running
    }

    pub fn pid(&self) -> Option<u32> {
        self.refresh_state();
        self.session().pid
    }

    pub fn invocation(&self) -> Option<InvocationDescriptor> {
        self.session().invocation.clone()
    }

    pub fn last_exit(&self) -> Option<ExitRecord> {
        self.session().last_exit.clone()
    }

    /// Writes `text` plus a newline to the process's stdin.
    pub fn send_input(&self, text: &str) -> Result<(), ControllerError> {
        self.refresh_state();
        let mut session = self.session();
        let Some(child) = session.child.clone() else {
            return Err(ControllerError::NotRunning {
                label: self.label.clone(),
            });
        };
        session.history.record(text);
        drop(session);
        child
            .write_line(text)
            .map_err(|source| match source {
                ProcessManagerError::NotRunning { .. } => ControllerError::NotRunning {
                    label: self.label.clone(),
                },
                source => ControllerError::Process {
                    label: self.label.clone(),
                    source,
                },
            })
    }

    /// Graceful terminate with escalation to a forced kill after the grace period.
    pub fn stop(&self) -> Result<StopOutcome, ControllerError> {
        let _guard = self.lifecycle();
        self.stop_locked()
    }

    fn stop_locked(&self) -> Result<StopOutcome, ControllerError> {
        self.refresh_state();
        let child = {
            let mut session = self.session();
            let Some(child) = session.child.clone() else {
                return Ok(StopOutcome::AlreadyStopped);
            };
            session.stop_requested = true;
            child
        };
        let pid = child.pid();
        tracing::info!(tool = %self.tool, index = self.index, pid, "stopping");
        let outcome = child
            .terminate_graceful(self.settings.stop_grace, |progress| {
                if progress == ShutdownProgress::ForceKilling {
                    tracing::warn!(tool = %self.tool, index = self.index, pid, "grace period elapsed, force killing");
                }
            })
            .map_err(|source| {
                tracing::error!(tool = %self.tool, index = self.index, pid, "stop failed, process may be orphaned: {source}");
                ControllerError::Process {
                    label: self.label.clone(),
                    source,
                }
            })?;
        let status = child.try_exit().ok().flatten();
        self.finish_exit(&mut self.session(), status, true);
        Ok(StopOutcome::Terminated(outcome))
    }

    /// Makes a [`stop`](Self::stop) that is waiting out its grace period kill
    /// right away. Only takes the session lock, so it never waits on a stop.
    pub fn interrupt_stop(&self) {
        if let Some(child) = self.session().child.clone() {
            child.cancel_grace();
        }
    }

    /// Immediate kill of the process group, skipping the grace period. A stop
    /// already in progress is cut short and finishes the kill itself.
    pub fn force_kill(&self) -> Result<StopOutcome, ControllerError> {
        self.interrupt_stop();
        let _guard = self.lifecycle();
        self.refresh_state();
        let child = {
            let mut session = self.session();
            let Some(child) = session.child.clone() else {
                return Ok(StopOutcome::AlreadyStopped);
            };
            session.stop_requested = true;
            child
        };
        let pid = child.pid();
        tracing::info!(tool = %self.tool, index = self.index, pid, "force killing");
        child.force_kill().map_err(|source| {
            tracing::error!(tool = %self.tool, index = self.index, pid, "force kill failed: {source}");
            ControllerError::Process {
                label: self.label.clone(),
                source,
            }
        })?;
        let status = child.try_exit().ok().flatten();
        self.finish_exit(&mut self.session(), status, true);
        Ok(StopOutcome::Terminated(TerminationOutcome::Forced))
    }

    /// Stops the current process, if any, and starts the stored invocation again.
    pub fn restart(&self) -> Result<(), ControllerError> {
        let _guard = self.lifecycle();
        let Some(invocation) = self.session().invocation.clone() else {
            return Err(ControllerError::NoInvocation {
                label: self.label.clone(),
            });
        };
        self.stop_locked()?;
        self.start_locked(invocation)?;
        let mut session = self.session();
        session.restarts += 1;
        tracing::info!(tool = %self.tool, index = self.index, restarts = session.restarts, "restarted");
        Ok(())
    }

    /// Empties the display; exports and statistics still see every retained line.
    pub fn clear(&self) {
        let mut session = self.session();
        self.buffer().clear_view();
        session.throttle.invalidate();
    }

    pub fn filter(&self) -> FilterState {
        self.session().filter.clone()
    }

    /// Replaces the filter and returns the regex compile error, if any.
    pub fn set_filter(&self, filter: FilterState) -> Option<String> {
        let mut session = self.session();
        session.compiled = filter.compile();
        session.filter = filter;
        session.throttle.invalidate();
        session.compiled.pattern_error().map(str::to_owned)
    }

    pub fn update_filter<F>(&self, update: F) -> Option<String>
    where
        F: FnOnce(&mut FilterState),
    {
        let mut filter = self.filter();
        update(&mut filter);
        self.set_filter(filter)
    }

    /// The currently visible lines. Ends the initial population phase once
    /// any line of the current attach has been seen.
    pub fn render(&self) -> Vec<Arc<OutputLine>> {
        self.render_at(Instant::now())
    }

    fn render_at(&self, now: Instant) -> Vec<Arc<OutputLine>> {
        let mut session = self.session();
        let mut buffer = self.buffer();
        let visible = buffer.render(&session.compiled);
        session.throttle.record(now, buffer.generation());
        visible
    }

    /// Like [`render`](Self::render), but returns `None` when nothing changed
    /// or the last redraw was too recent.
    pub fn poll_render(&self, now: Instant) -> Option<Vec<Arc<OutputLine>>> {
        let due = {
            let session = self.session();
            let generation = self.buffer().generation();
            session.throttle.should_render(now, generation)
        };
        due.then(|| self.render_at(now))
    }

    /// Every retained line from sequence number `seq` on, ignoring filters.
    pub fn lines_since(&self, seq: u64) -> Vec<BufferedLine> {
        self.buffer().since(seq)
    }

    pub fn search_matches(&self, needle: &str) -> Vec<u64> {
        self.buffer().search(needle)
    }

    pub fn line_count(&self) -> usize {
        self.buffer().len()
    }

    pub fn export(&self, format: ExportFormat, scope: ExportScope) -> Result<String, ControllerError> {
        let lines = match scope {
            ExportScope::Full => self.buffer().snapshot(),
            ExportScope::Filtered => {
                let session = self.session();
                let filtered = self.buffer().matching(&session.compiled);
                drop(session);
                filtered
            }
        };
        Ok(render_export(&lines, format)?)
    }

    /// Writes an export to `<dir>/<tool>-<index>-<timestamp>.<ext>`.
    pub fn export_to_dir(
        &self,
        dir: &Path,
        format: ExportFormat,
        scope: ExportScope,
    ) -> Result<PathBuf, ControllerError> {
        let content = self.export(format, scope)?;
        let stem = format!("{}-{}", self.tool.slug(), self.index);
        let path = write_export(dir, &stem, format, &content)?;
        tracing::info!(tool = %self.tool, index = self.index, path = %path.display(), "exported output");
        Ok(path)
    }

    pub fn statistics(&self) -> Statistics {
        Statistics::from_lines(&self.buffer().snapshot())
    }

    pub fn history_entries(&self) -> Vec<String> {
        self.session().history.entries().map(str::to_owned).collect()
    }

    pub fn history_older(&self) -> Option<String> {
        self.session().history.older().map(str::to_owned)
    }

    pub fn history_newer(&self) -> Option<String> {
        self.session().history.newer().map(str::to_owned)
    }

    pub fn record_usage(&self, usage: Option<ResourceUsage>) {
        let mut session = self.session();
        if session.child.is_some() {
            session.usage = usage;
        }
    }

    pub fn summary(&self) -> InstanceSummary {
        self.refresh_state();
        let line_count = self.line_count();
        let session = self.session();
        InstanceSummary {
            tool: self.tool,
            index: self.index,
            state: session.state,
            pid: session.pid,
            started_at: session.started_at.map(|(_, wall)| wall),
            uptime: session.started_at.map(|(started, _)| started.elapsed()),
            usage: session.usage,
            line_count,
            restarts: session.restarts,
            last_exit: session.last_exit.clone(),
        }
    }
}
