use std::io::{ErrorKind, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command as ProcessCommand, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{setpgid, Pid};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(40);

/// What to run for one tool: an opaque script or executable plus its working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationDescriptor {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl InvocationDescriptor {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            rendered.push_str(arg);
        }
        rendered
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessManagerError {
    #[error("failed to spawn `{command}` in `{cwd}`: {error}")]
    Spawn {
        command: String,
        cwd: PathBuf,
        error: std::io::Error,
    },
    #[error("process {pid} missing stdin/stdout/stderr pipe")]
    MissingStdio { pid: u32 },
    #[error("process {pid} has exited")]
    NotRunning { pid: u32 },
    #[error("failed writing input to process {pid}: {error}")]
    InputWrite { pid: u32, error: std::io::Error },
    #[error("failed to start the stdin writer for process {pid}: {error}")]
    StdinWriter { pid: u32, error: std::io::Error },
    #[error("failed to signal process {pid}: {detail}")]
    Signal { pid: u32, detail: String },
    #[error("failed to reap process {pid}: {error}")]
    Wait { pid: u32, error: std::io::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownProgress {
    SendingTerm,
    Waiting,
    ForceKilling,
    Complete { forced: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    AlreadyExited,
    Graceful,
    Forced,
}

/// One spawned child together with the pipes the readers take ownership of.
pub struct SpawnedProcess {
    pub child: ManagedChild,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Exclusive owner of one OS child process. The child leads its own process
/// group so that terminating it also reaches anything the script launched.
#[derive(Debug)]
pub struct ManagedChild {
    pid: u32,
    child: Mutex<Child>,
    /// Lines queued for the stdin writer thread.
    stdin: Mutex<Option<Sender<String>>>,
    grace_cancelled: AtomicBool,
}

impl ManagedChild {
    pub fn spawn(invocation: &InvocationDescriptor) -> Result<SpawnedProcess, ProcessManagerError> {
        let mut command = build_command(invocation);
        let mut child = command
            .spawn()
            .map_err(|error| ProcessManagerError::Spawn {
                command: invocation.display(),
                cwd: invocation.cwd.clone(),
                error,
            })?;
        let pid = child.id();
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessManagerError::MissingStdio { pid });
        };
        let stdin = match spawn_stdin_writer(pid, stdin) {
            Ok(sender) => sender,
            Err(error) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ProcessManagerError::StdinWriter { pid, error });
            }
        };
        Ok(SpawnedProcess {
            child: ManagedChild {
                pid,
                child: Mutex::new(child),
                stdin: Mutex::new(Some(stdin)),
                grace_cancelled: AtomicBool::new(false),
            },
            stdout,
            stderr,
        })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    fn lock_child(&self) -> MutexGuard<'_, Child> {
        self.child
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking exit probe; reaps the child when it has exited.
    pub fn try_exit(&self) -> Result<Option<std::process::ExitStatus>, ProcessManagerError> {
        self.lock_child()
            .try_wait()
            .map_err(|error| ProcessManagerError::Wait {
                pid: self.pid,
                error,
            })
    }

    pub fn is_alive(&self) -> bool {
        matches!(self.try_exit(), Ok(None))
    }

    /// Queues `text` plus a newline for the child's stdin. Never blocks on the
    /// pipe: a child that stops reading only backs up the writer thread.
    pub fn write_line(&self, text: &str) -> Result<(), ProcessManagerError> {
        if !self.is_alive() {
            return Err(ProcessManagerError::NotRunning { pid: self.pid });
        }
        let stdin = self.stdin.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = stdin.as_ref() else {
            return Err(ProcessManagerError::MissingStdio { pid: self.pid });
        };
        sender
            .send(format!("{text}\n"))
            .map_err(|_| ProcessManagerError::InputWrite {
                pid: self.pid,
                error: std::io::Error::new(ErrorKind::BrokenPipe, "stdin is closed"),
            })
    }

    /// Ends a running [`terminate_graceful`](Self::terminate_graceful) wait
    /// early; it force kills on its next poll.
    pub fn cancel_grace(&self) {
        self.grace_cancelled.store(true, Ordering::SeqCst);
    }

    fn grace_cancelled(&self) -> bool {
        self.grace_cancelled.load(Ordering::SeqCst)
    }

    pub fn signal_terminate(&self) -> Result<(), ProcessManagerError> {
        #[cfg(unix)]
        {
            self.signal_group(Signal::SIGTERM)
        }
        #[cfg(not(unix))]
        {
            self.kill_tree()
        }
    }

    /// Immediate forceful termination of the child and its process group.
    pub fn force_kill(&self) -> Result<(), ProcessManagerError> {
        #[cfg(unix)]
        {
            let group = self.signal_group(Signal::SIGKILL);
            let mut child = self.lock_child();
            match child.kill() {
                Ok(()) => {}
                Err(error) if error.kind() == ErrorKind::InvalidInput => {}
                Err(error) => {
                    return Err(ProcessManagerError::Signal {
                        pid: self.pid,
                        detail: error.to_string(),
                    })
                }
            }
            let _ = child.wait();
            group
        }
        #[cfg(not(unix))]
        {
            self.kill_tree()?;
            let _ = self.lock_child().wait();
            Ok(())
        }
    }

    /// Two-phase termination: terminate signal, bounded wait, then force kill.
    /// [`cancel_grace`](Self::cancel_grace) cuts the wait short.
    pub fn terminate_graceful<F>(
        &self,
        grace: Duration,
        mut on_progress: F,
    ) -> Result<TerminationOutcome, ProcessManagerError>
    where
        F: FnMut(ShutdownProgress),
    {
        if self.try_exit()?.is_some() {
            self.reap_group();
            return Ok(TerminationOutcome::AlreadyExited);
        }

        on_progress(ShutdownProgress::SendingTerm);
        if let Err(err) = self.signal_terminate() {
            // The group may already be gone; exit polling below decides.
            tracing::debug!(pid = self.pid, "terminate signal failed: {err}");
        }

        on_progress(ShutdownProgress::Waiting);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline && !self.grace_cancelled() {
            if self.try_exit()?.is_some() {
                self.reap_group();
                on_progress(ShutdownProgress::Complete { forced: false });
                return Ok(TerminationOutcome::Graceful);
            }
            thread::sleep(EXIT_POLL_INTERVAL);
        }

        on_progress(ShutdownProgress::ForceKilling);
        self.force_kill()?;
        on_progress(ShutdownProgress::Complete { forced: true });
        Ok(TerminationOutcome::Forced)
    }

    /// Kills whatever the script left behind in its process group.
    pub fn reap_group(&self) {
        #[cfg(unix)]
        {
            let _ = self.signal_group(Signal::SIGKILL);
        }
        #[cfg(not(unix))]
        {
            let _ = self.kill_tree();
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: Signal) -> Result<(), ProcessManagerError> {
        let pid = self.pid as i32;
        if pid <= 0 {
            return Ok(());
        }
        match kill(Pid::from_raw(-pid), signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
            Err(errno) => Err(ProcessManagerError::Signal {
                pid: self.pid,
                detail: errno.to_string(),
            }),
        }
    }

    #[cfg(not(unix))]
    fn kill_tree(&self) -> Result<(), ProcessManagerError> {
        let status = ProcessCommand::new("taskkill")
            .args(["/PID", &self.pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match status {
            Ok(_) => Ok(()),
            Err(error) => {
                let mut child = self.lock_child();
                child.kill().map_err(|_| ProcessManagerError::Signal {
                    pid: self.pid,
                    detail: error.to_string(),
                })
            }
        }
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        if self.is_alive() {
            let _ = self.force_kill();
        }
    }
}

fn spawn_stdin_writer(pid: u32, mut pipe: ChildStdin) -> std::io::Result<Sender<String>> {
    let (sender, lines) = mpsc::channel::<String>();
    thread::Builder::new()
        .name(format!("stdin-{pid}"))
        .spawn(move || {
            for line in lines {
                if let Err(error) = pipe.write_all(line.as_bytes()).and_then(|()| pipe.flush()) {
                    tracing::warn!(pid, "stdin closed: {error}");
                    break;
                }
            }
        })?;
    Ok(sender)
}

pub fn format_exit_diagnostic(status: std::process::ExitStatus) -> String {
    #[cfg(unix)]
    {
        if let Some(code) = status.code() {
            return format!("exit={code}");
        }
        if let Some(signal) = status.signal() {
            return format!("signal={signal}");
        }
        "exit=unknown".to_owned()
    }
    #[cfg(not(unix))]
    {
        format!("exit={}", status.code().unwrap_or(-1))
    }
}

fn build_command(invocation: &InvocationDescriptor) -> ProcessCommand {
    let extension = invocation
        .program
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let mut process = match extension.as_deref() {
        #[cfg(windows)]
        Some("bat") | Some("cmd") => {
            let mut process = ProcessCommand::new("cmd");
            process.arg("/C").arg(&invocation.program);
            process
        }
        #[cfg(unix)]
        Some("sh") => {
            let mut process = ProcessCommand::new("sh");
            process.arg(&invocation.program);
            process
        }
        _ => ProcessCommand::new(&invocation.program),
    };
    process
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    unsafe {
        process.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(|error| std::io::Error::new(ErrorKind::Other, error.to_string()))
        });
    }
    process
}
