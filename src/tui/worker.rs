use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::registry::{CommandOutcome, InstanceRegistry, RegistryCommand, RegistryError};

/// Runs registry commands off the UI thread so a stop's grace period never
/// freezes rendering. Replies arrive in submission order.
pub(super) struct CommandWorker {
    requests: Option<Sender<RegistryCommand>>,
    replies: Receiver<Result<CommandOutcome, RegistryError>>,
    handle: Option<JoinHandle<()>>,
    in_flight: usize,
}

impl CommandWorker {
    pub(super) fn spawn(registry: Arc<InstanceRegistry>) -> std::io::Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<RegistryCommand>();
        let (reply_tx, reply_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("launchdeck-commands".to_owned())
            .spawn(move || {
                for command in request_rx {
                    tracing::debug!(?command, "executing registry command");
                    if reply_tx.send(registry.execute(command)).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            requests: Some(request_tx),
            replies: reply_rx,
            handle: Some(handle),
            in_flight: 0,
        })
    }

    pub(super) fn submit(&mut self, command: RegistryCommand) -> bool {
        let sent = self
            .requests
            .as_ref()
            .is_some_and(|requests| requests.send(command).is_ok());
        if sent {
            self.in_flight += 1;
        }
        sent
    }

    pub(super) fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub(super) fn try_reply(&mut self) -> Option<Result<CommandOutcome, RegistryError>> {
        match self.replies.try_recv() {
            Ok(reply) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                Some(reply)
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Closes the queue and waits for commands already submitted.
    pub(super) fn shutdown(&mut self) {
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CommandWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use super::CommandWorker;
    use crate::config::TerminalSettings;
    use crate::registry::{CommandOutcome, InstanceRegistry, RegistryCommand};
    use crate::tool::ToolKind;

    #[test]
    fn worker_executes_commands_in_order() {
        let registry = Arc::new(InstanceRegistry::new(TerminalSettings::default()));
        let mut worker = CommandWorker::spawn(registry.clone()).expect("spawn worker");
        assert!(worker.submit(RegistryCommand::Create(ToolKind::Companion)));
        assert!(worker.submit(RegistryCommand::Create(ToolKind::Companion)));

        let mut created = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while created.len() < 2 && Instant::now() < deadline {
            match worker.try_reply() {
                Some(Ok(CommandOutcome::Created(key))) => created.push(key.index),
                Some(other) => panic!("unexpected reply: {other:?}"),
                None => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        assert_eq!(created, vec![0, 1]);
        assert_eq!(worker.in_flight(), 0);
        worker.shutdown();
        assert!(!worker.submit(RegistryCommand::List));
    }
}
