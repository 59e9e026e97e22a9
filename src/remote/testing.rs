//! In-memory transport that records every call, for tests.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{CommandOutput, Connection, Transport};
use crate::error::{VmError, VmResult};

/// Bytes written locally by every `get`.
pub(crate) const DOWNLOADED_BYTES: &[u8] = b"\x89PNG-test";

#[derive(Default)]
struct State {
    commands: Vec<String>,
    transfers: Vec<String>,
    /// substring -> (exit code, stderr)
    exits: Vec<(String, i32, String)>,
    /// substring -> transport error message
    errors: Vec<(String, String)>,
    stdout: Vec<(String, String)>,
    /// error message for every transfer
    transfer_error: Option<String>,
    shutdowns: usize,
}

#[derive(Clone, Default)]
pub(crate) struct RecordingTransport {
    state: Arc<Mutex<State>>,
}

impl RecordingTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connection(&self) -> Connection {
        Connection::new(Box::new(self.clone()), Duration::from_secs(5))
    }

    /// Commands containing `needle` exit with `code` and `stderr`.
    pub(crate) fn fail_matching(&self, needle: &str, code: i32, stderr: &str) {
        self.state
            .lock()
            .unwrap()
            .exits
            .push((needle.to_string(), code, stderr.to_string()));
    }

    /// Commands containing `needle` fail at the transport level.
    pub(crate) fn error_matching(&self, needle: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .errors
            .push((needle.to_string(), message.to_string()));
    }

    pub(crate) fn stdout_matching(&self, needle: &str, stdout: &str) {
        self.state
            .lock()
            .unwrap()
            .stdout
            .push((needle.to_string(), stdout.to_string()));
    }

    /// Every `put` and `get` fails with `message`.
    pub(crate) fn fail_transfers(&self, message: &str) {
        self.state.lock().unwrap().transfer_error = Some(message.to_string());
    }

    fn transfer_failure(state: &State, what: &str) -> VmResult<()> {
        match &state.transfer_error {
            Some(message) => Err(VmError::RemoteExecution {
                command: what.to_string(),
                exit_code: Some(1),
                stderr: message.clone(),
            }),
            None => Ok(()),
        }
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.state.lock().unwrap().commands.clone()
    }

    pub(crate) fn transfers(&self) -> Vec<String> {
        self.state.lock().unwrap().transfers.clone()
    }

    pub(crate) fn shutdown_count(&self) -> usize {
        self.state.lock().unwrap().shutdowns
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn exec(&self, command: &str, _timeout: Duration) -> VmResult<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.commands.push(command.to_string());

        if let Some((_, message)) = state.errors.iter().find(|(n, _)| command.contains(n)) {
            return Err(VmError::RemoteExecution {
                command: command.to_string(),
                exit_code: None,
                stderr: message.clone(),
            });
        }

        let stdout = state
            .stdout
            .iter()
            .find(|(n, _)| command.contains(n))
            .map(|(_, s)| s.clone())
            .unwrap_or_default();

        if let Some((_, code, stderr)) = state.exits.iter().find(|(n, _, _)| command.contains(n)) {
            return Ok(CommandOutput {
                stdout,
                stderr: stderr.clone(),
                exit_code: Some(*code),
            });
        }

        Ok(CommandOutput {
            stdout,
            stderr: String::new(),
            exit_code: Some(0),
        })
    }

    async fn put(&self, local: &Path, remote: &str) -> VmResult<()> {
        let mut state = self.state.lock().unwrap();
        let what = format!("put {} -> {}", local.display(), remote);
        state.transfers.push(what.clone());
        Self::transfer_failure(&state, &what)
    }

    async fn get(&self, remote: &str, local: &Path) -> VmResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            let what = format!("get {} -> {}", remote, local.display());
            state.transfers.push(what.clone());
            Self::transfer_failure(&state, &what)?;
        }
        if let Some(parent) = local.parent() {
            if parent.exists() {
                std::fs::write(local, DOWNLOADED_BYTES)
                    .map_err(|e| VmError::io_at("write", local, e))?;
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> VmResult<()> {
        self.state.lock().unwrap().shutdowns += 1;
        Ok(())
    }
}
