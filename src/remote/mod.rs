//! The single remote session to the controlled VM.
//!
//! [`Connection`] owns one [`Transport`] for the lifetime of the process and
//! funnels every remote call through a mutex, so commands and file transfers
//! never interleave on the wire. File transfers go through a
//! [`TransferChannel`], which holds the session for as long as it lives and
//! releases it on drop.

mod openssh;
#[cfg(test)]
pub(crate) mod testing;

pub use openssh::OpenSshTransport;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::RemoteConfig;
use crate::error::{VmError, VmResult};

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the remote side did not report a status (killed by signal)
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Raw session operations. Implementations report nonzero exits as data;
/// an `Err` means the transport itself failed.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exec(&self, command: &str, timeout: Duration) -> VmResult<CommandOutput>;

    async fn put(&self, local: &Path, remote: &str) -> VmResult<()>;

    async fn get(&self, remote: &str, local: &Path) -> VmResult<()>;

    /// Tear the session down. Called at most once by [`Connection::close`].
    async fn shutdown(&self) -> VmResult<()>;
}

pub struct Connection {
    transport: Mutex<Box<dyn Transport>>,
    command_timeout: Duration,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>, command_timeout: Duration) -> Self {
        Self {
            transport: Mutex::new(transport),
            command_timeout,
            closed: AtomicBool::new(false),
        }
    }

    /// Establish the OpenSSH session described by `cfg`.
    pub async fn open(cfg: &RemoteConfig) -> VmResult<Self> {
        let transport = OpenSshTransport::connect(cfg).await?;
        tracing::info!(host = %cfg.host, port = cfg.port, user = %cfg.user, "Remote session established");
        Ok(Self::new(Box::new(transport), cfg.command_timeout))
    }

    /// Run `command`, treating a nonzero exit as [`VmError::RemoteExecution`].
    pub async fn run(&self, command: &str) -> VmResult<CommandOutput> {
        let output = self.run_unchecked(command).await?;
        if !output.success() {
            return Err(VmError::RemoteExecution {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run `command` and hand back the exit status for the caller to inspect.
    pub async fn run_unchecked(&self, command: &str) -> VmResult<CommandOutput> {
        self.run_with_timeout(command, self.command_timeout).await
    }

    pub async fn run_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> VmResult<CommandOutput> {
        let transport = self.acquire().await?;
        tracing::debug!(command = %command, "Running remote command");
        let output = transport.exec(command, timeout).await?;
        tracing::debug!(exit_code = ?output.exit_code, "Remote command finished");
        Ok(output)
    }

    /// Open a file-transfer channel. The session stays reserved until the
    /// channel is dropped.
    pub async fn transfer(&self) -> VmResult<TransferChannel<'_>> {
        let guard = self.acquire().await?;
        tracing::debug!("Transfer channel opened");
        Ok(TransferChannel { transport: guard })
    }

    /// Release the session. Safe to call more than once; only the first call
    /// reaches the transport.
    pub async fn close(&self) -> VmResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let transport = self.transport.lock().await;
        tracing::info!("Closing remote session");
        transport.shutdown().await
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn acquire(&self) -> VmResult<MutexGuard<'_, Box<dyn Transport>>> {
        if self.is_closed() {
            return Err(VmError::Connection("remote session is closed".to_string()));
        }
        Ok(self.transport.lock().await)
    }
}

/// Scoped file-transfer handle borrowed from a [`Connection`].
pub struct TransferChannel<'a> {
    transport: MutexGuard<'a, Box<dyn Transport>>,
}

impl TransferChannel<'_> {
    pub async fn put(&self, local: &Path, remote: &str) -> VmResult<()> {
        tracing::debug!(local = %local.display(), remote = %remote, "Uploading file");
        self.transport.put(local, remote).await
    }

    pub async fn get(&self, remote: &str, local: &Path) -> VmResult<()> {
        tracing::debug!(remote = %remote, local = %local.display(), "Downloading file");
        self.transport.get(remote, local).await
    }
}

impl Drop for TransferChannel<'_> {
    fn drop(&mut self) {
        tracing::debug!("Transfer channel released");
    }
}
