//! OpenSSH-backed transport.
//!
//! A ControlMaster process holds the one authenticated session; every command
//! and `sftp` batch afterwards is multiplexed over its control socket.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CommandOutput, Transport};
use crate::config::RemoteConfig;
use crate::error::{VmError, VmResult};

const MASTER_POLL_INTERVAL: Duration = Duration::from_millis(100);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenSshTransport {
    cfg: RemoteConfig,
    control_path: PathBuf,
    master: Mutex<Option<Child>>,
}

impl OpenSshTransport {
    /// Spawn the control master and wait until its socket answers `-O check`.
    pub async fn connect(cfg: &RemoteConfig) -> VmResult<Self> {
        let control_path =
            std::env::temp_dir().join(format!("vm_control_{}.sock", Uuid::new_v4().simple()));
        let transport = Self {
            cfg: cfg.clone(),
            control_path,
            master: Mutex::new(None),
        };

        let mut cmd = Command::new("ssh");
        cmd.args(transport.base_args())
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", cfg.connect_timeout.as_secs().max(1)))
            .arg("-o")
            .arg("ServerAliveInterval=30")
            .arg("-N")
            .arg(cfg.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| VmError::Connection(format!("Failed to start ssh: {}", e)))?;

        let deadline = Instant::now() + cfg.connect_timeout;
        loop {
            if let Some(status) = child
                .try_wait()
                .map_err(|e| VmError::Connection(format!("Failed to poll ssh: {}", e)))?
            {
                let stderr = read_stderr(&mut child).await;
                return Err(VmError::Connection(format!(
                    "ssh exited with {}: {}",
                    status,
                    stderr.trim()
                )));
            }

            if transport.control_check().await {
                break;
            }

            if Instant::now() >= deadline {
                let _ = child.kill().await;
                return Err(VmError::Connection(format!(
                    "Timed out after {}s connecting to {}:{}",
                    cfg.connect_timeout.as_secs(),
                    cfg.host,
                    cfg.port
                )));
            }
            tokio::time::sleep(MASTER_POLL_INTERVAL).await;
        }

        *transport.master.lock().await = Some(child);
        Ok(transport)
    }

    fn base_args(&self) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            self.cfg.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "LogLevel=ERROR".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            // Keep known_hosts separate from the user's own file.
            format!(
                "UserKnownHostsFile={}",
                std::env::temp_dir()
                    .join("vm_control_known_hosts")
                    .to_string_lossy()
            ),
            "-o".to_string(),
            format!("ControlPath={}", self.control_path.to_string_lossy()),
        ];
        if let Some(identity) = &self.cfg.identity {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().to_string());
        }
        args
    }

    async fn control_check(&self) -> bool {
        if !self.control_path.exists() {
            return false;
        }
        Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.to_string_lossy()))
            .arg("-O")
            .arg("check")
            .arg(self.cfg.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn sftp_batch(&self, batch: &str) -> VmResult<()> {
        // sftp spells the port flag -P.
        let args: Vec<String> = self
            .base_args()
            .into_iter()
            .map(|a| if a == "-p" { "-P".to_string() } else { a })
            .collect();

        let mut cmd = Command::new("sftp");
        cmd.arg("-b").arg("-");
        cmd.args(args);
        cmd.arg(self.cfg.destination());
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| VmError::RemoteExecution {
            command: batch.trim().to_string(),
            exit_code: None,
            stderr: format!("Failed to start sftp: {}", e),
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(batch.as_bytes())
                .await
                .map_err(|e| VmError::io("Failed to write sftp batch", e))?;
        }

        let out = tokio::time::timeout(TRANSFER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| VmError::RemoteExecution {
                command: batch.trim().to_string(),
                exit_code: None,
                stderr: format!("sftp timed out after {}s", TRANSFER_TIMEOUT.as_secs()),
            })?
            .map_err(|e| VmError::io("Failed to wait for sftp", e))?;

        if !out.status.success() {
            return Err(VmError::RemoteExecution {
                command: batch.trim().to_string(),
                exit_code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for OpenSshTransport {
    async fn exec(&self, command: &str, timeout: Duration) -> VmResult<CommandOutput> {
        let mut cmd = Command::new("ssh");
        cmd.args(self.base_args())
            .arg("-o")
            .arg("ControlMaster=no")
            .arg(self.cfg.destination())
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let out = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => {
                return Err(VmError::RemoteExecution {
                    command: command.to_string(),
                    exit_code: None,
                    stderr: format!("Failed to execute ssh: {}", e),
                })
            }
            Err(_) => {
                return Err(VmError::RemoteExecution {
                    command: command.to_string(),
                    exit_code: None,
                    stderr: format!("timed out after {}s", timeout.as_secs_f64()),
                })
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            exit_code: out.status.code(),
        })
    }

    async fn put(&self, local: &Path, remote: &str) -> VmResult<()> {
        let batch = format!(
            "put {} {}\n",
            sftp_quote(&local.to_string_lossy()),
            sftp_quote(remote)
        );
        self.sftp_batch(&batch).await
    }

    async fn get(&self, remote: &str, local: &Path) -> VmResult<()> {
        let batch = format!(
            "get {} {}\n",
            sftp_quote(remote),
            sftp_quote(&local.to_string_lossy())
        );
        self.sftp_batch(&batch).await
    }

    async fn shutdown(&self) -> VmResult<()> {
        let exit = Command::new("ssh")
            .arg("-o")
            .arg(format!("ControlPath={}", self.control_path.to_string_lossy()))
            .arg("-O")
            .arg("exit")
            .arg(self.cfg.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = exit {
            tracing::warn!("ssh -O exit failed: {}", e);
        }

        if let Some(mut child) = self.master.lock().await.take() {
            if child.try_wait().ok().flatten().is_none() {
                let _ = child.kill().await;
            }
        }
        let _ = std::fs::remove_file(&self.control_path);
        Ok(())
    }
}

async fn read_stderr(child: &mut Child) -> String {
    use tokio::io::AsyncReadExt;

    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf).await;
    }
    buf
}

/// Quote a path for an sftp batch line.
fn sftp_quote(path: &str) -> String {
    format!("\"{}\"", path.replace('\\', "\\\\").replace('"', "\\\""))
}
