//! Shell execution and SFTP transfer over the remote session.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Tool};
use crate::error::{VmError, VmResult};
use crate::remote::CommandOutput;
use crate::session::SessionContext;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

fn render_output(output: &CommandOutput) -> String {
    let mut parts = Vec::new();
    if !output.stdout.is_empty() {
        parts.push(format!("STDOUT:\n{}", output.stdout));
    }
    if !output.stderr.is_empty() {
        parts.push(format!("STDERR:\n{}", output.stderr));
    }
    if !output.success() {
        parts.push(format!("EXIT CODE: {}", output.exit_code.unwrap_or(-1)));
    }
    if parts.is_empty() {
        "Command completed (no output)".to_string()
    } else {
        parts.join("\n\n")
    }
}

pub struct SshExecute;

#[async_trait]
impl Tool for SshExecute {
    fn name(&self) -> &str {
        "ssh_execute"
    }

    fn description(&self) -> &str {
        "Execute an arbitrary shell command on the VM. Returns STDOUT, STDERR and, for a nonzero exit, the EXIT CODE. A failing command is reported, not raised."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to execute" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let command = required_str(&args, "command")?;
        let params = [("command", command.to_string())];

        let outcome = session.connection().run_unchecked(command).await;
        let recorder = session.recorder();
        match outcome {
            Ok(output) => {
                if output.success() {
                    recorder.call(self.name(), &params, Some("success"));
                } else {
                    let code = output.exit_code.unwrap_or(-1);
                    recorder.call(self.name(), &params, Some(&format!("exit_code={}", code)));
                    recorder.error(
                        self.name(),
                        &format!("Command failed with exit code {}", code),
                    );
                }
                Ok(render_output(&output))
            }
            Err(e) => {
                recorder.error(self.name(), &e.to_string());
                Ok(format!("Error executing command: {}", e))
            }
        }
    }
}

pub struct SshUpload;

#[async_trait]
impl Tool for SshUpload {
    fn name(&self) -> &str {
        "ssh_upload"
    }

    fn description(&self) -> &str {
        "Upload a file from the host to the VM via SFTP."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "local_path": { "type": "string", "description": "Path to the local file to upload" },
                "remote_path": { "type": "string", "description": "Destination path on the VM" }
            },
            "required": ["local_path", "remote_path"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let local_path = required_str(&args, "local_path")?;
        let remote_path = required_str(&args, "remote_path")?;
        let recorder = session.recorder();

        let local = Path::new(local_path);
        if !local.exists() {
            let err = VmError::NotFound(format!("Local file not found: {}", local_path));
            recorder.error(self.name(), &err.to_string());
            return Ok(format!("Error: {}", err));
        }

        let outcome = match session.connection().transfer().await {
            Ok(channel) => channel.put(local, remote_path).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                recorder.call(
                    self.name(),
                    &[
                        ("local_path", local_path.to_string()),
                        ("remote_path", remote_path.to_string()),
                    ],
                    Some("success"),
                );
                Ok(format!(
                    "Successfully uploaded {} to {}",
                    local_path, remote_path
                ))
            }
            Err(e) => {
                recorder.error(self.name(), &e.to_string());
                Ok(format!("Error uploading file: {}", e))
            }
        }
    }
}

pub struct SshDownload;

#[async_trait]
impl Tool for SshDownload {
    fn name(&self) -> &str {
        "ssh_download"
    }

    fn description(&self) -> &str {
        "Download a file from the VM to the host via SFTP. Missing local parent directories are created."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "remote_path": { "type": "string", "description": "Path to the file on the VM" },
                "local_path": { "type": "string", "description": "Destination path on the host" }
            },
            "required": ["remote_path", "local_path"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let remote_path = required_str(&args, "remote_path")?;
        let local_path = required_str(&args, "local_path")?;
        let recorder = session.recorder();
        let local = Path::new(local_path);

        let outcome: VmResult<()> = async {
            if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| VmError::io_at("create", parent, e))?;
            }
            let channel = session.connection().transfer().await?;
            channel.get(remote_path, local).await
        }
        .await;

        match outcome {
            Ok(()) => {
                recorder.call(
                    self.name(),
                    &[
                        ("remote_path", remote_path.to_string()),
                        ("local_path", local_path.to_string()),
                    ],
                    Some("success"),
                );
                Ok(format!(
                    "Successfully downloaded {} to {}",
                    remote_path, local_path
                ))
            }
            Err(e) => {
                recorder.error(self.name(), &e.to_string());
                Ok(format!("Error downloading file: {}", e))
            }
        }
    }
}

pub struct SshConnectionInfo;

#[async_trait]
impl Tool for SshConnectionInfo {
    fn name(&self) -> &str {
        "ssh_connection_info"
    }

    fn description(&self) -> &str {
        "Get information about the current SSH connection to the VM, including a liveness check."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let recorder = session.recorder();
        let probe = session
            .connection()
            .run_with_timeout("echo 'connection_test'", PROBE_TIMEOUT)
            .await;

        let status = match probe {
            Ok(out) if out.success() => "Connected".to_string(),
            Ok(out) => {
                let msg = format!(
                    "probe exited with code {}: {}",
                    out.exit_code.unwrap_or(-1),
                    out.stderr.trim()
                );
                recorder.error(self.name(), &msg);
                format!("Connection issue: {}", msg)
            }
            Err(e) => {
                recorder.error(self.name(), &e.to_string());
                format!("Connection issue: {}", e)
            }
        };
        recorder.call(self.name(), &[], Some(&status));

        let remote = session.remote();
        let identity = remote
            .identity
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "Not specified (using password/agent)".to_string());

        Ok(format!(
            "SSH Connection Information:\nHost: {}\nPort: {}\nUser: {}\nDisplay: {}\nStatus: {}\nIdentity File: {}",
            remote.host, remote.port, remote.user, remote.display, status, identity
        ))
    }
}
