//! Full-screen capture into the active project.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Tool;
use crate::error::VmResult;
use crate::project::{screenshot_id, Project};
use crate::remote::Connection;
use crate::session::SessionContext;

pub const RESOURCE_SCHEME: &str = "vm://screenshot/";

pub fn resource_uri(screenshot_id: &str) -> String {
    format!("{}{}", RESOURCE_SCHEME, screenshot_id)
}

fn remote_capture_path(screenshot_id: &str) -> String {
    format!("/tmp/mcp-screenshot-{}.png", screenshot_id)
}

/// Capture on the VM, pull the file into `screenshots/`, then remove the remote copy.
/// The remote copy is removed whether or not the download succeeded.
async fn capture(
    connection: &Connection,
    display: &str,
    project: &Project,
    sid: &str,
) -> VmResult<std::path::PathBuf> {
    let remote_path = remote_capture_path(sid);
    connection
        .run(&format!("DISPLAY={} scrot \"{}\"", display, remote_path))
        .await?;

    let local_path = project.screenshot_path(sid);
    let downloaded = download(connection, &remote_path, &local_path).await;

    if let Err(e) = connection.run(&format!("rm -f \"{}\"", remote_path)).await {
        tracing::warn!(remote = %remote_path, error = %e, "Failed to remove remote screenshot");
    }
    downloaded.map(|()| local_path)
}

async fn download(connection: &Connection, remote: &str, local: &std::path::Path) -> VmResult<()> {
    connection.transfer().await?.get(remote, local).await
}

pub struct TakeScreenshot;

#[async_trait]
impl Tool for TakeScreenshot {
    fn name(&self) -> &str {
        "take_screenshot"
    }

    fn description(&self) -> &str {
        "Take a full-screen screenshot and save it to the current project. Requires an active project (call project_init first). Returns the local path and a vm://screenshot/<id> resource URI."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let project = session.require_project()?;
        let sid = screenshot_id();
        let recorder = session.recorder();

        match capture(session.connection(), &session.remote().display, project, &sid).await {
            Ok(local_path) => {
                recorder.note(&format!("Screenshot captured: {}", sid));
                Ok(format!(
                    "Screenshot captured: {}\nResource URI: {}",
                    local_path.display(),
                    resource_uri(&sid)
                ))
            }
            Err(e) => {
                recorder.error(self.name(), &e.to_string());
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::DOWNLOADED_BYTES;
    use crate::session::test_support::session;

    #[tokio::test]
    async fn capture_downloads_and_cleans_up() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut ctx, transport) = session(temp.path());
        let project = ctx.store().create("demo", "").unwrap();
        ctx.set_project(project);

        let reply = TakeScreenshot.execute(json!({}), &mut ctx).await.unwrap();
        assert!(reply.contains("\nResource URI: vm://screenshot/"));

        let commands = transport.commands();
        assert_eq!(commands.len(), 2);
        assert!(commands[0].starts_with("DISPLAY=:0 scrot \"/tmp/mcp-screenshot-"));
        assert!(commands[1].starts_with("rm -f \"/tmp/mcp-screenshot-"));

        let sid = reply.rsplit('/').next().unwrap();
        let bytes = ctx.store().find_screenshot(sid).unwrap();
        assert_eq!(bytes, DOWNLOADED_BYTES);

        let log = std::fs::read_to_string(ctx.require_project().unwrap().log_path()).unwrap();
        assert!(log.contains(&format!("[INFO] Screenshot captured: {}", sid)));
    }

    #[tokio::test]
    async fn requires_active_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut ctx, transport) = session(temp.path());
        assert!(TakeScreenshot.execute(json!({}), &mut ctx).await.is_err());
        assert!(transport.commands().is_empty());
    }

    #[tokio::test]
    async fn failed_capture_is_recorded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut ctx, transport) = session(temp.path());
        transport.fail_matching("scrot", 2, "Can't open X display");
        let project = ctx.store().create("demo", "").unwrap();
        ctx.set_project(project);

        assert!(TakeScreenshot.execute(json!({}), &mut ctx).await.is_err());
        assert!(transport.transfers().is_empty());
        let log = std::fs::read_to_string(ctx.require_project().unwrap().log_path()).unwrap();
        assert!(log.contains("[ERROR] ERROR in take_screenshot:"));
    }

    #[tokio::test]
    async fn failed_download_still_removes_remote_copy() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut ctx, transport) = session(temp.path());
        transport.fail_transfers("connection reset");
        let project = ctx.store().create("demo", "").unwrap();
        ctx.set_project(project);

        let err = TakeScreenshot.execute(json!({}), &mut ctx).await.unwrap_err();
        assert!(err.to_string().contains("connection reset"));

        let commands = transport.commands();
        assert_eq!(commands.len(), 2);
        let remote = commands[0]
            .strip_prefix("DISPLAY=:0 scrot ")
            .unwrap()
            .trim_matches('"');
        assert_eq!(commands[1], format!("rm -f \"{}\"", remote));
        assert_eq!(transport.transfers().len(), 1);
    }

    #[test]
    fn uri_and_remote_path() {
        assert_eq!(resource_uri("abc"), "vm://screenshot/abc");
        assert_eq!(remote_capture_path("abc"), "/tmp/mcp-screenshot-abc.png");
    }
}
