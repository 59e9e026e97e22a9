//! Tool system exposed to MCP clients.
//!
//! Every tool returns a plain-text outcome. Input tools (`move_mouse`,
//! `click`, ...) propagate failures as errors; batch, shell and file tools
//! fold failures into their text reply instead.
//!
//! ## Remote shell failures
//!
//! `ssh_execute` reports a nonzero exit code in-band and returns normally,
//! while an error raised inside `run_actions` halts the batch. The two are
//! different on purpose: the first is a reported outcome the caller asked to
//! inspect, the second means later UI steps can no longer be trusted.

mod input;
mod project;
mod remote_shell;
mod screenshot;

pub use screenshot::RESOURCE_SCHEME;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::session::SessionContext;

/// Information about a tool for `tools/list`.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Trait for implementing tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// A description of what this tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters.
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String>;
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new registry with every built-in tool.
    pub fn new() -> Self {
        let builtin: Vec<Arc<dyn Tool>> = vec![
            // Mouse / keyboard / wait
            Arc::new(input::MoveMouse),
            Arc::new(input::Click),
            Arc::new(input::TypeText),
            Arc::new(input::PressKeys),
            Arc::new(input::Wait),
            Arc::new(input::RunActions),
            // Remote shell and file transfer
            Arc::new(remote_shell::SshExecute),
            Arc::new(remote_shell::SshUpload),
            Arc::new(remote_shell::SshDownload),
            Arc::new(remote_shell::SshConnectionInfo),
            // Project records
            Arc::new(project::ProjectInit),
            Arc::new(project::ProjectInfo),
            Arc::new(project::ProjectLog),
            Arc::new(project::ProjectReadLogs),
            Arc::new(project::ProjectSaveResult),
            Arc::new(project::ProjectSaveAdvice),
            Arc::new(project::ProjectReadAdvice),
            Arc::new(project::ProjectList),
            Arc::new(project::ProjectLoad),
            // Screenshots
            Arc::new(screenshot::TakeScreenshot),
        ];

        let tools: HashMap<String, Arc<dyn Tool>> = builtin
            .into_iter()
            .map(|t| (t.name().to_string(), t))
            .collect();
        tracing::debug!("Tool registry ready with {} tools", tools.len());
        Self { tools }
    }

    /// List all available tools, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        let mut tools: Vec<ToolInfo> = self
            .tools
            .values()
            .map(|t| ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        session: &mut SessionContext,
    ) -> anyhow::Result<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown tool: {}", name))?;

        tracing::debug!(tool = %name, "Executing tool");
        tool.execute(args, session).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn required_str<'a>(args: &'a Value, key: &str) -> anyhow::Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

fn optional_str<'a>(args: &'a Value, key: &str, default: &'a str) -> &'a str {
    args.get(key).and_then(|v| v.as_str()).unwrap_or(default)
}

fn required_i64(args: &Value, key: &str) -> anyhow::Result<i64> {
    args.get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| anyhow::anyhow!("Missing '{}' argument", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::session;
    use serde_json::json;

    #[test]
    fn registry_lists_every_tool_sorted() {
        let registry = ToolRegistry::new();
        let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 20);
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert!(registry.has_tool("run_actions"));
        assert!(registry.has_tool("take_screenshot"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let (mut ctx, _) = session(temp.path());
        let err = ToolRegistry::new()
            .execute("teleport", json!({}), &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: teleport");
    }

    #[test]
    fn argument_helpers() {
        let args = json!({"name": "demo", "x": 4});
        assert_eq!(required_str(&args, "name").unwrap(), "demo");
        assert!(required_str(&args, "missing").is_err());
        assert_eq!(optional_str(&args, "mode", "absolute"), "absolute");
        assert_eq!(required_i64(&args, "x").unwrap(), 4);
    }
}
