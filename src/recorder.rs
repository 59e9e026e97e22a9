//! Project-scoped activity log for tool calls.
//!
//! Recording happens after the operation's outcome is fixed. A failed
//! append is reported through `tracing` and never changes what the caller
//! gets back. Without an active project every call is a no-op.

use crate::project::Project;

const MAX_PARAM_CHARS: usize = 100;
const MAX_RESULT_CHARS: usize = 200;

/// Truncate to `max` characters, marking the cut with `...`.
pub fn truncate(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((byte_idx, _)) => format!("{}...", &value[..byte_idx]),
        None => value.to_string(),
    }
}

/// `TOOL: name(k=v, ...) -> result`
pub fn format_call(tool: &str, params: &[(&str, String)], result: Option<&str>) -> String {
    let params = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, truncate(v, MAX_PARAM_CHARS)))
        .collect::<Vec<_>>()
        .join(", ");
    let mut line = format!("TOOL: {}({})", tool, params);
    if let Some(result) = result.filter(|r| !r.is_empty()) {
        line.push_str(" -> ");
        line.push_str(&truncate(result, MAX_RESULT_CHARS));
    }
    line
}

#[derive(Debug, Clone, Copy)]
pub struct Recorder<'a> {
    project: Option<&'a Project>,
}

impl<'a> Recorder<'a> {
    pub fn new(project: Option<&'a Project>) -> Self {
        Self { project }
    }

    pub fn call(&self, tool: &str, params: &[(&str, String)], result: Option<&str>) {
        self.append(&format_call(tool, params, result), "INFO");
    }

    pub fn error(&self, tool: &str, error: &str) {
        self.append(&format!("ERROR in {}: {}", tool, error), "ERROR");
    }

    /// Free-form line, e.g. "Screenshot captured: <id>".
    pub fn note(&self, message: &str) {
        self.append(message, "INFO");
    }

    fn append(&self, message: &str, level: &str) {
        let Some(project) = self.project else {
            return;
        };
        if let Err(e) = project.log(message, level) {
            tracing::warn!(project = %project.path.display(), error = %e, "Failed to record activity");
        }
    }
}
