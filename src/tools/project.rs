//! Project record tools: init, load, logs, results and advice.

use std::fmt::Write as _;
use std::path::Path;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{optional_str, required_str, Tool};
use crate::project::{AdviceNote, LogExcerpt, Project, ProjectListing, SCREENSHOTS_DIR};
use crate::project::{ADVICE_DIR, LOGS_DIR, RESULTS_DIR};
use crate::session::SessionContext;

const ADVICE_PREVIEW_CHARS: usize = 200;
const DEFAULT_LOG_LINES: u64 = 50;

fn or_none(description: &str) -> &str {
    if description.is_empty() {
        "(none)"
    } else {
        description
    }
}

fn no_params() -> Value {
    json!({
        "type": "object",
        "properties": {},
        "required": []
    })
}

/// Read every advice note, failing on the first unreadable file.
fn collect_advice(project: &Project) -> anyhow::Result<Vec<AdviceNote>> {
    let notes = project.read_advice()?;
    Ok(notes.iter().collect::<Result<Vec<_>, _>>()?)
}

pub struct ProjectInit;

#[async_trait]
impl Tool for ProjectInit {
    fn name(&self) -> &str {
        "project_init"
    }

    fn description(&self) -> &str {
        "Initialize a new project. Creates a project folder with screenshots/, logs/, results/ and advice/ subdirectories and makes it the active project."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "Project name (used in the folder name)" },
                "description": { "type": "string", "description": "Optional project description" }
            },
            "required": ["name"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let name = required_str(&args, "name")?;
        let description = optional_str(&args, "description", "");

        let project = session.store().create(name, description)?;
        let project = session.set_project(project);

        Ok(format!(
            "Project initialized:\nName: {}\nPath: {}\nDescription: {}\n\nFolders created:\n- {}/\n- {}/\n- {}/\n- {}/",
            project.name,
            project.path.display(),
            or_none(&project.description),
            SCREENSHOTS_DIR,
            LOGS_DIR,
            RESULTS_DIR,
            ADVICE_DIR,
        ))
    }
}

pub struct ProjectInfo;

#[async_trait]
impl Tool for ProjectInfo {
    fn name(&self) -> &str {
        "project_info"
    }

    fn description(&self) -> &str {
        "Get information and statistics about the current project."
    }

    fn parameters_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let info = session.require_project()?.info()?;
        Ok(format!(
            "Project Information:\nName: {}\nPath: {}\nCreated: {}\nDescription: {}\n\nStatistics:\n- Screenshots: {}\n- Results: {}\n- Log entries: {}",
            info.name,
            info.path.display(),
            info.created_at,
            or_none(&info.description),
            info.screenshot_count,
            info.result_count,
            info.log_entries,
        ))
    }
}

pub struct ProjectLog;

#[async_trait]
impl Tool for ProjectLog {
    fn name(&self) -> &str {
        "project_log"
    }

    fn description(&self) -> &str {
        "Add a log entry to the current project."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": { "type": "string", "description": "Log message" },
                "level": {
                    "type": "string",
                    "description": "Log level: INFO, WARNING, ERROR or DEBUG (default: INFO)"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let message = required_str(&args, "message")?;
        let level = optional_str(&args, "level", "INFO");
        session.require_project()?.log(message, level)?;
        Ok(format!("Logged: [{}] {}", level, message))
    }
}

pub struct ProjectReadLogs;

#[async_trait]
impl Tool for ProjectReadLogs {
    fn name(&self) -> &str {
        "project_read_logs"
    }

    fn description(&self) -> &str {
        "Read the most recent lines of the project log, optionally filtered by level."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "lines": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Number of recent log lines to return (default: 50)"
                },
                "level_filter": {
                    "type": "string",
                    "description": "Only return lines of this level (INFO, WARNING, ERROR, DEBUG)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let lines = match args.get("lines") {
            None => DEFAULT_LOG_LINES,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| anyhow::anyhow!("'lines' must be a non-negative integer"))?,
        };
        let level_filter = optional_str(&args, "level_filter", "");
        let limit = usize::try_from(lines).unwrap_or(usize::MAX);

        match session.require_project()?.read_logs(limit, level_filter)? {
            LogExcerpt::NoLogFile => Ok("No log entries yet.".to_string()),
            LogExcerpt::Entries { lines, .. } if lines.is_empty() => {
                if level_filter.is_empty() {
                    Ok("No log entries found.".to_string())
                } else {
                    Ok(format!("No log entries found with level {}.", level_filter))
                }
            }
            LogExcerpt::Entries { lines, total } => Ok(format!(
                "Log entries ({} of {} total):\n\n{}",
                lines.len(),
                total,
                lines.join("\n")
            )),
        }
    }
}

pub struct ProjectSaveResult;

#[async_trait]
impl Tool for ProjectSaveResult {
    fn name(&self) -> &str {
        "project_save_result"
    }

    fn description(&self) -> &str {
        "Save a result file to the current project's results folder. An existing file with the same name is overwritten."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "filename": { "type": "string", "description": "Name for the result file" },
                "content": { "type": "string", "description": "Content to save" }
            },
            "required": ["filename", "content"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let filename = required_str(&args, "filename")?;
        let content = required_str(&args, "content")?;
        let path = session.require_project()?.save_result(filename, content)?;
        Ok(format!("Result saved to: {}", path.display()))
    }
}

pub struct ProjectSaveAdvice;

#[async_trait]
impl Tool for ProjectSaveAdvice {
    fn name(&self) -> &str {
        "project_save_advice"
    }

    fn description(&self) -> &str {
        "Save advice for future sessions working with this project: lessons learned, environment-specific tips. Markdown is supported."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Short title, e.g. \"Focus management in Citrix\"" },
                "content": { "type": "string", "description": "Detailed advice content" }
            },
            "required": ["title", "content"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let title = required_str(&args, "title")?;
        let content = required_str(&args, "content")?;
        let path = session.require_project()?.save_advice(title, content)?;
        Ok(format!("Advice saved: {}\nPath: {}", title, path.display()))
    }
}

pub struct ProjectReadAdvice;

#[async_trait]
impl Tool for ProjectReadAdvice {
    fn name(&self) -> &str {
        "project_read_advice"
    }

    fn description(&self) -> &str {
        "Read all advice saved for this project by previous sessions."
    }

    fn parameters_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let project = session.require_project()?;
        let notes = collect_advice(project)?;
        if notes.is_empty() {
            return Ok("No advice saved for this project yet.".to_string());
        }

        let mut output = format!(
            "## Advice for project '{}' ({} entries)\n\n",
            project.name,
            notes.len()
        );
        for (i, note) in notes.iter().enumerate() {
            let _ = write!(
                output,
                "### {}. {}\n{}\n\n_Source: {}_\n\n---\n\n",
                i + 1,
                note.title,
                note.content,
                note.file
            );
        }
        Ok(output)
    }
}

pub struct ProjectList;

#[async_trait]
impl Tool for ProjectList {
    fn name(&self) -> &str {
        "project_list"
    }

    fn description(&self) -> &str {
        "List all existing projects, newest first."
    }

    fn parameters_schema(&self) -> Value {
        no_params()
    }

    async fn execute(&self, _args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let listing = session.store().list()?;
        if listing.is_empty() {
            return Ok("No projects found.".to_string());
        }
        let rows: Vec<String> = listing.iter().map(ProjectListing::to_string).collect();
        Ok(format!("Projects:\n{}", rows.join("\n")))
    }
}

pub struct ProjectLoad;

#[async_trait]
impl Tool for ProjectLoad {
    fn name(&self) -> &str {
        "project_load"
    }

    fn description(&self) -> &str {
        "Load an existing project by its path and make it the active project. Any saved advice is included in the reply."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_path": { "type": "string", "description": "Full path to the project folder" }
            },
            "required": ["project_path"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let project_path = required_str(&args, "project_path")?;
        let path = Path::new(project_path);
        if !path.exists() {
            return Ok(format!("Error: Project path not found: {}", project_path));
        }

        let loaded = Project::load(path).and_then(|p| {
            p.log("Project loaded", "INFO")?;
            Ok(p)
        });
        let project = match loaded {
            Ok(project) => session.set_project(project),
            Err(e) => return Ok(format!("Error loading project: {}", e)),
        };

        let info = project.info()?;
        let mut output = format!(
            "Project loaded:\nName: {}\nPath: {}\nCreated: {}\nScreenshots: {}\nResults: {}",
            info.name,
            info.path.display(),
            info.created_at,
            info.screenshot_count,
            info.result_count,
        );

        let notes = collect_advice(project)?;
        if !notes.is_empty() {
            let _ = write!(
                output,
                "\n\n## ADVICE FOR THIS PROJECT ({} tips)\nRead these tips from previous sessions before proceeding:\n\n",
                notes.len()
            );
            for (i, note) in notes.iter().enumerate() {
                let mut preview: String = note.content.chars().take(ADVICE_PREVIEW_CHARS).collect();
                if note.content.chars().count() > ADVICE_PREVIEW_CHARS {
                    preview.push_str("...");
                }
                let _ = write!(output, "**{}. {}**\n{}\n\n", i + 1, note.title, preview);
            }
        }
        Ok(output)
    }
}
