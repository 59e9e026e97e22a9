//! Executes actions against the remote session.
//!
//! Single actions propagate errors to the caller. Batches run strictly in
//! order and stop at the first element that fails; unknown kinds are
//! reported and skipped rather than treated as failures.

use std::fmt;

use serde_json::Value;

use crate::actions::{descriptor_kind, parse_descriptor, translate, Action, Descriptor, RemoteStep};
use crate::error::VmResult;
use crate::remote::Connection;

/// How one batch element ended.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOutcome {
    Done(String),
    Unknown(String),
    Failed { kind: String, message: String },
}

/// One numbered line of a batch summary.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchEntry {
    /// 1-based position in the submitted sequence
    pub index: usize,
    pub outcome: EntryOutcome,
}

impl BatchEntry {
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, EntryOutcome::Failed { .. })
    }
}

impl fmt::Display for BatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            EntryOutcome::Done(label) => write!(f, "{}. {}", self.index, label),
            EntryOutcome::Unknown(kind) => write!(f, "{}. UNKNOWN ACTION: {}", self.index, kind),
            EntryOutcome::Failed { kind, message } => {
                write!(f, "{}. ERROR in {}: {}", self.index, kind, message)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Number of actions submitted
    pub submitted: usize,
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    /// The entry that halted the batch, if any.
    pub fn failure(&self) -> Option<&BatchEntry> {
        self.entries.iter().find(|e| e.is_error())
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Executed {} actions:", self.entries.len())?;
        for entry in &self.entries {
            write!(f, "\n{}", entry)?;
        }
        Ok(())
    }
}

pub struct ActionRunner<'a> {
    connection: &'a Connection,
    display: &'a str,
}

impl<'a> ActionRunner<'a> {
    pub fn new(connection: &'a Connection, display: &'a str) -> Self {
        Self {
            connection,
            display,
        }
    }

    /// Execute one action and return a confirmation line.
    pub async fn perform(&self, action: &Action) -> VmResult<String> {
        self.execute(action).await?;
        Ok(confirmation(action))
    }

    /// Execute `descriptors` in order, halting at the first failure.
    pub async fn run_batch(&self, descriptors: &[Value]) -> BatchReport {
        let mut report = BatchReport {
            submitted: descriptors.len(),
            entries: Vec::with_capacity(descriptors.len()),
        };

        for (i, raw) in descriptors.iter().enumerate() {
            let index = i + 1;
            let kind = descriptor_kind(raw).unwrap_or("None").to_string();

            let result = match parse_descriptor(raw) {
                Ok(Descriptor::Unknown(name)) => {
                    tracing::warn!(index, kind = ?name, "Skipping unknown action");
                    report.entries.push(BatchEntry {
                        index,
                        outcome: EntryOutcome::Unknown(name.unwrap_or_else(|| "None".to_string())),
                    });
                    continue;
                }
                Ok(Descriptor::Known(action)) => {
                    self.execute(&action).await.map(|()| batch_label(&action))
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(label) => report.entries.push(BatchEntry {
                    index,
                    outcome: EntryOutcome::Done(label),
                }),
                Err(e) => {
                    tracing::warn!(index, kind = %kind, error = %e, "Batch halted");
                    report.entries.push(BatchEntry {
                        index,
                        outcome: EntryOutcome::Failed {
                            kind,
                            message: e.to_string(),
                        },
                    });
                    break;
                }
            }
        }

        report
    }

    async fn execute(&self, action: &Action) -> VmResult<()> {
        match translate(action, self.display) {
            RemoteStep::Command(cmd) => {
                self.connection.run(&cmd).await?;
            }
            RemoteStep::Sleep(duration) => tokio::time::sleep(duration).await,
        }
        Ok(())
    }
}

fn confirmation(action: &Action) -> String {
    match action {
        Action::MovePointer { x, y, mode } => format!("Mouse moved to ({}, {}) [{}]", x, y, mode),
        Action::Click { button, count } => format!("Clicked {} x{}", button, count),
        Action::TypeText { text } => format!("Typed {} characters", text.chars().count()),
        Action::PressKeys { keys } => format!("Pressed keys: {:?}", keys),
        Action::Pause { seconds } => format!("Waited {} seconds", seconds),
    }
}

fn batch_label(action: &Action) -> String {
    match action {
        Action::MovePointer { x, y, mode } => format!("move_mouse ({}, {}) [{}]", x, y, mode),
        Action::Click { button, count } => format!("click {} x{}", button, count),
        Action::TypeText { text } => format!("type_text ({} chars)", text.chars().count()),
        Action::PressKeys { keys } => format!("press_keys {:?}", keys),
        Action::Pause { seconds } => format!("wait {}s", seconds),
    }
}
