//! Mouse, keyboard and batch tools.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{optional_str, required_i64, required_str, Tool};
use crate::actions::Action;
use crate::error::VmResult;
use crate::session::SessionContext;

/// Execute one action, record the outcome, and propagate any failure.
async fn perform_recorded(
    session: &SessionContext,
    tool: &str,
    params: &[(&str, String)],
    action: VmResult<Action>,
) -> anyhow::Result<String> {
    let outcome = match action {
        Ok(action) => session.runner().perform(&action).await,
        Err(e) => Err(e),
    };

    let recorder = session.recorder();
    match outcome {
        Ok(reply) => {
            recorder.call(tool, params, Some(&reply));
            Ok(reply)
        }
        Err(e) => {
            recorder.error(tool, &e.to_string());
            Err(e.into())
        }
    }
}

/// Log rendering of typed text: short strings verbatim, long ones masked.
fn masked_text(text: &str) -> String {
    let len = text.chars().count();
    if len <= 20 {
        text.to_string()
    } else {
        let head: String = text.chars().take(10).collect();
        format!("{}...({} chars)", head, len)
    }
}

pub struct MoveMouse;

#[async_trait]
impl Tool for MoveMouse {
    fn name(&self) -> &str {
        "move_mouse"
    }

    fn description(&self) -> &str {
        "Move the mouse cursor. mode: \"absolute\" (screen coordinates) or \"relative\" (offset from the current position)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "x": { "type": "integer", "description": "X coordinate or offset" },
                "y": { "type": "integer", "description": "Y coordinate or offset" },
                "mode": {
                    "type": "string",
                    "enum": ["absolute", "relative"],
                    "description": "Movement mode (default: 'absolute')"
                }
            },
            "required": ["x", "y"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let x = required_i64(&args, "x")?;
        let y = required_i64(&args, "y")?;
        let mode = optional_str(&args, "mode", "absolute");
        let params = [
            ("x", x.to_string()),
            ("y", y.to_string()),
            ("mode", mode.to_string()),
        ];
        perform_recorded(session, self.name(), &params, Action::move_pointer(x, y, mode)).await
    }
}

pub struct Click;

#[async_trait]
impl Tool for Click {
    fn name(&self) -> &str {
        "click"
    }

    fn description(&self) -> &str {
        "Click a mouse button at the current cursor position. button: left/right/middle."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "button": {
                    "type": "string",
                    "enum": ["left", "middle", "right"],
                    "description": "Mouse button (default: 'left')"
                },
                "count": {
                    "type": "integer",
                    "minimum": 1,
                    "description": "Number of clicks (default: 1)"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let button = optional_str(&args, "button", "left");
        let count = match args.get("count") {
            None => 1,
            Some(v) => v
                .as_u64()
                .and_then(|c| u32::try_from(c).ok())
                .ok_or_else(|| anyhow::anyhow!("'count' must be a positive integer"))?,
        };
        let params = [("button", button.to_string()), ("count", count.to_string())];
        perform_recorded(session, self.name(), &params, Action::click(button, count)).await
    }
}

pub struct TypeText;

#[async_trait]
impl Tool for TypeText {
    fn name(&self) -> &str {
        "type_text"
    }

    fn description(&self) -> &str {
        "Type literal text into the VM."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to type" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let text = required_str(&args, "text")?;
        let params = [("text", masked_text(text))];
        perform_recorded(session, self.name(), &params, Ok(Action::type_text(text))).await
    }
}

pub struct PressKeys;

#[async_trait]
impl Tool for PressKeys {
    fn name(&self) -> &str {
        "press_keys"
    }

    fn description(&self) -> &str {
        "Press a key combination, e.g. [\"Ctrl\", \"L\"] or [\"Alt\", \"F4\"]."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keys": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Key names pressed together, in order"
                }
            },
            "required": ["keys"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let keys: Vec<String> = args
            .get("keys")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Missing 'keys' argument"))?
            .iter()
            .map(|k| {
                k.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("'keys' must be a list of strings"))
            })
            .collect::<anyhow::Result<_>>()?;
        let params = [("keys", format!("{:?}", keys))];
        perform_recorded(session, self.name(), &params, Action::press_keys(keys)).await
    }
}

pub struct Wait;

#[async_trait]
impl Tool for Wait {
    fn name(&self) -> &str {
        "wait"
    }

    fn description(&self) -> &str {
        "Pause for the given number of seconds."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "seconds": { "type": "number", "minimum": 0, "description": "Seconds to wait" }
            },
            "required": ["seconds"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let seconds = args
            .get("seconds")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| anyhow::anyhow!("Missing 'seconds' argument"))?;
        let params = [("seconds", seconds.to_string())];
        perform_recorded(session, self.name(), &params, Action::pause(seconds)).await
    }
}

pub struct RunActions;

#[async_trait]
impl Tool for RunActions {
    fn name(&self) -> &str {
        "run_actions"
    }

    fn description(&self) -> &str {
        "Execute a sequence of UI actions in one call to reduce latency. Each action is an object with an \"action\" key: \
         press_keys {keys}, type_text {text}, click {button, count}, move_mouse {x, y, mode}, wait {seconds}. \
         Actions run in order; the sequence stops at the first action that fails. Unknown actions are reported and skipped."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "actions": {
                    "type": "array",
                    "items": { "type": "object" },
                    "description": "Ordered list of action objects, e.g. [{\"action\": \"press_keys\", \"keys\": [\"Ctrl\", \"Shift\", \"p\"]}, {\"action\": \"wait\", \"seconds\": 0.5}]"
                }
            },
            "required": ["actions"]
        })
    }

    async fn execute(&self, args: Value, session: &mut SessionContext) -> anyhow::Result<String> {
        let actions = args
            .get("actions")
            .and_then(|v| v.as_array())
            .ok_or_else(|| anyhow::anyhow!("Missing 'actions' argument"))?;

        let report = session.runner().run_batch(actions).await;

        let recorder = session.recorder();
        if let Some(failed) = report.failure() {
            if let crate::orchestrator::EntryOutcome::Failed { kind, message } = &failed.outcome {
                recorder.error(
                    self.name(),
                    &format!("Action {} ({}): {}", failed.index, kind, message),
                );
            }
        }
        recorder.call(
            self.name(),
            &[("count", report.submitted.to_string())],
            Some(&format!("executed {} actions", report.entries.len())),
        );
        Ok(report.to_string())
    }
}
