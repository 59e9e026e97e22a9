//! UI actions for the remote desktop.
//!
//! Batch requests arrive as loosely-typed JSON objects (`{"action": "click", ...}`).
//! [`parse_descriptor`] is the single boundary that turns one of those into a
//! typed [`Action`], separating unknown kinds from malformed fields.

mod translate;

pub use translate::{translate, RemoteStep, TYPE_DELAY_MS};

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{VmError, VmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerMode {
    Absolute,
    Relative,
}

impl FromStr for PointerMode {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absolute" => Ok(Self::Absolute),
            "relative" => Ok(Self::Relative),
            _ => Err(VmError::validation("mode must be 'absolute' or 'relative'")),
        }
    }
}

impl fmt::Display for PointerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Absolute => "absolute",
            Self::Relative => "relative",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// X11 button number.
    pub fn index(self) -> u8 {
        match self {
            Self::Left => 1,
            Self::Middle => 2,
            Self::Right => 3,
        }
    }
}

impl FromStr for MouseButton {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(Self::Left),
            "middle" => Ok(Self::Middle),
            "right" => Ok(Self::Right),
            _ => Err(VmError::validation("button must be left/middle/right")),
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Middle => "middle",
            Self::Right => "right",
        })
    }
}

/// One atomic UI instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    MovePointer { x: i64, y: i64, mode: PointerMode },
    Click { button: MouseButton, count: u32 },
    TypeText { text: String },
    PressKeys { keys: Vec<String> },
    Pause { seconds: f64 },
}

impl Action {
    pub fn move_pointer(x: i64, y: i64, mode: &str) -> VmResult<Self> {
        Ok(Self::MovePointer {
            x,
            y,
            mode: mode.parse()?,
        })
    }

    pub fn click(button: &str, count: u32) -> VmResult<Self> {
        if count == 0 {
            return Err(VmError::validation("count must be at least 1"));
        }
        Ok(Self::Click {
            button: button.parse()?,
            count,
        })
    }

    pub fn type_text(text: impl Into<String>) -> Self {
        Self::TypeText { text: text.into() }
    }

    pub fn press_keys(keys: Vec<String>) -> VmResult<Self> {
        if keys.is_empty() || keys.iter().any(|k| k.trim().is_empty()) {
            return Err(VmError::validation("keys must be a non-empty list of key names"));
        }
        if let Some(bad) = keys.iter().find(|k| !is_keysym_name(k)) {
            return Err(VmError::validation(format!(
                "invalid key name {:?}: only letters, digits and '_' are allowed",
                bad
            )));
        }
        Ok(Self::PressKeys { keys })
    }

    pub fn pause(seconds: f64) -> VmResult<Self> {
        if std::time::Duration::try_from_secs_f64(seconds).is_err() {
            return Err(VmError::validation("seconds must be a non-negative number"));
        }
        Ok(Self::Pause { seconds })
    }

    /// Batch name of this action.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MovePointer { .. } => "move_mouse",
            Self::Click { .. } => "click",
            Self::TypeText { .. } => "type_text",
            Self::PressKeys { .. } => "press_keys",
            Self::Pause { .. } => "wait",
        }
    }
}

/// Outcome of parsing one batch element.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Known(Action),
    /// The `action` field was missing or named no known kind.
    Unknown(Option<String>),
}

/// Read the declared kind of a descriptor without validating the rest.
pub fn descriptor_kind(value: &Value) -> Option<&str> {
    value.get("action").and_then(|v| v.as_str())
}

/// Convert an untyped batch element into an [`Action`].
///
/// Missing fields fall back to the same defaults the single-action tools use.
/// A recognized kind with a malformed field is a [`VmError::Validation`].
pub fn parse_descriptor(value: &Value) -> VmResult<Descriptor> {
    let Some(kind) = descriptor_kind(value) else {
        return Ok(Descriptor::Unknown(
            value.get("action").map(|v| v.to_string()),
        ));
    };

    let action = match kind {
        "press_keys" => {
            let keys = match value.get("keys") {
                None => Vec::new(),
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|k| {
                        k.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| VmError::validation("keys must be strings"))
                    })
                    .collect::<VmResult<Vec<_>>>()?,
                Some(_) => return Err(VmError::validation("keys must be a list")),
            };
            Action::press_keys(keys)?
        }
        "type_text" => Action::type_text(str_field(value, "text", "")?),
        "click" => {
            let button = str_field(value, "button", "left")?;
            let count = int_field(value, "count", 1)?;
            let count = u32::try_from(count)
                .map_err(|_| VmError::validation("count must be a positive integer"))?;
            Action::click(&button, count)?
        }
        "move_mouse" => {
            let x = int_field(value, "x", 0)?;
            let y = int_field(value, "y", 0)?;
            let mode = str_field(value, "mode", "absolute")?;
            Action::move_pointer(x, y, &mode)?
        }
        "wait" => {
            let seconds = match value.get("seconds") {
                None => 0.5,
                Some(v) => v
                    .as_f64()
                    .ok_or_else(|| VmError::validation("seconds must be a number"))?,
            };
            Action::pause(seconds)?
        }
        other => return Ok(Descriptor::Unknown(Some(other.to_string()))),
    };
    Ok(Descriptor::Known(action))
}

/// X keysym names (`Return`, `F4`, `KP_Enter`, `a`) are plain identifiers.
fn is_keysym_name(key: &str) -> bool {
    key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn str_field(value: &Value, key: &str, default: &str) -> VmResult<String> {
    match value.get(key) {
        None => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(VmError::validation(format!("{} must be a string", key))),
    }
}

fn int_field(value: &Value, key: &str, default: i64) -> VmResult<i64> {
    match value.get(key) {
        None => Ok(default),
        Some(v) => v
            .as_i64()
            .ok_or_else(|| VmError::validation(format!("{} must be an integer", key))),
    }
}
