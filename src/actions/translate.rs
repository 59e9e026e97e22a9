//! Action → xdotool command line.

use std::time::Duration;

use super::{Action, PointerMode};

/// Per-keystroke delay passed to `xdotool type`.
pub const TYPE_DELAY_MS: u64 = 10;

/// What executing an action amounts to.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStep {
    /// Shell command to run on the VM.
    Command(String),
    /// Local pause; nothing is sent to the VM.
    Sleep(Duration),
}

pub fn translate(action: &Action, display: &str) -> RemoteStep {
    let command = match action {
        Action::MovePointer {
            x,
            y,
            mode: PointerMode::Absolute,
        } => format!("DISPLAY={} xdotool mousemove --sync {} {}", display, x, y),
        // `--` keeps negative offsets from being read as options.
        Action::MovePointer {
            x,
            y,
            mode: PointerMode::Relative,
        } => format!(
            "DISPLAY={} xdotool mousemove_relative --sync -- {} {}",
            display, x, y
        ),
        Action::Click { button, count } => format!(
            "DISPLAY={} xdotool click --repeat {} {}",
            display,
            count,
            button.index()
        ),
        Action::TypeText { text } => format!(
            "DISPLAY={} xdotool type --delay {} \"{}\"",
            display,
            TYPE_DELAY_MS,
            escape_double_quoted(text)
        ),
        Action::PressKeys { keys } => {
            let combo = keys
                .iter()
                .map(|k| k.to_lowercase())
                .collect::<Vec<_>>()
                .join("+");
            format!("DISPLAY={} xdotool key {}", display, combo)
        }
        Action::Pause { seconds } => {
            let pause = Duration::try_from_secs_f64(*seconds).unwrap_or(Duration::ZERO);
            return RemoteStep::Sleep(pause);
        }
    };
    RemoteStep::Command(command)
}

/// Escape text for the inside of a double-quoted POSIX shell word.
fn escape_double_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '"' | '\\' | '$' | '`') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
