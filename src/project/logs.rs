use std::fs;
use std::path::Path;

use crate::error::{VmError, VmResult};

/// Result of reading the tail of a project log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogExcerpt {
    /// The log file has not been written yet.
    NoLogFile,
    Entries {
        /// Selected lines in file order
        lines: Vec<String>,
        /// Lines that matched the filter before the limit was applied
        total: usize,
    },
}

pub(super) fn read_tail(path: &Path, limit: usize, level_filter: &str) -> VmResult<LogExcerpt> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LogExcerpt::NoLogFile),
        Err(e) => return Err(VmError::io_at("read", path, e)),
    };

    let wanted = level_filter.trim();
    let matching: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| {
            wanted.is_empty() || level_of(line).is_some_and(|l| l.eq_ignore_ascii_case(wanted))
        })
        .collect();

    let total = matching.len();
    let start = total.saturating_sub(limit);
    Ok(LogExcerpt::Entries {
        lines: matching[start..].iter().map(|l| l.to_string()).collect(),
        total,
    })
}

/// The level field of a `[timestamp] [LEVEL] message` line.
fn level_of(line: &str) -> Option<&str> {
    let (_, rest) = line.split_once("] [")?;
    rest.split_once(']').map(|(level, _)| level)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_log(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("project.log");
        fs::write(
            &path,
            "[2024-01-01 00:00:01] [INFO] one\n\
             [2024-01-01 00:00:02] [INFO] two\n\
             [2024-01-01 00:00:03] [ERROR] three\n\
             [2024-01-01 00:00:04] [INFO] four\n\
             [2024-01-01 00:00:05] [DEBUG] five\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn returns_last_lines_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_log(temp.path());

        match read_tail(&path, 2, "").unwrap() {
            LogExcerpt::Entries { lines, total } => {
                assert_eq!(total, 5);
                assert_eq!(lines.len(), 2);
                assert!(lines[0].ends_with("four"));
                assert!(lines[1].ends_with("five"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn level_filter_is_case_insensitive() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_log(temp.path());

        match read_tail(&path, 50, "error").unwrap() {
            LogExcerpt::Entries { lines, total } => {
                assert_eq!(total, 1);
                assert_eq!(lines, vec!["[2024-01-01 00:00:03] [ERROR] three".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn level_tag_inside_message_does_not_match() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("project.log");
        fs::write(
            &path,
            "[2024-01-01 00:00:01] [INFO] saw [ERROR] in output\n\
             [2024-01-01 00:00:02] [ERROR] real\n",
        )
        .unwrap();

        match read_tail(&path, 50, "ERROR").unwrap() {
            LogExcerpt::Entries { lines, total } => {
                assert_eq!(total, 1);
                assert!(lines[0].ends_with("real"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_reported_not_raised() {
        let temp = tempfile::tempdir().expect("tempdir");
        let excerpt = read_tail(&temp.path().join("project.log"), 10, "").unwrap();
        assert_eq!(excerpt, LogExcerpt::NoLogFile);
    }
}
