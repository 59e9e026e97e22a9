//! Advice notes: one markdown file per tip, never edited after writing.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{VmError, VmResult};

const MAX_TITLE_CHARS: usize = 50;
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Keep alphanumerics, space, hyphen and underscore; replace the rest with `_`.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TITLE_CHARS)
        .collect()
}

/// Collapse line breaks so the title fits on the `# ` heading line.
fn heading_text(title: &str) -> String {
    title
        .split(|c| c == '\n' || c == '\r')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write a new note, retrying with a fresh timestamp if the name is taken.
pub(super) fn write_note(dir: &Path, title: &str, content: &str) -> VmResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| VmError::io_at("create", dir, e))?;
    let heading = heading_text(title);
    let safe_title = sanitize_title(&heading);
    let body = format!("# {}\n\n{}\n", heading, content);

    for _ in 0..MAX_NAME_ATTEMPTS {
        let stamp = Utc::now().format("%Y%m%d-%H%M%S-%6f");
        let path = dir.join(format!("{}_{}.md", stamp, safe_title));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut f) => {
                f.write_all(body.as_bytes())
                    .map_err(|e| VmError::io_at("write", &path, e))?;
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(VmError::io_at("create", &path, e)),
        }
    }
    Err(VmError::io(
        format!("Failed to pick a unique advice file name in {}", dir.display()),
        std::io::Error::from(std::io::ErrorKind::AlreadyExists),
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdviceNote {
    pub title: String,
    pub content: String,
    /// File name within `advice/`
    pub file: String,
}

impl AdviceNote {
    fn read(path: &Path) -> VmResult<Self> {
        let raw = fs::read_to_string(path).map_err(|e| VmError::io_at("read", path, e))?;
        let file = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let lines: Vec<&str> = raw.trim().split('\n').collect();
        let title = match lines.first() {
            Some(first) if !first.trim().is_empty() => first
                .trim_start_matches(|c| c == '#' || c == ' ')
                .trim()
                .to_string(),
            _ => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
        };
        let content = if lines.len() > 2 {
            lines[2..].join("\n").trim().to_string()
        } else {
            String::new()
        };

        Ok(Self {
            title,
            content,
            file,
        })
    }
}

/// Snapshot of the note files present at scan time, sorted by name
/// (and therefore by creation time).
#[derive(Debug, Clone, Default)]
pub struct AdviceNotes {
    files: Vec<PathBuf>,
}

impl AdviceNotes {
    pub(super) fn scan(dir: &Path) -> VmResult<Self> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(VmError::io_at("list", dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| VmError::io_at("list", dir, e))?.path();
            if path.is_file() && path.extension().map(|e| e == "md").unwrap_or(false) {
                files.push(path);
            }
        }
        files.sort();
        Ok(Self { files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read notes one at a time. Each call starts again from the oldest note.
    pub fn iter(&self) -> impl Iterator<Item = VmResult<AdviceNote>> + '_ {
        self.files.iter().map(|p| AdviceNote::read(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::Project;

    #[test]
    fn save_then_read_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "").unwrap();
        project.save_advice("Title", "Body").unwrap();

        let notes = project.read_advice().unwrap();
        let all: Vec<AdviceNote> = notes.iter().collect::<VmResult<_>>().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "Title");
        assert_eq!(all[0].content, "Body");
        assert!(all[0].file.ends_with("_Title.md"));
    }

    #[test]
    fn title_is_sanitized_and_truncated() {
        assert_eq!(sanitize_title("a/b:c"), "a_b_c");
        let long = "x".repeat(80);
        assert_eq!(sanitize_title(&long).chars().count(), 50);

        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_note(temp.path(), "a/b:c", "x").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let title_part = name
            .trim_end_matches(".md")
            .split_once('_')
            .map(|(_, t)| t.to_string())
            .unwrap();
        assert!(title_part
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_')));
        assert!(title_part.chars().count() <= 50);
    }

    #[test]
    fn repeated_titles_never_overwrite() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "").unwrap();
        project.save_advice("Same", "one").unwrap();
        project.save_advice("Same", "two").unwrap();

        let notes = project.read_advice().unwrap();
        let bodies: Vec<String> = notes.iter().map(|n| n.unwrap().content).collect();
        assert_eq!(bodies, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn iteration_is_restartable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "").unwrap();
        project.save_advice("First", "a").unwrap();
        project.save_advice("Second", "b").unwrap();

        let notes = project.read_advice().unwrap();
        let first_pass: Vec<String> = notes.iter().map(|n| n.unwrap().title).collect();
        let second_pass: Vec<String> = notes.iter().map(|n| n.unwrap().title).collect();
        assert_eq!(first_pass, vec!["First".to_string(), "Second".to_string()]);
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn multi_line_title_survives_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_note(temp.path(), "Title\nsub\r\nmore", "Body").unwrap();
        let note = AdviceNote::read(&path).unwrap();
        assert_eq!(note.title, "Title sub more");
        assert_eq!(note.content, "Body");
        assert!(note.file.ends_with("_Title sub more.md"));
    }

    #[test]
    fn multi_paragraph_body_is_kept() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = write_note(temp.path(), "Focus", "line one\n\nline two").unwrap();
        let note = AdviceNote::read(&path).unwrap();
        assert_eq!(note.content, "line one\n\nline two");
    }

    #[test]
    fn missing_advice_dir_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let notes = AdviceNotes::scan(&temp.path().join("advice")).unwrap();
        assert!(notes.is_empty());
    }
}
