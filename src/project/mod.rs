//! Directory-backed project records.
//!
//! Each project lives in `<root>/<timestamp>_<name>/`:
//!
//! ```text
//! metadata.json        {name, created_at, description}
//! logs/project.log     [YYYY-MM-DD HH:MM:SS] [LEVEL] message
//! results/*            named result files (overwritten on reuse)
//! advice/<ts>_<t>.md   "# title\n\nbody", one file per note
//! screenshots/<id>.png
//! ```
//!
//! Nothing here caches on-disk state: counts and listings rescan the tree on
//! every call.

mod advice;
mod logs;

pub use advice::{sanitize_title, AdviceNote, AdviceNotes};
pub use logs::LogExcerpt;

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{VmError, VmResult};

pub const METADATA_FILE: &str = "metadata.json";
pub const SCREENSHOTS_DIR: &str = "screenshots";
pub const LOGS_DIR: &str = "logs";
pub const RESULTS_DIR: &str = "results";
pub const ADVICE_DIR: &str = "advice";
pub const LOG_FILE: &str = "project.log";

const SUBDIRS: [&str; 4] = [SCREENSHOTS_DIR, LOGS_DIR, RESULTS_DIR, ADVICE_DIR];

/// Second-precision UTC stamp used for directory names and `created_at`.
fn compact_timestamp() -> String {
    Utc::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Sub-second UTC stamp used for screenshot ids.
pub fn screenshot_id() -> String {
    Utc::now().format("%Y%m%d-%H%M%S-%6f").to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct Metadata {
    name: String,
    created_at: String,
    #[serde(default)]
    description: String,
}

/// One task/session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub created_at: String,
    pub description: String,
}

/// Statistics gathered from disk at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
    pub path: PathBuf,
    pub created_at: String,
    pub description: String,
    pub screenshot_count: usize,
    pub result_count: usize,
    pub log_entries: usize,
}

impl Project {
    /// Create `<root>/<timestamp>_<name>` with its subdirectories and metadata.
    pub fn create(root: &Path, name: &str, description: &str) -> VmResult<Self> {
        validate_file_name(name)?;
        let created_at = compact_timestamp();
        let path = root.join(format!("{}_{}", created_at, name));

        fs::create_dir_all(root).map_err(|e| VmError::io_at("create", root, e))?;
        fs::create_dir(&path).map_err(|e| VmError::io_at("create project directory", &path, e))?;
        for sub in SUBDIRS {
            let dir = path.join(sub);
            fs::create_dir_all(&dir).map_err(|e| VmError::io_at("create", &dir, e))?;
        }

        let project = Self {
            name: name.to_string(),
            path,
            created_at,
            description: description.to_string(),
        };
        project.save_metadata()?;
        project.log("Project initialized", "INFO")?;
        tracing::info!(path = %project.path.display(), "Project created");
        Ok(project)
    }

    /// Reconstruct a project from `path/metadata.json`.
    pub fn load(path: &Path) -> VmResult<Self> {
        let metadata_file = path.join(METADATA_FILE);
        if !metadata_file.is_file() {
            return Err(VmError::NotFound(format!(
                "No {} in {}",
                METADATA_FILE,
                path.display()
            )));
        }
        let raw = fs::read_to_string(&metadata_file)
            .map_err(|e| VmError::io_at("read", &metadata_file, e))?;
        let meta: Metadata = serde_json::from_str(&raw)?;
        Ok(Self {
            name: meta.name,
            path: path.to_path_buf(),
            created_at: meta.created_at,
            description: meta.description,
        })
    }

    fn save_metadata(&self) -> VmResult<()> {
        let meta = Metadata {
            name: self.name.clone(),
            created_at: self.created_at.clone(),
            description: self.description.clone(),
        };
        let file = self.path.join(METADATA_FILE);
        let data = serde_json::to_string_pretty(&meta)?;
        fs::write(&file, data).map_err(|e| VmError::io_at("write", &file, e))
    }

    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOGS_DIR).join(LOG_FILE)
    }

    /// Append one line to the project log. The file is opened per write.
    pub fn log(&self, message: &str, level: &str) -> VmResult<()> {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!(
            "[{}] [{}] {}\n",
            timestamp,
            single_line(level),
            single_line(message)
        );
        let file = self.log_path();
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
            .map_err(|e| VmError::io_at("open", &file, e))?;
        f.write_all(line.as_bytes())
            .map_err(|e| VmError::io_at("append to", &file, e))
    }

    pub fn screenshot_path(&self, screenshot_id: &str) -> PathBuf {
        self.path
            .join(SCREENSHOTS_DIR)
            .join(format!("{}.png", screenshot_id))
    }

    /// Write (or overwrite) `results/<filename>`.
    pub fn save_result(&self, filename: &str, content: &str) -> VmResult<PathBuf> {
        validate_file_name(filename)?;
        let dir = self.path.join(RESULTS_DIR);
        fs::create_dir_all(&dir).map_err(|e| VmError::io_at("create", &dir, e))?;
        let path = dir.join(filename);
        fs::write(&path, content).map_err(|e| VmError::io_at("write", &path, e))?;
        self.log(&format!("Result saved: {}", filename), "INFO")?;
        Ok(path)
    }

    pub fn save_advice(&self, title: &str, content: &str) -> VmResult<PathBuf> {
        let path = advice::write_note(&self.path.join(ADVICE_DIR), title, content)?;
        self.log(&format!("Advice saved: {}", title), "INFO")?;
        Ok(path)
    }

    /// Notes under `advice/`, oldest first. Files are read lazily.
    pub fn read_advice(&self) -> VmResult<AdviceNotes> {
        AdviceNotes::scan(&self.path.join(ADVICE_DIR))
    }

    /// Up to `limit` most recent log lines, optionally only those tagged `[LEVEL]`.
    pub fn read_logs(&self, limit: usize, level_filter: &str) -> VmResult<LogExcerpt> {
        logs::read_tail(&self.log_path(), limit, level_filter)
    }

    pub fn info(&self) -> VmResult<ProjectInfo> {
        let screenshot_count = count_entries(&self.path.join(SCREENSHOTS_DIR), |p| {
            p.extension().map(|e| e == "png").unwrap_or(false)
        })?;
        let result_count = count_entries(&self.path.join(RESULTS_DIR), |_| true)?;
        let log_entries = match fs::read_to_string(self.log_path()) {
            Ok(text) => text.matches('\n').count(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(VmError::io_at("read", &self.log_path(), e)),
        };

        Ok(ProjectInfo {
            name: self.name.clone(),
            path: self.path.clone(),
            created_at: self.created_at.clone(),
            description: self.description.clone(),
            screenshot_count,
            result_count,
            log_entries,
        })
    }
}

fn count_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> VmResult<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(VmError::io_at("list", dir, e)),
    };
    let mut count = 0;
    for entry in entries {
        let entry = entry.map_err(|e| VmError::io_at("list", dir, e))?;
        if keep(&entry.path()) {
            count += 1;
        }
    }
    Ok(count)
}

/// Escape line breaks so one log entry is always one line.
fn single_line(text: &str) -> String {
    text.replace('\r', "\\r").replace('\n', "\\n")
}

/// Reject names that would escape their directory.
fn validate_file_name(name: &str) -> VmResult<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(VmError::validation(format!("Invalid file name: {:?}", name)));
    }
    Ok(())
}

/// One row of a project listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectListing {
    Valid(Project),
    /// Directory without readable metadata
    Invalid(PathBuf),
}

impl fmt::Display for ProjectListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Valid(p) => write!(f, "- {} ({}): {}", p.name, p.created_at, p.path.display()),
            Self::Invalid(path) => write!(f, "- (invalid): {}", path.display()),
        }
    }
}

/// The root directory holding every project.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_root(&self) -> VmResult<()> {
        fs::create_dir_all(&self.root).map_err(|e| VmError::io_at("create", &self.root, e))
    }

    pub fn create(&self, name: &str, description: &str) -> VmResult<Project> {
        Project::create(&self.root, name, description)
    }

    /// Immediate subdirectories of the root, newest first.
    pub fn list(&self) -> VmResult<Vec<ProjectListing>> {
        let mut dirs = self.project_dirs()?;
        dirs.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

        Ok(dirs
            .into_iter()
            .map(|dir| match Project::load(&dir) {
                Ok(project) => ProjectListing::Valid(project),
                Err(e) => {
                    tracing::debug!(path = %dir.display(), error = %e, "Invalid project directory");
                    ProjectListing::Invalid(dir)
                }
            })
            .collect())
    }

    /// Bytes of `screenshots/<id>.png` from whichever project holds it.
    pub fn find_screenshot(&self, screenshot_id: &str) -> VmResult<Vec<u8>> {
        validate_file_name(screenshot_id)?;
        for dir in self.project_dirs()? {
            let candidate = dir
                .join(SCREENSHOTS_DIR)
                .join(format!("{}.png", screenshot_id));
            if candidate.is_file() {
                return fs::read(&candidate).map_err(|e| VmError::io_at("read", &candidate, e));
            }
        }
        Err(VmError::NotFound(format!(
            "No screenshot found for id {}",
            screenshot_id
        )))
    }

    fn project_dirs(&self) -> VmResult<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VmError::io_at("list", &self.root, e)),
        };
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| VmError::io_at("list", &self.root, e))?;
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_lays_out_directories_and_first_log_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "a test").unwrap();

        for sub in SUBDIRS {
            assert!(project.path.join(sub).is_dir(), "missing {}", sub);
        }
        let dir_name = project.path.file_name().unwrap().to_string_lossy().to_string();
        assert_eq!(dir_name, format!("{}_demo", project.created_at));

        let log = fs::read_to_string(project.log_path()).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("[INFO] Project initialized"));
    }

    #[test]
    fn load_round_trips_metadata() {
        let temp = tempfile::tempdir().expect("tempdir");
        let created = Project::create(temp.path(), "demo", "desc").unwrap();
        let loaded = Project::load(&created.path).unwrap();
        assert_eq!(loaded, created);
    }

    #[test]
    fn load_without_metadata_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Project::load(temp.path()).unwrap_err();
        assert!(matches!(err, VmError::NotFound(_)));
    }

    #[test]
    fn load_defaults_missing_description() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("20240101-000000_old");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join(METADATA_FILE),
            r#"{"name": "old", "created_at": "20240101-000000"}"#,
        )
        .unwrap();

        let project = Project::load(&dir).unwrap();
        assert_eq!(project.name, "old");
        assert_eq!(project.description, "");
    }

    #[test]
    fn create_fails_when_root_is_a_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, "x").unwrap();
        let err = Project::create(&blocker, "demo", "").unwrap_err();
        assert!(matches!(err, VmError::Io { .. }));
    }

    #[test]
    fn save_result_overwrites_and_logs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "").unwrap();

        project.save_result("out.txt", "first").unwrap();
        let path = project.save_result("out.txt", "second").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "second");

        let info = project.info().unwrap();
        assert_eq!(info.result_count, 1);
        assert_eq!(info.log_entries, 3);
    }

    #[test]
    fn line_breaks_in_level_stay_on_one_line() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "").unwrap();
        project
            .log("real", "INFO\n[2000-01-01 00:00:00] [ERROR] forged")
            .unwrap();
        project.log("two\r\nlines", "INFO").unwrap();

        assert_eq!(project.info().unwrap().log_entries, 3);
        match project.read_logs(50, "ERROR").unwrap() {
            LogExcerpt::Entries { lines, .. } => assert!(lines.is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        let log = fs::read_to_string(project.log_path()).unwrap();
        assert!(log.contains("[INFO\\n[2000-01-01 00:00:00] [ERROR] forged] real"));
        assert!(log.contains("[INFO] two\\r\\nlines"));
    }

    #[test]
    fn save_result_rejects_path_escape() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "").unwrap();
        assert!(project.save_result("../escape.txt", "x").is_err());
    }

    #[test]
    fn info_rescans_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::create(temp.path(), "demo", "").unwrap();
        assert_eq!(project.info().unwrap().screenshot_count, 0);

        fs::write(project.screenshot_path("20240101-000000-000001"), b"png").unwrap();
        fs::write(project.path.join(SCREENSHOTS_DIR).join("notes.txt"), b"x").unwrap();
        assert_eq!(project.info().unwrap().screenshot_count, 1);
    }

    #[test]
    fn list_reports_valid_and_invalid_newest_first() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProjectStore::new(temp.path());
        let project = store.create("demo", "").unwrap();
        fs::create_dir_all(temp.path().join("99999999-999999_broken")).unwrap();
        fs::write(temp.path().join("stray.txt"), "not a dir").unwrap();

        let listing = store.list().unwrap();
        assert_eq!(listing.len(), 2);
        assert!(matches!(&listing[0], ProjectListing::Invalid(_)));
        assert_eq!(listing[1], ProjectListing::Valid(project));
        assert!(listing[0].to_string().starts_with("- (invalid): "));
    }

    #[test]
    fn list_of_missing_root_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProjectStore::new(temp.path().join("absent"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn find_screenshot_searches_every_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = ProjectStore::new(temp.path());
        store.create("first", "").unwrap();
        let second = store.create("second", "").unwrap();
        fs::write(second.screenshot_path("shot-1"), b"image-bytes").unwrap();

        assert_eq!(store.find_screenshot("shot-1").unwrap(), b"image-bytes");
        let err = store.find_screenshot("shot-2").unwrap_err();
        assert_eq!(err.to_string(), "No screenshot found for id shot-2");
    }
}
