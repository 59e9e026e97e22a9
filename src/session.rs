//! Per-process session state handed to every tool call.

use crate::config::{Config, RemoteConfig};
use crate::error::{VmError, VmResult};
use crate::orchestrator::ActionRunner;
use crate::project::{Project, ProjectStore};
use crate::recorder::Recorder;
use crate::remote::Connection;

/// The remote session, the project root, and the active project (if any).
pub struct SessionContext {
    connection: Connection,
    remote: RemoteConfig,
    store: ProjectStore,
    project: Option<Project>,
}

impl SessionContext {
    pub fn new(connection: Connection, config: &Config) -> Self {
        Self {
            connection,
            remote: config.remote.clone(),
            store: ProjectStore::new(config.projects_dir.clone()),
            project: None,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn require_project(&self) -> VmResult<&Project> {
        self.project.as_ref().ok_or(VmError::NoActiveProject)
    }

    /// Make `project` the active one, replacing any previous project.
    pub fn set_project(&mut self, project: Project) -> &Project {
        tracing::info!(name = %project.name, path = %project.path.display(), "Active project set");
        self.project.insert(project)
    }

    pub fn recorder(&self) -> Recorder<'_> {
        Recorder::new(self.project.as_ref())
    }

    pub fn runner(&self) -> ActionRunner<'_> {
        ActionRunner::new(&self.connection, &self.remote.display)
    }
}
