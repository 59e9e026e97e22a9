//! Configuration management for the VM control server.
//!
//! Configuration is read once at startup from environment variables:
//! - `VM_HOST` - Optional. Address of the controlled VM. Defaults to `192.168.122.79`.
//! - `VM_USER` - Optional. Remote login. Defaults to `vmrobot`.
//! - `VM_PORT` - Optional. SSH port. Defaults to `22`.
//! - `VM_DISPLAY` - Optional. X display used for input and screenshots. Defaults to `:0`.
//! - `VM_IDENTITY` - Optional. Path to a private key; empty means agent/password auth.
//! - `VM_PROJECTS_DIR` - Optional. Root for project records. Defaults to `data/projects`.
//! - `VM_CONNECT_TIMEOUT_SECS` - Optional. Session establishment timeout. Defaults to `10`.
//! - `VM_COMMAND_TIMEOUT_SECS` - Optional. Per-command timeout. Defaults to `120`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// How to reach the controlled machine.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    /// Private key path (`-i`), if any
    pub identity: Option<PathBuf>,
    /// X display identifier, e.g. `:0`
    pub display: String,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl RemoteConfig {
    /// `user@host` destination string for OpenSSH.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,

    /// Directory holding one subdirectory per project
    pub projects_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("VM_HOST").unwrap_or_else(|_| "192.168.122.79".to_string());
        let user = std::env::var("VM_USER").unwrap_or_else(|_| "vmrobot".to_string());

        let port = std::env::var("VM_PORT")
            .unwrap_or_else(|_| "22".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("VM_PORT".to_string(), format!("{}", e)))?;

        let display = std::env::var("VM_DISPLAY").unwrap_or_else(|_| ":0".to_string());

        let identity = std::env::var("VM_IDENTITY")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let projects_dir = std::env::var("VM_PROJECTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/projects"));

        let connect_timeout = secs_from_env("VM_CONNECT_TIMEOUT_SECS", 10)?;
        let command_timeout = secs_from_env("VM_COMMAND_TIMEOUT_SECS", 120)?;

        Ok(Self {
            remote: RemoteConfig {
                host,
                port,
                user,
                identity,
                display,
                connect_timeout,
                command_timeout,
            },
            projects_dir,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(host: String, user: String, projects_dir: PathBuf) -> Self {
        Self {
            remote: RemoteConfig {
                host,
                port: 22,
                user,
                identity: None,
                display: ":0".to_string(),
                connect_timeout: Duration::from_secs(10),
                command_timeout: Duration::from_secs(120),
            },
            projects_dir,
        }
    }
}

fn secs_from_env(name: &str, default: u64) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(Duration::from_secs(default)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_defaults() {
        let cfg = Config::new(
            "10.0.0.5".to_string(),
            "robot".to_string(),
            PathBuf::from("/tmp/projects"),
        );
        assert_eq!(cfg.remote.port, 22);
        assert_eq!(cfg.remote.display, ":0");
        assert!(cfg.remote.identity.is_none());
        assert_eq!(cfg.remote.destination(), "robot@10.0.0.5");
    }

    #[test]
    fn secs_from_env_rejects_garbage() {
        std::env::set_var("VM_CONTROL_TEST_TIMEOUT", "soon");
        let err = secs_from_env("VM_CONTROL_TEST_TIMEOUT", 5).unwrap_err();
        assert!(err.to_string().contains("VM_CONTROL_TEST_TIMEOUT"));
        std::env::remove_var("VM_CONTROL_TEST_TIMEOUT");
    }

    #[test]
    fn secs_from_env_falls_back_to_default() {
        let d = secs_from_env("VM_CONTROL_TEST_UNSET_TIMEOUT", 7).unwrap();
        assert_eq!(d, Duration::from_secs(7));
    }
}
