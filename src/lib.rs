//! # vm_control
//!
//! Remote control of a graphical virtual machine over one persistent SSH
//! session, with every operation recorded into a per-task project folder.
//!
//! ```text
//!   MCP client ──stdio JSON-RPC──▶ McpServer ──▶ ToolRegistry
//!                                                   │
//!                 ┌─────────────────────────────────┼──────────────┐
//!                 ▼                                 ▼              ▼
//!          ActionRunner (xdotool)            Connection      ProjectStore
//!                 │                          (ssh/sftp)     (logs, advice,
//!                 └──────────────▶ Connection                results, png)
//! ```
//!
//! ## Modules
//! - `remote`: the single serialized session and its OpenSSH transport
//! - `actions`: UI action model and translation to `xdotool` commands
//! - `orchestrator`: single actions and fail-stop batches
//! - `project`: directory-backed project records
//! - `recorder`: project-scoped activity log for tool calls
//! - `session`: the context object handed to every tool
//! - `tools`: the externally callable operations
//! - `mcp`: JSON-RPC 2.0 server over stdio

pub mod actions;
pub mod config;
pub mod error;
pub mod mcp;
pub mod orchestrator;
pub mod project;
pub mod recorder;
pub mod remote;
pub mod session;
pub mod tools;

pub use config::Config;
pub use error::{VmError, VmResult};
pub use session::SessionContext;
