//! File mediation between the remote agent and the local project tree.
//!
//! Every path the agent names is resolved against the project root and
//! rejected if it escapes it. Writes that land are pushed to the remote
//! workspace mirror so the agent sees the same tree it asked for.

mod files;
mod mirror;
pub mod paths;

use std::path::PathBuf;

pub use files::{FileBridge, FileOpsReport, RejectedOp};
pub use mirror::{SnapshotStats, WorkspaceMirror};
pub use paths::{is_in_workspace, resolve_in_workspace};

/// Errors from a single mediated file operation.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No project is open: cannot access {0}")]
    NoWorkspace(String),

    #[error("Access outside the project is not allowed: {0}")]
    OutsideWorkspace(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File is not valid UTF-8 text: {0}")]
    Decode(PathBuf),
}

impl BridgeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
