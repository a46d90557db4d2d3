//! Adding local documents to the backend knowledge base.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bridge::paths::{is_in_workspace, mirror_path};

/// Largest document accepted, in bytes.
pub const MAX_DOCUMENT_SIZE: u64 = 1024 * 1024;

/// Knowledge collection a document is filed under.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    #[default]
    Code,
    Text,
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Text => write!(f, "text"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Project-relative path, or the full path for files outside the project
    pub source: String,
    pub filename: String,
}

/// Body of `/knowledge/add-document`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddDocumentRequest {
    pub content: String,
    pub collection: Collection,
    pub metadata: DocumentMetadata,
}

/// A local file that cannot be submitted.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("{path} is too large ({size} bytes, limit {MAX_DOCUMENT_SIZE})")]
    TooLarge { path: PathBuf, size: u64 },

    #[error("{0} is empty")]
    Empty(PathBuf),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AddDocumentRequest {
    /// Read `path` and build the request for it.
    ///
    /// The size is checked before the file is read. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub async fn load(
        path: &Path,
        root: Option<&Path>,
        collection: Collection,
    ) -> Result<Self, DocumentError> {
        let io = |source| DocumentError::Io { path: path.to_path_buf(), source };

        let size = tokio::fs::metadata(path).await.map_err(io)?.len();
        if size > MAX_DOCUMENT_SIZE {
            return Err(DocumentError::TooLarge { path: path.to_path_buf(), size });
        }

        let bytes = tokio::fs::read(path).await.map_err(io)?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        if content.trim().is_empty() {
            return Err(DocumentError::Empty(path.to_path_buf()));
        }

        Ok(Self { content, collection, metadata: Self::metadata(path, root) })
    }

    fn metadata(path: &Path, root: Option<&Path>) -> DocumentMetadata {
        let source = match root {
            Some(root) if path.is_absolute() && is_in_workspace(root, path) => {
                mirror_path(root, path)
            }
            _ => path.display().to_string(),
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.clone());
        DocumentMetadata { source, filename }
    }
}
