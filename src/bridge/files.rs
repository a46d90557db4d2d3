//! Applying remote file writes and answering remote reads.

use std::path::{Path, PathBuf};

use super::paths::{mirror_path, resolve_in_workspace};
use super::{BridgeError, WorkspaceMirror};
use crate::backend::{BackendResult, WorkspaceFile};
use crate::protocol::{FileOp, FileReadRequestData, FileReadResponse};

/// A file op that was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOp {
    pub path: String,
    pub reason: String,
}

/// Result of applying one `file_ops` batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileOpsReport {
    /// Absolute paths written, in op order
    pub written: Vec<PathBuf>,
    pub rejected: Vec<RejectedOp>,
    /// Non-fatal notices such as unsupported encodings
    pub warnings: Vec<String>,
    /// Files pushed to the mirror
    pub synced: usize,
    /// Set when the mirror push failed; the local writes still stand
    pub sync_error: Option<String>,
}

impl FileOpsReport {
    pub fn files_written(&self) -> usize {
        self.written.len()
    }

    /// First file written, for an "open first" action.
    pub fn first_file(&self) -> Option<&Path> {
        self.written.first().map(PathBuf::as_path)
    }
}

/// Mediates all file access requested by the remote agent.
pub struct FileBridge {
    root: Option<PathBuf>,
    mirror: WorkspaceMirror,
}

impl FileBridge {
    pub fn new(root: Option<PathBuf>, mirror: WorkspaceMirror) -> Self {
        Self { root, mirror }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn mirror(&self) -> &WorkspaceMirror {
        &self.mirror
    }

    /// Create the remote mirror on first use; later calls return the same id.
    pub async fn ensure_mirror_ready(&mut self) -> BackendResult<String> {
        self.mirror.ensure_ready(self.root.as_deref()).await
    }

    /// Apply a batch of writes.
    ///
    /// Each op is checked and written independently; a rejected op never
    /// stops the rest of the batch. Files that land are pushed to the mirror
    /// in one call before this returns.
    pub async fn apply_file_ops(&mut self, ops: &[FileOp]) -> FileOpsReport {
        let mut report = FileOpsReport::default();
        let mut staged = Vec::new();

        for op in ops {
            if op.path.is_empty() {
                tracing::debug!("Ignoring file op without a path");
                continue;
            }

            match self.write_one(op).await {
                Ok(path) => {
                    if !op.is_utf8() {
                        report.warnings.push(format!(
                            "Encoding {} is not supported; wrote {} as UTF-8",
                            op.encoding(),
                            path.display()
                        ));
                    }
                    if let Some(root) = &self.root {
                        staged.push(WorkspaceFile::new(mirror_path(root, &path), op.content()));
                    }
                    tracing::debug!(path = %path.display(), "Wrote file");
                    report.written.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %op.path, error = %e, "File op rejected");
                    report.rejected.push(RejectedOp { path: op.path.clone(), reason: e.to_string() });
                }
            }
        }

        if !staged.is_empty() {
            match self.mirror.push(&staged).await {
                Ok(true) => report.synced = staged.len(),
                Ok(false) => tracing::debug!("Workspace mirror not initialized; skipping push"),
                Err(e) => {
                    tracing::warn!(
                        files = staged.len(),
                        error = %e,
                        "Failed to push written files to mirror"
                    );
                    report.sync_error = Some(e.to_string());
                }
            }
        }

        report
    }

    async fn write_one(&self, op: &FileOp) -> Result<PathBuf, BridgeError> {
        let path = resolve_in_workspace(self.root.as_deref(), &op.path)?;
        if op.create_dirs() {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BridgeError::io(parent, e))?;
            }
        }
        tokio::fs::write(&path, op.content()).await.map_err(|e| BridgeError::io(&path, e))?;
        Ok(path)
    }

    /// Answer a `file_read_request`.
    ///
    /// Returns `None` for a request without an id or path; every other
    /// request gets exactly one response.
    pub async fn handle_file_read_request(
        &self,
        request: &FileReadRequestData,
    ) -> Option<FileReadResponse> {
        let request_id = request.request_id.as_deref().filter(|id| !id.is_empty())?;
        let raw = request.path.as_deref().filter(|p| !p.is_empty())?;

        let response = match self.read_text(raw).await {
            Ok(content) => FileReadResponse::success(request_id, content),
            Err(e) => {
                tracing::warn!(request_id = %request_id, path = %raw, error = %e, "File read refused");
                FileReadResponse::failure(request_id, e.to_string())
            }
        };
        Some(response)
    }

    async fn read_text(&self, raw: &str) -> Result<String, BridgeError> {
        let path = resolve_in_workspace(self.root.as_deref(), raw)?;
        let bytes = tokio::fs::read(&path).await.map_err(|e| BridgeError::io(&path, e))?;
        String::from_utf8(bytes).map_err(|_| BridgeError::Decode(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::core::MirrorConfig;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn bridge(root: Option<&Path>) -> (FileBridge, Arc<ScriptedBackend>) {
        let backend = Arc::new(ScriptedBackend::new());
        let mirror = WorkspaceMirror::new(backend.clone(), MirrorConfig::default());
        (FileBridge::new(root.map(Path::to_path_buf), mirror), backend)
    }

    fn read_request(id: &str, path: &str) -> FileReadRequestData {
        FileReadRequestData {
            request_id: Some(id.to_string()),
            path: Some(path.to_string()),
            encoding: None,
        }
    }

    #[tokio::test]
    async fn test_apply_writes_relative_and_creates_dirs() {
        let temp = TempDir::new().unwrap();
        let (mut bridge, _) = bridge(Some(temp.path()));

        let report = bridge.apply_file_ops(&[FileOp::write("ta/main.c", "int main;")]).await;

        assert_eq!(report.files_written(), 1);
        assert_eq!(report.first_file(), Some(temp.path().join("ta/main.c").as_path()));
        let written = std::fs::read_to_string(temp.path().join("ta/main.c")).unwrap();
        assert_eq!(written, "int main;");
    }

    #[tokio::test]
    async fn test_rejected_op_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        let (mut bridge, _) = bridge(Some(temp.path()));

        let report = bridge
            .apply_file_ops(&[
                FileOp::write("/etc/stepwise-test", "x"),
                FileOp::write("../escape.txt", "x"),
                FileOp::write("ok.txt", "fine"),
            ])
            .await;

        assert_eq!(report.files_written(), 1);
        assert_eq!(report.rejected.len(), 2);
        assert!(report.rejected[0].reason.contains("outside the project"));
        assert!(!temp.path().parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_apply_without_project() {
        let (mut bridge, _) = bridge(None);
        let report = bridge.apply_file_ops(&[FileOp::write("a.c", "x")]).await;
        assert_eq!(report.files_written(), 0);
        assert!(report.rejected[0].reason.contains("No project is open"));
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let (mut bridge, _) = bridge(Some(temp.path()));
        let ops = [FileOp::write("a.c", "one"), FileOp::write("b/c.h", "two")];

        let first = bridge.apply_file_ops(&ops).await;
        let second = bridge.apply_file_ops(&ops).await;

        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(temp.path().join("b/c.h")).unwrap(), "two");
    }

    #[tokio::test]
    async fn test_missing_content_and_foreign_encoding() {
        let temp = TempDir::new().unwrap();
        let (mut bridge, _) = bridge(Some(temp.path()));
        let op = FileOp {
            path: "empty.txt".to_string(),
            encoding: Some("gbk".to_string()),
            ..Default::default()
        };

        let report = bridge.apply_file_ops(&[op]).await;

        assert_eq!(report.files_written(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(std::fs::read_to_string(temp.path().join("empty.txt")).unwrap(), "");
    }

    #[tokio::test]
    async fn test_create_dirs_false_fails_without_parent() {
        let temp = TempDir::new().unwrap();
        let (mut bridge, _) = bridge(Some(temp.path()));
        let op = FileOp { create_dirs: Some(false), ..FileOp::write("missing/a.c", "x") };

        let report = bridge.apply_file_ops(&[op]).await;
        assert_eq!(report.files_written(), 0);
        assert_eq!(report.rejected.len(), 1);
    }

    #[tokio::test]
    async fn test_written_files_are_pushed_once_mirror_is_ready() {
        let temp = TempDir::new().unwrap();
        let (mut bridge, backend) = bridge(Some(temp.path()));
        bridge.ensure_mirror_ready().await.unwrap();

        let report = bridge
            .apply_file_ops(&[FileOp::write("src/a.c", "a"), FileOp::write("src/b.c", "b")])
            .await;

        assert_eq!(report.synced, 2);
        let batches = backend.sync_batches();
        let last = batches.last().unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].path, "src/a.c");
    }

    #[tokio::test]
    async fn test_push_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let (mut bridge, backend) = bridge(Some(temp.path()));
        bridge.ensure_mirror_ready().await.unwrap();
        backend.fail_syncs(true);

        let report = bridge.apply_file_ops(&[FileOp::write("a.c", "a")]).await;
        assert_eq!(report.files_written(), 1);
        assert_eq!(report.synced, 0);
        assert!(report.sync_error.is_some());
    }

    #[tokio::test]
    async fn test_read_request_success() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.c"), "int a;").unwrap();
        let (bridge, _) = bridge(Some(temp.path()));

        let response = bridge.handle_file_read_request(&read_request("r1", "a.c")).await.unwrap();
        assert_eq!(response, FileReadResponse::success("r1", "int a;"));
    }

    #[tokio::test]
    async fn test_read_request_failures_carry_reason() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("bin"), [0xc3, 0x28]).unwrap();
        let (bridge, _) = bridge(Some(temp.path()));

        for (id, path) in [("r1", "/etc/passwd"), ("r2", "missing.c"), ("r3", "bin")] {
            let response = bridge.handle_file_read_request(&read_request(id, path)).await.unwrap();
            assert_eq!(response.request_id, id);
            assert!(!response.ok);
            assert!(response.error.is_some());
        }
    }

    #[tokio::test]
    async fn test_read_request_without_project() {
        let (bridge, _) = bridge(None);
        let response = bridge.handle_file_read_request(&read_request("r1", "a.c")).await.unwrap();
        assert!(!response.ok);
    }

    #[tokio::test]
    async fn test_malformed_read_request_is_ignored() {
        let (bridge, _) = bridge(None);
        let missing_id = FileReadRequestData { path: Some("a.c".to_string()), ..Default::default() };
        let missing_path = FileReadRequestData { request_id: Some("r1".to_string()), ..Default::default() };

        assert!(bridge.handle_file_read_request(&missing_id).await.is_none());
        assert!(bridge.handle_file_read_request(&missing_path).await.is_none());
    }
}
