//! Remote workspace mirror.

use std::path::Path;
use std::sync::Arc;

use walkdir::WalkDir;

use super::paths::mirror_path;
use crate::backend::{Backend, BackendError, BackendResult, WorkspaceFile};
use crate::core::MirrorConfig;

/// Outcome of a full-tree snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotStats {
    /// Files pushed
    pub files: usize,
    /// Sync calls issued
    pub batches: usize,
    /// Files over the size ceiling
    pub skipped_large: usize,
    /// Files that were unreadable or not UTF-8 text
    pub skipped_unreadable: usize,
}

/// The remote copy of the project tree.
///
/// The workspace id is obtained once per session and reused. It is only
/// stored after the initial snapshot has been pushed, so a failed snapshot
/// is retried on the next call instead of leaving a half-filled mirror.
pub struct WorkspaceMirror {
    backend: Arc<dyn Backend>,
    workspace_id: Option<String>,
    settings: MirrorConfig,
}

impl WorkspaceMirror {
    pub fn new(backend: Arc<dyn Backend>, settings: MirrorConfig) -> Self {
        Self { backend, workspace_id: None, settings }
    }

    pub fn workspace_id(&self) -> Option<&str> {
        self.workspace_id.as_deref()
    }

    pub fn is_ready(&self) -> bool {
        self.workspace_id.is_some()
    }

    pub fn settings(&self) -> &MirrorConfig {
        &self.settings
    }

    /// Return the workspace id, creating and filling the mirror on first use.
    pub async fn ensure_ready(&mut self, root: Option<&Path>) -> BackendResult<String> {
        if let Some(id) = &self.workspace_id {
            return Ok(id.clone());
        }
        let root = root.ok_or(BackendError::NoWorkspace)?;

        let init = self.backend.workspace_init().await?;
        let stats = self.snapshot(root, &init.workspace_id).await?;
        tracing::info!(
            workspace_id = %init.workspace_id,
            files = stats.files,
            batches = stats.batches,
            skipped = stats.skipped_large + stats.skipped_unreadable,
            "Workspace mirror ready"
        );

        self.workspace_id = Some(init.workspace_id.clone());
        Ok(init.workspace_id)
    }

    /// Push every eligible file under `root` in fixed-size batches.
    pub async fn snapshot(&self, root: &Path, workspace_id: &str) -> BackendResult<SnapshotStats> {
        let batch_size = self.settings.batch_size.max(1);
        let mut stats = SnapshotStats::default();
        let mut batch: Vec<WorkspaceFile> = Vec::with_capacity(batch_size);

        for entry in self.eligible_files(root) {
            let path = entry.path();
            match entry.metadata() {
                Ok(meta) if meta.len() > self.settings.max_file_size => {
                    stats.skipped_large += 1;
                    continue;
                }
                Ok(_) => {}
                Err(_) => {
                    stats.skipped_unreadable += 1;
                    continue;
                }
            }

            let content = match tokio::fs::read(path).await.map(String::from_utf8) {
                Ok(Ok(text)) => text,
                _ => {
                    tracing::debug!(path = %path.display(), "Skipping unreadable file");
                    stats.skipped_unreadable += 1;
                    continue;
                }
            };

            batch.push(WorkspaceFile::new(mirror_path(root, path), content));
            stats.files += 1;
            if batch.len() >= batch_size {
                self.sync_batch(workspace_id, std::mem::take(&mut batch), &mut stats).await?;
            }
        }

        if !batch.is_empty() {
            self.sync_batch(workspace_id, batch, &mut stats).await?;
        }
        Ok(stats)
    }

    async fn sync_batch(
        &self,
        workspace_id: &str,
        batch: Vec<WorkspaceFile>,
        stats: &mut SnapshotStats,
    ) -> BackendResult<()> {
        tracing::debug!(
            workspace_id = %workspace_id,
            batch = stats.batches,
            files = batch.len(),
            "Syncing snapshot batch"
        );
        self.backend.workspace_sync(workspace_id, &batch).await?;
        stats.batches += 1;
        Ok(())
    }

    fn eligible_files(&self, root: &Path) -> Vec<walkdir::DirEntry> {
        let exclude_dirs = &self.settings.exclude_dirs;
        let exclude_files = &self.settings.exclude_files;

        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() == 0 || !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !exclude_dirs.iter().any(|d| name == d.as_str())
            })
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter(|e| {
                let name = e.file_name().to_string_lossy();
                !exclude_files.iter().any(|f| name == f.as_str())
            })
            .collect()
    }

    /// Push files written during a run. Returns false when the mirror has
    /// not been created this session.
    pub async fn push(&self, files: &[WorkspaceFile]) -> BackendResult<bool> {
        let Some(id) = &self.workspace_id else {
            return Ok(false);
        };
        if files.is_empty() {
            return Ok(true);
        }
        self.backend.workspace_sync(id, files).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, ScriptedBackend};
    use tempfile::TempDir;

    fn mirror(backend: &Arc<ScriptedBackend>) -> WorkspaceMirror {
        WorkspaceMirror::new(backend.clone(), MirrorConfig::default())
    }

    #[tokio::test]
    async fn test_snapshot_batches_85_files() {
        let temp = TempDir::new().unwrap();
        for i in 0..85 {
            std::fs::write(temp.path().join(format!("f{:02}.c", i)), "int x;").unwrap();
        }
        let backend = Arc::new(ScriptedBackend::new());
        let mut mirror = mirror(&backend);

        mirror.ensure_ready(Some(temp.path())).await.unwrap();

        let sizes: Vec<usize> = backend.sync_batches().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![40, 40, 5]);
    }

    #[tokio::test]
    async fn test_ensure_ready_is_idempotent() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("main.c"), "int main;").unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let mut mirror = mirror(&backend);

        let first = mirror.ensure_ready(Some(temp.path())).await.unwrap();
        let second = mirror.ensure_ready(Some(temp.path())).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.count(|c| matches!(c, BackendCall::WorkspaceInit)), 1);
        assert_eq!(backend.sync_batches().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_skips_excluded_large_and_binary() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join(".git/objects/ab"), "x").unwrap();
        std::fs::write(root.join("node_modules/pkg/index.js"), "x").unwrap();
        std::fs::write(root.join(".DS_Store"), "x").unwrap();
        std::fs::write(root.join("src/main.c"), "int main;").unwrap();
        std::fs::write(root.join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();
        std::fs::write(root.join("big.txt"), "a".repeat(1024 * 1024 + 1)).unwrap();

        let backend = Arc::new(ScriptedBackend::new());
        let stats = mirror(&backend).snapshot(root, "ws-1").await.unwrap();

        assert_eq!(stats.files, 1);
        assert_eq!(stats.skipped_large, 1);
        assert_eq!(stats.skipped_unreadable, 1);
        let batches = backend.sync_batches();
        assert_eq!(batches[0][0].path, "src/main.c");
    }

    #[tokio::test]
    async fn test_root_named_like_excluded_dir_is_walked() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("build");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("a.c"), "x").unwrap();

        let backend = Arc::new(ScriptedBackend::new());
        let stats = mirror(&backend).snapshot(&root, "ws-1").await.unwrap();
        assert_eq!(stats.files, 1);
    }

    #[tokio::test]
    async fn test_ensure_ready_without_root() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut mirror = mirror(&backend);
        assert!(matches!(mirror.ensure_ready(None).await, Err(BackendError::NoWorkspace)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_snapshot_does_not_store_id() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.c"), "x").unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_syncs(true);
        let mut mirror = mirror(&backend);

        assert!(mirror.ensure_ready(Some(temp.path())).await.is_err());
        assert!(!mirror.is_ready());
    }

    #[tokio::test]
    async fn test_push_before_ready_is_skipped() {
        let backend = Arc::new(ScriptedBackend::new());
        let mirror = mirror(&backend);
        let pushed = mirror.push(&[WorkspaceFile::new("a.c", "x")]).await.unwrap();
        assert!(!pushed);
        assert!(backend.sync_batches().is_empty());
    }
}
