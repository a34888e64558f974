use std::path::{Path, PathBuf};

use crate::dispatch::spawn_child;
use crate::payloads::FileAnalysisJob;

/// A single path-discovery event, as emitted by the `scan` CLI subcommand
/// for every new or modified file.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathDiscoveryEvent {
    pub file_path: String,
    pub run_id: uuid::Uuid,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

pub struct FileDiscoveryBatcher {
    pub target_root: PathBuf,
    pub tokenizer: kg_llm::Tokenizer,
    pub kv: tokio::sync::Mutex<kg_kv::Kv>,
    pub max_batch_tokens: u32,
    pub max_file_size_bytes: u64,
}

pub struct BatcherOutcome {
    parent_id: kg_ids::Id,
    ready: Vec<(String, uuid::Uuid, uuid::Uuid)>,
    skipped_too_large: Vec<String>,
}

impl kg_automations::Outcome for BatcherOutcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        let files = kg_store::FileRepo::new();
        for file_path in &self.skipped_too_large {
            files
                .set_status(txn, file_path, kg_core::FileStatus::SkippedFileTooLarge, None)
                .await?;
        }

        for (file_path, run_id, job_id) in self.ready {
            let child_id = kg_automations::next_task_id();
            let job = FileAnalysisJob {
                file_path,
                run_id,
                job_id,
            };
            spawn_child(
                txn,
                child_id,
                kg_automations::task_types::FILE_ANALYSIS,
                self.parent_id,
                &job,
            )
            .await?;
        }
        Ok(kg_automations::Action::Suspend)
    }
}

/// The parent directory of a scanned path, the key Directory-Aggregation
/// (C7) groups expected/completed file counts under. Top-level files share
/// the empty-string directory.
pub(crate) fn parent_directory(file_path: &str) -> String {
    Path::new(file_path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl kg_automations::Executor for FileDiscoveryBatcher {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::FILE_DISCOVERY_BATCHER;

    type Receive = PathDiscoveryEvent;
    type State = State;
    type Outcome = BatcherOutcome;

    async fn poll<'s>(
        &'s self,
        _pool: &'s sqlx::PgPool,
        task_id: kg_ids::Id,
        _parent_id: Option<kg_ids::Id>,
        _state: &'s mut Self::State,
        inbox: &'s mut std::collections::VecDeque<(kg_ids::Id, Option<Self::Receive>)>,
    ) -> anyhow::Result<Self::Outcome> {
        let mut ready = Vec::new();
        let mut skipped_too_large = Vec::new();

        while let Some((_sender, msg)) = inbox.pop_front() {
            let Some(event) = msg else { continue };

            if !path_is_inside_root(&self.target_root, &event.file_path) {
                tracing::warn!(path = %event.file_path, "rejecting path outside target root");
                continue;
            }

            let absolute = self.target_root.join(&event.file_path);
            let size = match std::fs::metadata(&absolute) {
                Ok(meta) => meta.len(),
                Err(err) => {
                    tracing::warn!(path = %event.file_path, error = %err, "cannot stat file, skipping");
                    continue;
                }
            };
            if size > self.max_file_size_bytes {
                tracing::warn!(path = %event.file_path, size, "file exceeds MAX_FILE_SIZE_BYTES, skipping");
                skipped_too_large.push(event.file_path);
                continue;
            }

            let content = match std::fs::read_to_string(&absolute) {
                Ok(content) => content,
                Err(err) => {
                    tracing::warn!(path = %event.file_path, error = %err, "cannot read file, skipping");
                    continue;
                }
            };
            let tokens = self.tokenizer.count(&content) as u32;

            let entry = (event.file_path.clone(), event.run_id);
            let batch = {
                let mut kv = self.kv.lock().await;
                kv.batch_threshold_swap(
                    "file-discovery:pending",
                    "file-discovery:tokens",
                    &entry,
                    tokens,
                    self.max_batch_tokens,
                )
                .await
                .map_err(kg_core::Error::from)?
            };

            if let Some(batch) = batch {
                let mut kv = self.kv.lock().await;
                for (file_path, run_id) in batch {
                    let job_id = uuid::Uuid::new_v4();
                    let directory = parent_directory(&file_path);
                    kv.directory_aggregation_mark_expected(run_id, &directory, &job_id.to_string())
                        .await
                        .map_err(kg_core::Error::from)?;
                    ready.push((file_path, run_id, job_id));
                }
            }
        }

        tracing::debug!(%task_id, ready = ready.len(), "file-discovery batcher poll complete");

        Ok(BatcherOutcome {
            parent_id: task_id,
            ready,
            skipped_too_large,
        })
    }
}

pub(crate) fn path_is_inside_root(root: &Path, candidate: &str) -> bool {
    if candidate.contains("..") {
        return false;
    }
    let joined = root.join(candidate);
    match joined.canonicalize() {
        Ok(resolved) => resolved.starts_with(root),
        // The file may not exist yet relative to an un-canonicalized root
        // during tests; fall back to a syntactic containment check.
        Err(_) => joined.starts_with(root),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_directory_of_a_nested_path_is_its_dirname() {
        assert_eq!(parent_directory("src/a/b.rs"), "src/a");
    }

    #[test]
    fn parent_directory_of_a_top_level_file_is_empty() {
        assert_eq!(parent_directory("b.rs"), "");
    }

    #[test]
    fn path_traversal_candidates_are_rejected_outright() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!path_is_inside_root(dir.path(), "../etc/passwd"));
        assert!(!path_is_inside_root(dir.path(), "a/../../etc/passwd"));
    }

    #[test]
    fn a_real_file_under_root_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        assert!(path_is_inside_root(dir.path(), "a.rs"));
    }

    #[test]
    fn a_not_yet_existing_path_under_root_falls_back_to_syntactic_check() {
        let dir = tempfile::tempdir().unwrap();
        assert!(path_is_inside_root(dir.path(), "not_created_yet.rs"));
    }
}
