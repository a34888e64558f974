use std::path::PathBuf;

use kg_llm::LlmClient;

use crate::dispatch::spawn_root;
use crate::file_discovery_batcher::{parent_directory, path_is_inside_root};
use crate::payloads::{AnalyzeDirectoryJob, FileAnalysisJob, Finding};
use crate::prompts::{complete_pois, wrap_as_data};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

/// Reads one file, extracts its points of interest via the LLM, and persists
/// them. Also carries Directory-Aggregation's (C7) bookkeeping: having
/// successfully analyzed a file, it marks that file complete in the parent
/// directory's expected/completed job-id sets and, if that completes the
/// directory, spawns Directory-Resolution (C8) directly -- there is no
/// separate, lazily-spawned aggregation task, since `internal.create_task`
/// rejects a duplicate spawn rather than no-op'ing.
pub struct FileAnalysisWorker<C> {
    pub target_root: PathBuf,
    pub tokenizer: kg_llm::Tokenizer,
    pub llm: C,
    pub kv: tokio::sync::Mutex<kg_kv::Kv>,
    pub max_input_tokens: usize,
    pub max_correction_retries: u32,
}

pub enum WorkerOutcome {
    Analyzed {
        file_path: String,
        run_id: uuid::Uuid,
        job_id: uuid::Uuid,
        pois: Vec<kg_core::Poi>,
        directory_complete: Option<String>,
    },
    Failed {
        file_path: String,
        status: kg_core::FileStatus,
        message: String,
    },
    Idle,
}

impl kg_automations::Outcome for WorkerOutcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            WorkerOutcome::Analyzed {
                file_path,
                run_id,
                job_id,
                pois,
                directory_complete,
            } => {
                kg_store::PoiRepo::new().upsert_many(txn, &pois).await?;
                kg_store::FileRepo::new()
                    .set_status(txn, &file_path, kg_core::FileStatus::CompletedSuccess, None)
                    .await?;

                let finding = Finding::FileAnalysis {
                    source: "kg-file-analysis-worker".to_string(),
                    job_id,
                    run_id,
                    file_path: file_path.clone(),
                    pois,
                };
                let outbox_id = kg_ids::next_id();
                let event = kg_core::OutboxEvent::new(
                    outbox_id,
                    run_id,
                    "file-analysis-finding",
                    serde_json::to_value(&finding)?,
                );
                kg_store::OutboxRepo::new().insert(txn, &event).await?;

                if let Some(directory_path) = directory_complete {
                    let child_id = kg_automations::next_task_id();
                    let job = AnalyzeDirectoryJob {
                        directory_path,
                        run_id,
                    };
                    spawn_root(txn, child_id, kg_automations::task_types::DIRECTORY_RESOLUTION, &job).await?;
                }

                Ok(kg_automations::Action::Done)
            }
            WorkerOutcome::Failed {
                file_path,
                status,
                message,
            } => {
                kg_store::FileRepo::new()
                    .set_status(txn, &file_path, status, Some(&message))
                    .await?;
                Ok(kg_automations::Action::Done)
            }
            WorkerOutcome::Idle => Ok(kg_automations::Action::Done),
        }
    }
}

impl<C: LlmClient + Send + Sync> kg_automations::Executor for FileAnalysisWorker<C> {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::FILE_ANALYSIS;

    type Receive = FileAnalysisJob;
    type State = State;
    type Outcome = WorkerOutcome;

    async fn poll<'s>(
        &'s self,
        _pool: &'s sqlx::PgPool,
        task_id: kg_ids::Id,
        _parent_id: Option<kg_ids::Id>,
        _state: &'s mut Self::State,
        inbox: &'s mut std::collections::VecDeque<(kg_ids::Id, Option<Self::Receive>)>,
    ) -> anyhow::Result<Self::Outcome> {
        let Some((_sender, Some(job))) = inbox.pop_front() else {
            return Ok(WorkerOutcome::Idle);
        };

        if !path_is_inside_root(&self.target_root, &job.file_path) {
            tracing::warn!(path = %job.file_path, "rejecting analysis job for path outside target root");
            return Ok(WorkerOutcome::Failed {
                file_path: job.file_path,
                status: kg_core::FileStatus::FailedFileNotFound,
                message: "path resolves outside the target root".to_string(),
            });
        }

        let absolute = self.target_root.join(&job.file_path);
        let content = match std::fs::read_to_string(&absolute) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(%task_id, path = %job.file_path, error = %err, "file not found during analysis");
                return Ok(WorkerOutcome::Failed {
                    file_path: job.file_path,
                    status: kg_core::FileStatus::FailedFileNotFound,
                    message: err.to_string(),
                });
            }
        };

        if content.trim().is_empty() {
            tracing::warn!(%task_id, path = %job.file_path, "empty file content, rejecting");
            return Ok(WorkerOutcome::Failed {
                file_path: job.file_path,
                status: kg_core::FileStatus::FailedValidationError,
                message: "file content is empty".to_string(),
            });
        }

        let truncated = self.tokenizer.truncate_middle(&content, self.max_input_tokens);
        let prompt = format!(
            "Identify the points of interest (classes, functions, methods, variables, tables) \
             in the following file at path \"{}\". Return JSON of the shape \
             {{\"pois\": [{{\"name\", \"type\", \"start_line\", \"end_line\", \"confidence\"}}]}}.\n\n{}",
            job.file_path,
            wrap_as_data(&truncated),
        );

        let raw_pois = match complete_pois(&self.llm, &prompt, self.max_correction_retries).await {
            Ok(pois) => pois,
            Err(err) => {
                let status = match err.kind() {
                    kg_core::Kind::Data => kg_core::FileStatus::FailedValidationError,
                    _ => kg_core::FileStatus::FailedLlmApiError,
                };
                tracing::warn!(%task_id, path = %job.file_path, error = %err, "file analysis failed");
                return Ok(WorkerOutcome::Failed {
                    file_path: job.file_path,
                    status,
                    message: err.to_string(),
                });
            }
        };

        let pois: Vec<kg_core::Poi> = raw_pois
            .into_iter()
            .map(|raw| kg_core::Poi::new(&job.file_path, raw.name, raw.kind, raw.start_line, raw.end_line, raw.confidence))
            .collect();

        let directory = parent_directory(&job.file_path);
        let (is_complete, _completed, _expected) = {
            let mut kv = self.kv.lock().await;
            kv.directory_aggregation_mark_complete(job.run_id, &directory, &job.job_id.to_string())
                .await
                .map_err(kg_core::Error::from)?
        };

        Ok(WorkerOutcome::Analyzed {
            file_path: job.file_path,
            run_id: job.run_id,
            job_id: job.job_id,
            pois,
            directory_complete: if is_complete { Some(directory) } else { None },
        })
    }
}
