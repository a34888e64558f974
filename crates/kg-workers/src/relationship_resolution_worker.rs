use kg_llm::LlmClient;

use crate::payloads::{FailedJob, Finding, RelationshipClaim, RelationshipResolutionJob};
use crate::prompts::{complete_relationships, wrap_as_data};

/// A job parked in [`State`] across a backoff `Sleep`. The durable task
/// queue always wakes a task with an empty inbox immediately once any
/// message remains queued (§ task-bus semantics), so a job that needs to
/// wait out a backoff interval must live in persisted state instead of
/// being pushed back onto the inbox.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct PendingJob {
    job: RelationshipResolutionJob,
    attempts: u32,
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State {
    pending: Option<PendingJob>,
}

/// Resolves relationships from one primary POI to its contextual POIs (C10),
/// triggered once per POI after its file finishes analysis. Retries under
/// `max_job_retries` with exponential backoff; beyond that, dead-letters the
/// original job to the `failed-jobs` outbox event rather than a dedicated
/// task type, since a permanently-failed job has nothing left to execute.
pub struct RelationshipResolutionWorker<C> {
    pub store: kg_store::Store,
    pub llm: C,
    pub max_correction_retries: u32,
    pub max_job_retries: u32,
    pub initial_backoff: std::time::Duration,
}

pub enum Outcome {
    Succeeded {
        run_id: uuid::Uuid,
        file_path: String,
        relationships: Vec<RelationshipClaim>,
    },
    Retry {
        backoff: std::time::Duration,
    },
    DeadLettered {
        run_id: uuid::Uuid,
        original_payload: serde_json::Value,
        error: String,
    },
    Idle,
}

impl kg_automations::Outcome for Outcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            Outcome::Succeeded {
                run_id,
                file_path,
                relationships,
            } => {
                if !relationships.is_empty() {
                    let finding = Finding::RelationshipAnalysis {
                        source: "kg-relationship-resolution-worker".to_string(),
                        job_id: uuid::Uuid::new_v4(),
                        run_id,
                        file_path,
                        pass_type: kg_core::PassType::IntraFile,
                        relationships,
                    };
                    let event = kg_core::OutboxEvent::new(
                        kg_ids::next_id(),
                        run_id,
                        "relationship-analysis-finding",
                        serde_json::to_value(&finding)?,
                    );
                    kg_store::OutboxRepo::new().insert(txn, &event).await?;
                }
                Ok(kg_automations::Action::Done)
            }
            Outcome::Retry { backoff } => Ok(kg_automations::Action::Sleep(backoff)),
            Outcome::DeadLettered {
                run_id,
                original_payload,
                error,
            } => {
                let failed = FailedJob {
                    original_payload,
                    error,
                    failed_at: chrono::Utc::now(),
                };
                let event = kg_core::OutboxEvent::new(
                    kg_ids::next_id(),
                    run_id,
                    "failed-jobs",
                    serde_json::to_value(&failed)?,
                );
                kg_store::OutboxRepo::new().insert(txn, &event).await?;
                Ok(kg_automations::Action::Done)
            }
            Outcome::Idle => Ok(kg_automations::Action::Done),
        }
    }
}

impl<C: LlmClient + Send + Sync> kg_automations::Executor for RelationshipResolutionWorker<C> {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::RELATIONSHIP_RESOLUTION;

    type Receive = RelationshipResolutionJob;
    type State = State;
    type Outcome = Outcome;

    async fn poll<'s>(
        &'s self,
        _pool: &'s sqlx::PgPool,
        task_id: kg_ids::Id,
        _parent_id: Option<kg_ids::Id>,
        state: &'s mut Self::State,
        inbox: &'s mut std::collections::VecDeque<(kg_ids::Id, Option<Self::Receive>)>,
    ) -> anyhow::Result<Self::Outcome> {
        let pending = match state.pending.take() {
            Some(pending) => pending,
            None => {
                let Some((_sender, Some(job))) = inbox.pop_front() else {
                    return Ok(Outcome::Idle);
                };
                PendingJob { job, attempts: 0 }
            }
        };

        match self.try_resolve(&pending.job).await {
            Ok(relationships) => Ok(Outcome::Succeeded {
                run_id: pending.job.run_id,
                file_path: pending.job.file_path,
                relationships,
            }),
            Err(err) if pending.attempts < self.max_job_retries => {
                let attempts = pending.attempts + 1;
                tracing::warn!(%task_id, attempt = attempts, %err, "relationship resolution failed, retrying");
                let backoff = self.initial_backoff * 2u32.saturating_pow(attempts.saturating_sub(1));
                state.pending = Some(PendingJob {
                    job: pending.job,
                    attempts,
                });
                Ok(Outcome::Retry { backoff })
            }
            Err(err) => {
                tracing::error!(%task_id, %err, "relationship resolution exhausted retries, dead-lettering");
                let original_payload = serde_json::to_value(&pending.job)?;
                Ok(Outcome::DeadLettered {
                    run_id: pending.job.run_id,
                    original_payload,
                    error: err.to_string(),
                })
            }
        }
    }
}

impl<C: LlmClient + Send + Sync> RelationshipResolutionWorker<C> {
    async fn try_resolve(
        &self,
        job: &RelationshipResolutionJob,
    ) -> Result<Vec<RelationshipClaim>, kg_core::Error> {
        let mut ids = vec![job.primary_poi];
        ids.extend(job.contextual_pois.iter().copied());

        let pois = self
            .store
            .pois()
            .by_ids(self.store.pool(), &ids)
            .await
            .map_err(kg_core::Error::from)?;

        let Some(primary) = pois.iter().find(|p| p.id == job.primary_poi) else {
            return Err(kg_core::Error::data("primary POI no longer exists"));
        };

        let contextual = pois
            .iter()
            .filter(|p| p.id != job.primary_poi)
            .map(|p| format!("- id={} name={} type={:?} file={}", p.id, p.name, p.kind, p.file_path))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Given the primary point of interest \"{}\" (id={}, type={:?}) in file \"{}\", \
             identify its relationships to the following contextual points of interest. \
             Return JSON of the shape {{\"relationships\": [{{\"from\", \"to\", \"type\", \
             \"explanation\", \"confidence\"}}]}}.\n\n{}",
            primary.name,
            primary.id,
            primary.kind,
            primary.file_path,
            wrap_as_data(&contextual),
        );

        let raw_relationships = complete_relationships(&self.llm, &prompt, self.max_correction_retries)
            .await
            .map_err(kg_core::Error::from)?;

        Ok(raw_relationships
            .into_iter()
            .map(|raw| RelationshipClaim {
                id: uuid::Uuid::new_v4(),
                from: raw.from,
                to: raw.to,
                kind: raw.kind,
                evidence: raw.explanation,
                confidence: raw.confidence,
            })
            .collect())
    }
}
