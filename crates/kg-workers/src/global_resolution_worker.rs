use kg_llm::LlmClient;

use crate::payloads::{Finding, GlobalResolutionJob, RelationshipClaim};
use crate::prompts::{complete_relationships, wrap_as_data};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

/// Resolves inter-directory relationships (C9) once every directory summary
/// for a run is available. Seeds `run_manifests.expected_count` for every
/// fingerprint it touches in the same transaction as its own
/// `relationship-analysis-finding` outbox insert: because Global-Resolution
/// always runs after every IntraFile/IntraDirectory pass that could produce
/// evidence for the same fingerprint, `expected_count = (distinct pass
/// types evidenced so far) + 1` (the `+1` for this pass's own evidence, not
/// yet written) is race-free against Validation Worker's sentinel-backed
/// counter -- see [`crate::validation_worker`] for the matching half.
pub struct GlobalResolutionWorker<C> {
    pub store: kg_store::Store,
    pub llm: C,
    pub max_input_tokens: usize,
    pub max_correction_retries: u32,
    pub tokenizer: kg_llm::Tokenizer,
}

pub enum Outcome {
    Resolved {
        run_id: uuid::Uuid,
        relationships: Vec<RelationshipClaim>,
        manifests: Vec<kg_core::RunManifest>,
    },
    Idle,
}

impl kg_automations::Outcome for Outcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            Outcome::Resolved {
                run_id,
                relationships,
                manifests,
            } => {
                for manifest in &manifests {
                    kg_store::ManifestRepo::new().upsert(txn, manifest).await?;
                }

                if !relationships.is_empty() {
                    let finding = Finding::RelationshipAnalysis {
                        source: "kg-global-resolution-worker".to_string(),
                        job_id: uuid::Uuid::new_v4(),
                        run_id,
                        file_path: String::new(),
                        pass_type: kg_core::PassType::Global,
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
            Outcome::Idle => Ok(kg_automations::Action::Done),
        }
    }
}

impl<C: LlmClient + Send + Sync> kg_automations::Executor for GlobalResolutionWorker<C> {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::GLOBAL_RESOLUTION;

    type Receive = GlobalResolutionJob;
    type State = State;
    type Outcome = Outcome;

    async fn poll<'s>(
        &'s self,
        _pool: &'s sqlx::PgPool,
        task_id: kg_ids::Id,
        _parent_id: Option<kg_ids::Id>,
        _state: &'s mut Self::State,
        inbox: &'s mut std::collections::VecDeque<(kg_ids::Id, Option<Self::Receive>)>,
    ) -> anyhow::Result<Self::Outcome> {
        let Some((_sender, Some(job))) = inbox.pop_front() else {
            return Ok(Outcome::Idle);
        };

        let summaries = self
            .store
            .directory_summaries()
            .for_run(self.store.pool(), job.run_id)
            .await
            .map_err(kg_core::Error::from)?;

        if summaries.is_empty() {
            tracing::debug!(%task_id, run_id = %job.run_id, "no directory summaries yet, nothing to resolve");
            return Ok(Outcome::Idle);
        }

        let combined = summaries
            .iter()
            .map(|s| format!("## {}\n{}", s.directory_path, s.summary_text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let capped = self.tokenizer.truncate_middle(&combined, self.max_input_tokens);

        let prompt = format!(
            "Given the directory summaries below for a full repository, identify \
             relationships that cross directory boundaries. Return JSON of the shape \
             {{\"relationships\": [{{\"from\", \"to\", \"type\", \"explanation\", \"confidence\"}}]}}, \
             where \"from\" and \"to\" are point-of-interest ids mentioned in the summaries.\n\n{}",
            wrap_as_data(&capped),
        );

        let raw_relationships =
            complete_relationships(&self.llm, &prompt, self.max_correction_retries)
                .await
                .map_err(kg_core::Error::from)?;

        let pass_counts = self
            .store
            .relationships()
            .evidence_pass_type_counts(self.store.pool(), job.run_id)
            .await
            .map_err(kg_core::Error::from)?;

        let mut manifests = Vec::with_capacity(raw_relationships.len());
        let mut relationships = Vec::with_capacity(raw_relationships.len());

        for raw in raw_relationships {
            let fingerprint = kg_core::CandidateEvidence::fingerprint(&raw.from, &raw.to, raw.kind);
            let evidenced_so_far = pass_counts.get(&fingerprint.to_hex()).copied().unwrap_or(0);
            manifests.push(kg_core::RunManifest {
                run_id: job.run_id,
                fingerprint,
                expected_count: (evidenced_so_far + 1) as i32,
            });

            relationships.push(RelationshipClaim {
                id: uuid::Uuid::new_v4(),
                from: raw.from,
                to: raw.to,
                kind: raw.kind,
                evidence: raw.explanation,
                confidence: raw.confidence,
            });
        }

        Ok(Outcome::Resolved {
            run_id: job.run_id,
            relationships,
            manifests,
        })
    }
}
