use kg_llm::LlmClient;

use crate::payloads::{AnalyzeDirectoryJob, Finding, RelationshipClaim};
use crate::prompts::{complete_relationships, wrap_as_data};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

/// Resolves intra-directory relationships (C8) once Directory-Aggregation
/// (folded into C5/C6, see [`crate::file_analysis_worker`]) reports every
/// file under a directory analyzed. Treats the whole directory as one
/// atomic unit per poll: loading its POIs is a plain read during `poll`,
/// and both the summary and the relationship findings commit in the same
/// `Outcome::apply` transaction, a stricter reading of the per-page
/// transaction language than a literal page-by-page implementation.
pub struct DirectoryResolutionWorker<C> {
    pub store: kg_store::Store,
    pub llm: C,
    pub max_correction_retries: u32,
}

pub enum Outcome {
    Resolved {
        run_id: uuid::Uuid,
        directory_path: String,
        summary: String,
        relationships: Vec<RelationshipClaim>,
    },
    Idle,
}

impl kg_automations::Outcome for Outcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            Outcome::Resolved {
                run_id,
                directory_path,
                summary,
                relationships,
            } => {
                kg_store::DirectorySummaryRepo::new()
                    .upsert(
                        txn,
                        &kg_core::DirectorySummary {
                            run_id,
                            directory_path: directory_path.clone(),
                            summary_text: summary.clone(),
                        },
                    )
                    .await?;

                let directory_finding = Finding::DirectoryAnalysis {
                    source: "kg-directory-resolution-worker".to_string(),
                    job_id: uuid::Uuid::new_v4(),
                    run_id,
                    directory_path: directory_path.clone(),
                    summary,
                };
                let directory_event = kg_core::OutboxEvent::new(
                    kg_ids::next_id(),
                    run_id,
                    "directory-analysis-finding",
                    serde_json::to_value(&directory_finding)?,
                );
                kg_store::OutboxRepo::new().insert(txn, &directory_event).await?;

                if !relationships.is_empty() {
                    let relationship_finding = Finding::RelationshipAnalysis {
                        source: "kg-directory-resolution-worker".to_string(),
                        job_id: uuid::Uuid::new_v4(),
                        run_id,
                        file_path: directory_path,
                        pass_type: kg_core::PassType::IntraDirectory,
                        relationships,
                    };
                    let relationship_event = kg_core::OutboxEvent::new(
                        kg_ids::next_id(),
                        run_id,
                        "relationship-analysis-finding",
                        serde_json::to_value(&relationship_finding)?,
                    );
                    kg_store::OutboxRepo::new().insert(txn, &relationship_event).await?;
                }

                Ok(kg_automations::Action::Done)
            }
            Outcome::Idle => Ok(kg_automations::Action::Done),
        }
    }
}

impl<C: LlmClient + Send + Sync> kg_automations::Executor for DirectoryResolutionWorker<C> {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::DIRECTORY_RESOLUTION;

    type Receive = AnalyzeDirectoryJob;
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

        let pois = self
            .store
            .pois()
            .for_directory(self.store.pool(), &job.directory_path)
            .await
            .map_err(kg_core::Error::from)?;

        let listing = pois
            .iter()
            .map(|p| format!("- id={} file={} name={} type={:?} lines={}-{}", p.id, p.file_path, p.name, p.kind, p.start_line, p.end_line))
            .collect::<Vec<_>>()
            .join("\n");

        let relationship_prompt = format!(
            "Given the points of interest below, all within directory \"{}\", identify \
             relationships between them (calls, imports, extends, uses, etc). Return JSON of \
             the shape {{\"relationships\": [{{\"from\", \"to\", \"type\", \"explanation\", \"confidence\"}}]}}, \
             where \"from\" and \"to\" are the listed ids.\n\n{}",
            job.directory_path,
            wrap_as_data(&listing),
        );

        let raw_relationships =
            complete_relationships(&self.llm, &relationship_prompt, self.max_correction_retries)
                .await
                .map_err(kg_core::Error::from)?;

        let relationships = raw_relationships
            .into_iter()
            .map(|raw| RelationshipClaim {
                id: uuid::Uuid::new_v4(),
                from: raw.from,
                to: raw.to,
                kind: raw.kind,
                evidence: raw.explanation,
                confidence: raw.confidence,
            })
            .collect();

        let summary_prompt = format!(
            "Summarize, in a few sentences, the purpose and contents of directory \"{}\" \
             given the points of interest below.\n\n{}",
            job.directory_path,
            wrap_as_data(&listing),
        );
        let summary = self
            .llm
            .complete(&summary_prompt)
            .await
            .map_err(kg_core::Error::from)?;

        tracing::debug!(%task_id, directory = %job.directory_path, "directory resolved");

        Ok(Outcome::Resolved {
            run_id: job.run_id,
            directory_path: job.directory_path,
            summary,
            relationships,
        })
    }
}
