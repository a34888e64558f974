use crate::payloads::ReconcileRelationshipJob;

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

/// Scores one relationship fingerprint's accumulated evidence and commits
/// the result (C13), triggered once Validation (C12) observes the
/// fingerprint's evidence counter reach its expected count.
pub struct ReconciliationWorker {
    pub store: kg_store::Store,
    pub threshold: f32,
}

pub enum Outcome {
    Reconciled {
        relationship: kg_core::ResolvedRelationship,
        final_score: f32,
        has_conflict: bool,
    },
    /// The fingerprint had no resolved-relationship row by the time this
    /// job ran (evidence arrived, but the relationship skeleton write from
    /// Validation's own transaction hasn't landed, or the row was deleted
    /// upstream via `ON DELETE CASCADE`). Nothing to reconcile.
    Missing,
}

impl kg_automations::Outcome for Outcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            Outcome::Reconciled {
                relationship,
                final_score,
                has_conflict: _,
            } => {
                // `relationship.status` was already decided against
                // `ReconciliationWorker::threshold` in `poll`.
                kg_store::RelationshipRepo::new()
                    .upsert_resolved(
                        txn,
                        &kg_core::ResolvedRelationship {
                            confidence: final_score,
                            ..relationship
                        },
                    )
                    .await?;

                Ok(kg_automations::Action::Done)
            }
            Outcome::Missing => Ok(kg_automations::Action::Done),
        }
    }
}

impl kg_automations::Executor for ReconciliationWorker {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::RECONCILIATION;

    type Receive = ReconcileRelationshipJob;
    type State = State;
    type Outcome = Outcome;

    async fn poll<'s>(
        &'s self,
        pool: &'s sqlx::PgPool,
        task_id: kg_ids::Id,
        _parent_id: Option<kg_ids::Id>,
        _state: &'s mut Self::State,
        inbox: &'s mut std::collections::VecDeque<(kg_ids::Id, Option<Self::Receive>)>,
    ) -> anyhow::Result<Self::Outcome> {
        let Some((_sender, Some(job))) = inbox.pop_front() else {
            return Ok(Outcome::Missing);
        };

        let Some(relationship) = self
            .store
            .relationships()
            .find_by_fingerprint(pool, &job.fingerprint)
            .await
            .map_err(kg_core::Error::from)?
        else {
            tracing::warn!(%task_id, run_id = %job.run_id, fingerprint = %job.fingerprint, "reconcile job for unknown relationship");
            return Ok(Outcome::Missing);
        };

        let evidence = self
            .store
            .relationships()
            .evidence_for(pool, relationship.id)
            .await
            .map_err(kg_core::Error::from)?;

        let pass_confidences: Vec<f32> = evidence.iter().map(|e| e.pass_confidence).collect();
        let reconciled = kg_core::confidence::reconcile(&pass_confidences);

        if reconciled.has_conflict {
            tracing::warn!(
                %task_id,
                run_id = %job.run_id,
                relationship_id = %relationship.id,
                final_score = reconciled.final_score,
                evidence_count = evidence.len(),
                "conflicting evidence for relationship",
            );
        }

        let status = if reconciled.final_score > self.threshold {
            kg_core::RelationshipStatus::Validated
        } else {
            kg_core::RelationshipStatus::Rejected
        };

        Ok(Outcome::Reconciled {
            relationship: kg_core::ResolvedRelationship {
                status,
                ..relationship
            },
            final_score: reconciled.final_score,
            has_conflict: reconciled.has_conflict,
        })
    }
}
