use crate::payloads::{Finding, ReconcileRelationshipJob};

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

/// Accumulates triangulation evidence for candidate relationships (C12).
///
/// Configured with a single permit (§5: "Validation single-consumer
/// (concurrency handled by batching)"), so the relationship-skeleton
/// lookup, the per-pass dedup check, and the KV counter increment below can
/// run directly against the pool in `poll` without racing another
/// Validation task over the same relationship id: there is never more than
/// one. Only the evidence rows a finding actually produces, plus any
/// `reconcile-relationship` outbox events they trigger, are deferred to
/// `Outcome::apply`'s single transaction, preserving the batch's order.
pub struct ValidationWorker {
    pub store: kg_store::Store,
    pub kv: tokio::sync::Mutex<kg_kv::Kv>,
}

pub enum Outcome {
    Processed {
        run_id: uuid::Uuid,
        evidence: Vec<(kg_ids::Id, kg_core::CandidateEvidence)>,
        reconcile: Vec<ReconcileRelationshipJob>,
    },
    Skipped,
}

impl kg_automations::Outcome for Outcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            Outcome::Processed {
                run_id: _,
                evidence,
                reconcile,
            } => {
                let repo = kg_store::RelationshipRepo::new();
                for (relationship_id, candidate) in &evidence {
                    repo.record_evidence(txn, *relationship_id, candidate).await?;
                }

                for job in reconcile {
                    let child_id = kg_automations::next_task_id();
                    crate::dispatch::spawn_root(
                        txn,
                        child_id,
                        kg_automations::task_types::RECONCILIATION,
                        &job,
                    )
                    .await?;
                }

                Ok(kg_automations::Action::Done)
            }
            Outcome::Skipped => Ok(kg_automations::Action::Done),
        }
    }
}

impl kg_automations::Executor for ValidationWorker {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::VALIDATION;

    type Receive = Finding;
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
        let Some((_sender, Some(finding))) = inbox.pop_front() else {
            return Ok(Outcome::Skipped);
        };

        let Finding::RelationshipAnalysis {
            run_id,
            pass_type,
            relationships,
            ..
        } = finding
        else {
            return Ok(Outcome::Skipped);
        };

        let relationship_repo = self.store.relationships();
        let mut kv = self.kv.lock().await;

        let mut evidence = Vec::new();
        let mut reconcile = Vec::new();

        for claim in relationships {
            let fingerprint = kg_core::CandidateEvidence::fingerprint(&claim.from, &claim.to, claim.kind);

            let mut conn = pool.acquire().await?;
            let relationship_id = relationship_repo
                .get_or_create_id(&mut conn, claim.from, claim.to, claim.kind, pass_type)
                .await
                .map_err(kg_core::Error::from)?;
            drop(conn);

            let already_evidenced = relationship_repo
                .has_evidence_for_pass(pool, relationship_id, pass_type)
                .await
                .map_err(kg_core::Error::from)?;
            if already_evidenced {
                tracing::debug!(%task_id, relationship_id = %relationship_id, ?pass_type, "duplicate evidence for pass, skipping");
                continue;
            }

            let candidate = kg_core::CandidateEvidence {
                run_id,
                relationship_fingerprint: fingerprint,
                source_poi_id: claim.from,
                target_poi_id: claim.to,
                kind: claim.kind,
                pass_type,
                explanation: claim.evidence,
                pass_confidence: claim.confidence,
            };
            evidence.push((relationship_id, candidate));

            let expected = self
                .store
                .manifests()
                .expected_count(pool, run_id, &fingerprint)
                .await
                .map_err(kg_core::Error::from)?
                .map(|count| count as u32)
                .unwrap_or(u32::MAX);

            let reached = kv
                .evidence_counter_check_and_fetch(run_id, fingerprint, expected)
                .await
                .map_err(kg_core::Error::from)?;
            if reached {
                reconcile.push(ReconcileRelationshipJob { run_id, fingerprint });
            }
        }

        Ok(Outcome::Processed {
            run_id,
            evidence,
            reconcile,
        })
    }
}
