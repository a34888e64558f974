use std::collections::HashSet;

use crate::payloads::GraphDataJob;

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

/// Periodic batch graph-write cycle (C14). Unlike every other worker here,
/// this one's `poll`/`apply` split lines up exactly with the ordinary rule
/// (no transaction across external I/O): the graph-store transaction lives
/// entirely inside `self.graph.ingest`, called from `poll`; only once that
/// commits does `apply` open its own, separate state-store transaction to
/// flip rows to `INGESTED` and clear the refactors just applied (§4.10 step
/// 5's "single state-store transaction" is its own transaction, not a
/// continuation of the graph one).
///
/// Also accepts an out-of-band `graph-data` push (§6): if one is waiting in
/// the inbox when a tick fires, its POIs and relationships are folded into
/// the same cycle's batch. Its relationships have no prior pass/evidence
/// history, so they're recorded as already `INGESTED` rather than routed
/// through reconciliation.
pub struct GraphIngestor {
    pub store: kg_store::Store,
    pub graph: kg_graph::GraphStore,
    pub batch_size: i64,
    pub tick_interval: std::time::Duration,
}

pub enum Outcome {
    Ingested {
        relationship_ids: Vec<kg_ids::Id>,
        refactor_ids: Vec<kg_ids::Id>,
        external_relationships: Vec<kg_core::ResolvedRelationship>,
        next_tick: std::time::Duration,
    },
    Idle {
        next_tick: std::time::Duration,
    },
}

impl kg_automations::Outcome for Outcome {
    async fn apply(self, txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            Outcome::Ingested {
                relationship_ids,
                refactor_ids,
                external_relationships,
                next_tick,
            } => {
                let relationships = kg_store::RelationshipRepo::new();
                relationships.mark_ingested(txn, &relationship_ids).await?;

                for rel in &external_relationships {
                    relationships.upsert_resolved(txn, rel).await?;
                }

                if !refactor_ids.is_empty() {
                    kg_store::RefactorRepo::new().delete_many(txn, &refactor_ids).await?;
                }

                Ok(kg_automations::Action::Sleep(next_tick))
            }
            Outcome::Idle { next_tick } => Ok(kg_automations::Action::Sleep(next_tick)),
        }
    }
}

impl kg_automations::Executor for GraphIngestor {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::GRAPH_INGESTOR;

    type Receive = GraphDataJob;
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
        let external = inbox.pop_front().and_then(|(_, msg)| msg);

        let refactors = self
            .store
            .refactors()
            .pending(pool, self.batch_size)
            .await
            .map_err(kg_core::Error::from)?;
        let validated = self
            .store
            .relationships()
            .validated(pool, self.batch_size)
            .await
            .map_err(kg_core::Error::from)?;

        let mut poi_ids: HashSet<kg_ids::Id> = HashSet::new();
        for rel in &validated {
            poi_ids.insert(rel.source_poi_id);
            poi_ids.insert(rel.target_poi_id);
        }
        let mut pois = if poi_ids.is_empty() {
            Vec::new()
        } else {
            self.store
                .pois()
                .by_ids(pool, &poi_ids.into_iter().collect::<Vec<_>>())
                .await
                .map_err(kg_core::Error::from)?
        };

        let mut relationships = validated;
        let mut external_relationships = Vec::new();

        if let Some(job) = external {
            pois.extend(job.graph_json.pois);
            for claim in job.graph_json.relationships {
                let rel = kg_core::ResolvedRelationship {
                    id: kg_ids::next_id(),
                    source_poi_id: claim.from,
                    target_poi_id: claim.to,
                    kind: claim.kind,
                    confidence: claim.confidence,
                    explanation: claim.evidence,
                    pass_type: kg_core::PassType::Global,
                    status: kg_core::RelationshipStatus::Ingested,
                };
                relationships.push(rel.clone());
                external_relationships.push(rel);
            }
        }

        let batch = kg_graph::IngestBatch {
            refactors: refactors.iter().map(|(_, task)| task.clone()).collect(),
            pois,
            relationships,
        };

        if batch.is_empty() {
            return Ok(Outcome::Idle {
                next_tick: self.tick_interval,
            });
        }

        if let Err(err) = self.graph.ingest(&batch).await {
            tracing::error!(%task_id, %err, "graph ingestion cycle failed, rows left unchanged for retry");
            return Ok(Outcome::Idle {
                next_tick: self.tick_interval,
            });
        }

        let relationship_ids = batch
            .relationships
            .iter()
            .filter(|rel| rel.status == kg_core::RelationshipStatus::Validated)
            .map(|rel| rel.id)
            .collect();
        let refactor_ids = refactors.into_iter().map(|(id, _)| id).collect();

        Ok(Outcome::Ingested {
            relationship_ids,
            refactor_ids,
            external_relationships,
            next_tick: self.tick_interval,
        })
    }
}
