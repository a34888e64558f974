use crate::dispatch::spawn_root;

/// Maps an outbox `event_type` onto the `TaskType` queue that consumes it
/// (§6's fixed bus queue names). `file-analysis-finding`,
/// `directory-analysis-finding` and `relationship-analysis-finding` all feed
/// the single `analysis-findings-queue` consumed by the Validation Worker;
/// `reconcile-relationship` feeds the reconciliation queue. `failed-jobs`
/// has no consumer queue -- the outbox row itself *is* the dead-letter
/// record, so publishing it is just marking it `PUBLISHED`.
fn target_task_type(event_type: &str) -> Option<kg_automations::TaskType> {
    match event_type {
        "file-analysis-finding" | "directory-analysis-finding" | "relationship-analysis-finding" => {
            Some(kg_automations::task_types::VALIDATION)
        }
        "reconcile-relationship" => Some(kg_automations::task_types::RECONCILIATION),
        _ => None,
    }
}

#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct State;

/// Moves `PENDING` outbox rows to `PUBLISHED` exactly once per row (C11).
///
/// Every other worker in this pipeline keeps `poll` (I/O) and
/// `Outcome::apply` (the one state-store transaction) strictly separate, so
/// no transaction is ever held across an LLM call. The Publisher is the
/// named exception: its bus *is* the same Postgres database the state store
/// lives in, so "submit to the bus" and "mark published" can and must
/// happen in one transaction without ever waiting on a genuinely external
/// service inside it. That transaction is opened and committed directly in
/// `poll`; `Outcome::apply` does nothing but schedule the next tick, since
/// by the time it runs all of the tick's writes have already landed.
///
/// Each row gets its own nested transaction (a Postgres `SAVEPOINT`) inside
/// the tick transaction, so one row's bus-submit failure rolls back just
/// that row -- leaving it `PENDING` for the next tick -- without aborting
/// the rows already published this tick.
pub struct OutboxPublisher {
    pub batch_size: i64,
    pub tick_interval: std::time::Duration,
    pub max_retries: i32,
}

pub enum Outcome {
    Ticked { next_tick: std::time::Duration },
}

impl kg_automations::Outcome for Outcome {
    async fn apply(self, _txn: &mut sqlx::PgConnection) -> anyhow::Result<kg_automations::Action> {
        match self {
            Outcome::Ticked { next_tick } => Ok(kg_automations::Action::Sleep(next_tick)),
        }
    }
}

impl kg_automations::Executor for OutboxPublisher {
    const TASK_TYPE: kg_automations::TaskType = kg_automations::task_types::OUTBOX_PUBLISHER;

    type Receive = ();
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
        inbox.clear();

        let mut txn = pool.begin().await?;
        let repo = kg_store::OutboxRepo::new();
        let rows = repo.pending_batch_for_update(&mut txn, self.batch_size).await?;

        for row in rows {
            let Some(task_type) = target_task_type(&row.event_type) else {
                repo.mark_published(&mut txn, row.id).await?;
                continue;
            };

            let mut nested = txn.begin().await?;
            let child_id = kg_automations::next_task_id();
            let submitted = spawn_root(&mut nested, child_id, task_type, &row.payload).await;

            match submitted {
                Ok(()) => {
                    repo.mark_published(&mut nested, row.id).await?;
                    nested.commit().await?;
                }
                Err(err) => {
                    nested.rollback().await?;
                    tracing::warn!(%task_id, outbox_id = %row.id, %err, "outbox bus submit failed");

                    let retries = repo.increment_retry_count(&mut txn, row.id).await?;
                    if retries >= self.max_retries {
                        tracing::error!(%task_id, outbox_id = %row.id, retries, "outbox row exceeded retry ceiling, marking dead");
                        repo.mark_dead(&mut txn, row.id).await?;
                    }
                }
            }
        }

        txn.commit().await?;

        Ok(Outcome::Ticked {
            next_tick: self.tick_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_route_to_validation() {
        for event_type in ["file-analysis-finding", "directory-analysis-finding", "relationship-analysis-finding"] {
            assert_eq!(target_task_type(event_type), Some(kg_automations::task_types::VALIDATION));
        }
    }

    #[test]
    fn reconcile_routes_to_reconciliation() {
        assert_eq!(target_task_type("reconcile-relationship"), Some(kg_automations::task_types::RECONCILIATION));
    }

    #[test]
    fn failed_jobs_and_unknown_event_types_have_no_queue() {
        assert_eq!(target_task_type("failed-jobs"), None);
        assert_eq!(target_task_type("something-unrecognized"), None);
    }
}
