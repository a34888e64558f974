use crate::error::Error;
use kg_core::{OutboxEvent, OutboxStatus};

/// OutboxRepo is the write side of the transactional-outbox pattern: any
/// worker inserts events in the same transaction as the state change they
/// describe, and the Outbox Publisher (C11) is the only thing that ever
/// flips a row's status, doing so inside its own single per-tick
/// transaction (§4.7) — so every method here takes an open connection.
pub struct OutboxRepo;

impl OutboxRepo {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert(&self, conn: &mut sqlx::PgConnection, event: &OutboxEvent) -> Result<(), Error> {
        sqlx::query!(
            r#"
            INSERT INTO outbox (id, run_id, event_type, payload, status, retry_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
            event.id as kg_ids::Id,
            event.run_id,
            event.event_type,
            event.payload,
            event.status as OutboxStatus,
            event.retry_count,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Selects up to `limit` pending rows in insertion order, locking them
    /// `FOR UPDATE` so a concurrent publisher tick can't double-submit the
    /// same row.
    pub async fn pending_batch_for_update(
        &self,
        conn: &mut sqlx::PgConnection,
        limit: i64,
    ) -> Result<Vec<OutboxEvent>, Error> {
        let rows = sqlx::query!(
            r#"
            SELECT
                id as "id: kg_ids::Id",
                run_id, event_type, payload,
                status as "status: OutboxStatus",
                retry_count
            FROM outbox WHERE status = 'PENDING' ORDER BY id ASC LIMIT $1 FOR UPDATE
            "#,
            limit,
        )
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OutboxEvent {
                id: r.id,
                run_id: r.run_id,
                event_type: r.event_type,
                payload: r.payload,
                status: r.status,
                retry_count: r.retry_count,
            })
            .collect())
    }

    pub async fn mark_published(&self, conn: &mut sqlx::PgConnection, id: kg_ids::Id) -> Result<(), Error> {
        sqlx::query!("UPDATE outbox SET status = 'PUBLISHED' WHERE id = $1", id as kg_ids::Id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Records one more failed submission attempt, returning the row's new
    /// retry count so the caller can compare it against the configured
    /// ceiling.
    pub async fn increment_retry_count(&self, conn: &mut sqlx::PgConnection, id: kg_ids::Id) -> Result<i32, Error> {
        let row = sqlx::query!(
            r#"UPDATE outbox SET retry_count = retry_count + 1 WHERE id = $1 RETURNING retry_count"#,
            id as kg_ids::Id,
        )
        .fetch_one(conn)
        .await?;
        Ok(row.retry_count)
    }

    /// Moves a row past its retry ceiling to `DEAD`; it will never be
    /// retried again but is never deleted, per §4.7.
    pub async fn mark_dead(&self, conn: &mut sqlx::PgConnection, id: kg_ids::Id) -> Result<(), Error> {
        sqlx::query!("UPDATE outbox SET status = 'DEAD' WHERE id = $1", id as kg_ids::Id)
            .execute(conn)
            .await?;
        Ok(())
    }
}

impl Default for OutboxRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn pending_batch_excludes_published_and_dead(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = OutboxRepo::new();
        let mut tx = pool.begin().await?;
        let run_id = uuid::Uuid::new_v4();
        let keep = OutboxEvent::new(kg_ids::next_id(), run_id, "file-analysis-finding", serde_json::json!({}));
        let published = OutboxEvent::new(kg_ids::next_id(), run_id, "file-analysis-finding", serde_json::json!({}));
        repo.insert(&mut tx, &keep).await?;
        repo.insert(&mut tx, &published).await?;
        repo.mark_published(&mut tx, published.id).await?;

        let batch = repo.pending_batch_for_update(&mut tx, 10).await?;
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].id, keep.id);
        tx.commit().await?;
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn increment_retry_count_then_mark_dead(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = OutboxRepo::new();
        let mut conn = pool.acquire().await?;
        let event = OutboxEvent::new(kg_ids::next_id(), uuid::Uuid::new_v4(), "failed-jobs", serde_json::json!({}));
        repo.insert(&mut conn, &event).await?;

        let count = repo.increment_retry_count(&mut conn, event.id).await?;
        assert_eq!(count, 1);

        repo.mark_dead(&mut conn, event.id).await?;
        let mut tx = pool.begin().await?;
        let remaining = repo.pending_batch_for_update(&mut tx, 10).await?;
        assert!(remaining.is_empty());
        Ok(())
    }
}
