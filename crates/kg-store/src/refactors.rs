use crate::error::Error;
use kg_core::{RefactorKind, RefactorTask};

/// RefactorRepo durably queues the Scanner's deletes/renames between scan
/// time (a one-shot CLI run) and the next Graph Ingestor cycle, which
/// consumes and clears them as part of its Pass A.
pub struct RefactorRepo;

impl RefactorRepo {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert_many(&self, conn: &mut sqlx::PgConnection, tasks: &[RefactorTask]) -> Result<(), Error> {
        for task in tasks {
            let id = kg_ids::next_id();
            sqlx::query!(
                r#"INSERT INTO pending_refactors (id, kind, old_path, new_path) VALUES ($1, $2, $3, $4)"#,
                id as kg_ids::Id,
                task.kind as RefactorKind,
                task.old_path,
                task.new_path,
            )
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    /// Up to `limit` queued refactors, oldest first, for one ingestion
    /// cycle's Pass A.
    pub async fn pending(&self, pool: &sqlx::PgPool, limit: i64) -> Result<Vec<(kg_ids::Id, RefactorTask)>, Error> {
        let rows = sqlx::query!(
            r#"
            SELECT
                id as "id: kg_ids::Id",
                kind as "kind: RefactorKind",
                old_path, new_path
            FROM pending_refactors ORDER BY id ASC LIMIT $1
            "#,
            limit,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    RefactorTask {
                        kind: r.kind,
                        old_path: r.old_path,
                        new_path: r.new_path,
                    },
                )
            })
            .collect())
    }

    /// Clears the given refactors once their ingestion cycle's graph
    /// transaction has committed.
    pub async fn delete_many(&self, conn: &mut sqlx::PgConnection, ids: &[kg_ids::Id]) -> Result<(), Error> {
        let ids: Vec<i64> = ids.iter().map(|id| u64::from_be_bytes(*id.as_bytes()) as i64).collect();
        sqlx::query!("DELETE FROM pending_refactors WHERE id = ANY($1)", &ids)
            .execute(conn)
            .await?;
        Ok(())
    }
}

impl Default for RefactorRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn insert_then_pending_round_trips(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = RefactorRepo::new();
        let mut conn = pool.acquire().await?;
        let tasks = vec![
            RefactorTask::delete("src/gone.rs"),
            RefactorTask::rename("src/old.rs", "src/new.rs"),
        ];
        repo.insert_many(&mut conn, &tasks).await?;

        let pending = repo.pending(&pool, 10).await?;
        assert_eq!(pending.len(), 2);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn pending_respects_limit(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = RefactorRepo::new();
        let mut conn = pool.acquire().await?;
        let tasks: Vec<_> = (0..5).map(|i| RefactorTask::delete(format!("src/f{i}.rs"))).collect();
        repo.insert_many(&mut conn, &tasks).await?;

        let pending = repo.pending(&pool, 2).await?;
        assert_eq!(pending.len(), 2);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_many_clears_rows(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = RefactorRepo::new();
        let mut conn = pool.acquire().await?;
        repo.insert_many(&mut conn, &[RefactorTask::delete("src/gone.rs")]).await?;

        let pending = repo.pending(&pool, 10).await?;
        let ids: Vec<kg_ids::Id> = pending.iter().map(|(id, _)| *id).collect();
        repo.delete_many(&mut conn, &ids).await?;

        let remaining = repo.pending(&pool, 10).await?;
        assert!(remaining.is_empty());
        Ok(())
    }
}
