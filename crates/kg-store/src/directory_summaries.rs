use crate::error::Error;
use kg_core::DirectorySummary;

pub struct DirectorySummaryRepo;

impl DirectorySummaryRepo {
    pub fn new() -> Self {
        Self
    }

    pub async fn upsert(&self, conn: &mut sqlx::PgConnection, summary: &DirectorySummary) -> Result<(), Error> {
        sqlx::query!(
            r#"
            INSERT INTO directory_summaries (run_id, directory_path, summary_text)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id, directory_path) DO UPDATE SET summary_text = EXCLUDED.summary_text
            "#,
            summary.run_id,
            summary.directory_path,
            summary.summary_text,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    /// All directory summaries for a run, the raw input the Global-Resolution
    /// worker (C9) concatenates into its single repo-wide prompt.
    pub async fn for_run(&self, pool: &sqlx::PgPool, run_id: uuid::Uuid) -> Result<Vec<DirectorySummary>, Error> {
        let rows = sqlx::query!(
            r#"SELECT run_id, directory_path, summary_text FROM directory_summaries WHERE run_id = $1"#,
            run_id,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| DirectorySummary {
                run_id: r.run_id,
                directory_path: r.directory_path,
                summary_text: r.summary_text,
            })
            .collect())
    }
}

impl Default for DirectorySummaryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn for_run_only_returns_that_runs_rows(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = DirectorySummaryRepo::new();
        let mut conn = pool.acquire().await?;
        let run_a = uuid::Uuid::new_v4();
        let run_b = uuid::Uuid::new_v4();
        repo.upsert(&mut conn, &DirectorySummary { run_id: run_a, directory_path: "src".into(), summary_text: "a".into() }).await?;
        repo.upsert(&mut conn, &DirectorySummary { run_id: run_b, directory_path: "src".into(), summary_text: "b".into() }).await?;

        let found = repo.for_run(&pool, run_a).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].summary_text, "a");
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_overwrites_same_directory(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = DirectorySummaryRepo::new();
        let mut conn = pool.acquire().await?;
        let run_id = uuid::Uuid::new_v4();
        repo.upsert(&mut conn, &DirectorySummary { run_id, directory_path: "src".into(), summary_text: "first".into() }).await?;
        repo.upsert(&mut conn, &DirectorySummary { run_id, directory_path: "src".into(), summary_text: "second".into() }).await?;

        let found = repo.for_run(&pool, run_id).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].summary_text, "second");
        Ok(())
    }
}
