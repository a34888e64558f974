use crate::error::Error;
use kg_core::RunManifest;

/// ManifestRepo tracks, per relationship fingerprint, how much evidence the
/// Validation Worker (C12) should wait for before reconciling. Global
/// Resolution (C9) seeds rows here once it has read every directory
/// summary for a run; the evidence counter itself lives in the KV facility,
/// not here.
pub struct ManifestRepo;

impl ManifestRepo {
    pub fn new() -> Self {
        Self
    }

    /// Seeds or updates the expected evidence count for a fingerprint.
    /// Called from Global Resolution's own transaction, since only that
    /// pass knows the final per-fingerprint pass count.
    pub async fn upsert(&self, conn: &mut sqlx::PgConnection, manifest: &RunManifest) -> Result<(), Error> {
        sqlx::query!(
            r#"
            INSERT INTO run_manifests (run_id, fingerprint, expected_count)
            VALUES ($1, $2, $3)
            ON CONFLICT (run_id, fingerprint) DO UPDATE SET expected_count = EXCLUDED.expected_count
            "#,
            manifest.run_id,
            manifest.fingerprint.to_hex(),
            manifest.expected_count,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn expected_count(
        &self,
        pool: &sqlx::PgPool,
        run_id: uuid::Uuid,
        fingerprint: &kg_ids::Fingerprint,
    ) -> Result<Option<i32>, Error> {
        let row = sqlx::query!(
            r#"SELECT expected_count FROM run_manifests WHERE run_id = $1 AND fingerprint = $2"#,
            run_id,
            fingerprint.to_hex(),
        )
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| r.expected_count))
    }
}

impl Default for ManifestRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn expected_count_is_none_until_seeded(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = ManifestRepo::new();
        let fingerprint = kg_ids::Fingerprint::of(&["a", "b", "CALLS"]);
        let missing = repo.expected_count(&pool, uuid::Uuid::new_v4(), &fingerprint).await?;
        assert!(missing.is_none());
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_then_expected_count_round_trips_and_overwrites(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = ManifestRepo::new();
        let mut conn = pool.acquire().await?;
        let run_id = uuid::Uuid::new_v4();
        let fingerprint = kg_ids::Fingerprint::of(&["a", "b", "CALLS"]);

        repo.upsert(&mut conn, &RunManifest { run_id, fingerprint, expected_count: 2 }).await?;
        assert_eq!(repo.expected_count(&pool, run_id, &fingerprint).await?, Some(2));

        repo.upsert(&mut conn, &RunManifest { run_id, fingerprint, expected_count: 3 }).await?;
        assert_eq!(repo.expected_count(&pool, run_id, &fingerprint).await?, Some(3));
        Ok(())
    }
}
