use crate::error::Error;
use kg_core::{Poi, PoiType};

pub struct PoiRepo;

impl PoiRepo {
    pub fn new() -> Self {
        Self
    }

    /// Upserts a POI by its content-addressed id. Re-extracting the same
    /// span with the same name is idempotent; a changed confidence from a
    /// later pass overwrites the earlier one.
    pub async fn upsert(&self, conn: &mut sqlx::PgConnection, poi: &Poi) -> Result<(), Error> {
        sqlx::query!(
            r#"
            INSERT INTO points_of_interest (id, file_path, name, type, start_line, end_line, confidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                confidence = EXCLUDED.confidence
            "#,
            poi.id as kg_ids::Id,
            poi.file_path,
            poi.name,
            poi.kind as PoiType,
            poi.start_line,
            poi.end_line,
            poi.confidence,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Upserts every POI in `pois` using the caller's already-open
    /// connection, so this can run alongside other writes in the same
    /// state-store transaction (§4.3 step 5).
    pub async fn upsert_many(&self, conn: &mut sqlx::PgConnection, pois: &[Poi]) -> Result<(), Error> {
        for poi in pois {
            self.upsert(conn, poi).await?;
        }
        Ok(())
    }

    pub async fn for_file(&self, pool: &sqlx::PgPool, file_path: &str) -> Result<Vec<Poi>, Error> {
        let rows = sqlx::query!(
            r#"
            SELECT
                id as "id: kg_ids::Id",
                file_path, name,
                type as "kind: PoiType",
                start_line, end_line, confidence
            FROM points_of_interest WHERE file_path = $1
            "#,
            file_path,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Poi {
                id: r.id,
                file_path: r.file_path,
                name: r.name,
                kind: r.kind,
                start_line: r.start_line,
                end_line: r.end_line,
                confidence: r.confidence,
            })
            .collect())
    }

    /// Every POI under a directory prefix, the input to directory-level
    /// resolution passes (§4.8).
    pub async fn for_directory(&self, pool: &sqlx::PgPool, directory_prefix: &str) -> Result<Vec<Poi>, Error> {
        let rows = sqlx::query!(
            r#"
            SELECT
                id as "id: kg_ids::Id",
                file_path, name,
                type as "kind: PoiType",
                start_line, end_line, confidence
            FROM points_of_interest WHERE file_path LIKE $1
            "#,
            format!("{directory_prefix}%"),
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Poi {
                id: r.id,
                file_path: r.file_path,
                name: r.name,
                kind: r.kind,
                start_line: r.start_line,
                end_line: r.end_line,
                confidence: r.confidence,
            })
            .collect())
    }

    /// Looks up POIs by id, the input Relationship-Resolution (C10) needs to
    /// turn a `{primaryPoi, contextualPois}` job into prompt context.
    pub async fn by_ids(&self, pool: &sqlx::PgPool, ids: &[kg_ids::Id]) -> Result<Vec<Poi>, Error> {
        let ids: Vec<i64> = ids
            .iter()
            .map(|id| u64::from_be_bytes(*id.as_bytes()) as i64)
            .collect();
        let rows = sqlx::query!(
            r#"
            SELECT
                id as "id: kg_ids::Id",
                file_path, name,
                type as "kind: PoiType",
                start_line, end_line, confidence
            FROM points_of_interest WHERE id = ANY($1)
            "#,
            &ids,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| Poi {
                id: r.id,
                file_path: r.file_path,
                name: r.name,
                kind: r.kind,
                start_line: r.start_line,
                end_line: r.end_line,
                confidence: r.confidence,
            })
            .collect())
    }

    pub async fn delete_for_file(&self, conn: &mut sqlx::PgConnection, file_path: &str) -> Result<(), Error> {
        sqlx::query!("DELETE FROM points_of_interest WHERE file_path = $1", file_path)
            .execute(conn)
            .await?;

        Ok(())
    }
}

impl Default for PoiRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileRepo;

    async fn seed_file(conn: &mut sqlx::PgConnection, path: &str) -> Result<(), Error> {
        FileRepo::new().upsert(conn, &kg_core::File::new_pending(path, "abc123")).await
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_is_idempotent_by_content_fingerprint(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = PoiRepo::new();
        let mut conn = pool.acquire().await?;
        seed_file(&mut conn, "src/lib.rs").await?;

        let poi = Poi::new("src/lib.rs", "run", PoiType::Function, 10, 20, 0.9);
        repo.upsert(&mut conn, &poi).await?;
        repo.upsert(&mut conn, &poi).await?;

        let found = repo.for_file(&pool, "src/lib.rs").await?;
        assert_eq!(found.len(), 1);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn for_directory_matches_prefix_only(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = PoiRepo::new();
        let mut conn = pool.acquire().await?;
        seed_file(&mut conn, "src/a/lib.rs").await?;
        seed_file(&mut conn, "src/b/lib.rs").await?;

        repo.upsert(&mut conn, &Poi::new("src/a/lib.rs", "run", PoiType::Function, 1, 2, 0.9)).await?;
        repo.upsert(&mut conn, &Poi::new("src/b/lib.rs", "run", PoiType::Function, 1, 2, 0.9)).await?;

        let found = repo.for_directory(&pool, "src/a/").await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_path, "src/a/lib.rs");
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn delete_for_file_removes_its_pois(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = PoiRepo::new();
        let mut conn = pool.acquire().await?;
        seed_file(&mut conn, "src/lib.rs").await?;
        repo.upsert(&mut conn, &Poi::new("src/lib.rs", "run", PoiType::Function, 1, 2, 0.9)).await?;

        repo.delete_for_file(&mut conn, "src/lib.rs").await?;

        let found = repo.for_file(&pool, "src/lib.rs").await?;
        assert!(found.is_empty());
        Ok(())
    }
}
