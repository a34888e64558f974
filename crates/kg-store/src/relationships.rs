use crate::error::Error;
use kg_core::{CandidateEvidence, PassType, RelationshipStatus, RelationshipType, ResolvedRelationship};

pub struct RelationshipRepo;

impl RelationshipRepo {
    pub fn new() -> Self {
        Self
    }

    /// Records one pass's candidate relationship as evidence without
    /// resolving it. Reconciliation later folds all evidence for a
    /// relationship id into a single confidence score.
    pub async fn record_evidence(
        &self,
        conn: &mut sqlx::PgConnection,
        relationship_id: kg_ids::Id,
        evidence: &CandidateEvidence,
    ) -> Result<(), Error> {
        let payload = serde_json::to_value(evidence)?;
        let evidence_id = kg_ids::next_id();

        sqlx::query!(
            r#"
            INSERT INTO relationship_evidence (id, relationship_id, run_id, evidence_payload)
            VALUES ($1, $2, $3, $4)
            "#,
            evidence_id as kg_ids::Id,
            relationship_id as kg_ids::Id,
            evidence.run_id,
            payload,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn evidence_for(
        &self,
        pool: &sqlx::PgPool,
        relationship_id: kg_ids::Id,
    ) -> Result<Vec<CandidateEvidence>, Error> {
        let rows = sqlx::query!(
            r#"SELECT evidence_payload FROM relationship_evidence WHERE relationship_id = $1"#,
            relationship_id as kg_ids::Id,
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|r| serde_json::from_value(r.evidence_payload).map_err(Error::from))
            .collect()
    }

    /// Upserts a resolved relationship, keyed on the (source, target, type)
    /// uniqueness constraint so repeated triangulation passes converge on a
    /// single row instead of duplicating edges. The fingerprint column is
    /// derived from the same triple, so it's always consistent with the
    /// conflict key and can be used as a lookup independent of knowing the
    /// assigned id.
    pub async fn upsert_resolved(
        &self,
        conn: &mut sqlx::PgConnection,
        rel: &ResolvedRelationship,
    ) -> Result<kg_ids::Id, Error> {
        let fingerprint =
            CandidateEvidence::fingerprint(&rel.source_poi_id, &rel.target_poi_id, rel.kind).to_hex();

        let row = sqlx::query!(
            r#"
            INSERT INTO resolved_relationships
                (id, source_poi_id, target_poi_id, type, confidence, explanation, pass_type, status, fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_poi_id, target_poi_id, type) DO UPDATE SET
                confidence = EXCLUDED.confidence,
                explanation = EXCLUDED.explanation,
                pass_type = EXCLUDED.pass_type,
                status = EXCLUDED.status
            RETURNING id as "id!: kg_ids::Id"
            "#,
            rel.id as kg_ids::Id,
            rel.source_poi_id as kg_ids::Id,
            rel.target_poi_id as kg_ids::Id,
            rel.kind.as_label(),
            rel.confidence,
            rel.explanation,
            rel.pass_type as PassType,
            rel.status as RelationshipStatus,
            fingerprint,
        )
        .fetch_one(conn)
        .await?;

        Ok(row.id)
    }

    /// Gets the relationship id for `(source, target, kind)`, creating a
    /// `Pending`, zero-confidence row if none exists yet. Used by the
    /// Validation Worker (C12) to attach evidence to a stable id without
    /// disturbing a row's status or confidence once Reconciliation (C13)
    /// has set them -- unlike [`Self::upsert_resolved`], which is the
    /// scorer's own write path and does overwrite them.
    pub async fn get_or_create_id(
        &self,
        conn: &mut sqlx::PgConnection,
        source_poi_id: kg_ids::Id,
        target_poi_id: kg_ids::Id,
        kind: RelationshipType,
        pass_type: PassType,
    ) -> Result<kg_ids::Id, Error> {
        let fingerprint = CandidateEvidence::fingerprint(&source_poi_id, &target_poi_id, kind).to_hex();
        let id = kg_ids::next_id();

        let row = sqlx::query!(
            r#"
            INSERT INTO resolved_relationships
                (id, source_poi_id, target_poi_id, type, confidence, explanation, pass_type, status, fingerprint)
            VALUES ($1, $2, $3, $4, 0.0, NULL, $5, $6, $7)
            ON CONFLICT (source_poi_id, target_poi_id, type) DO UPDATE SET
                source_poi_id = EXCLUDED.source_poi_id
            RETURNING id as "id!: kg_ids::Id"
            "#,
            id as kg_ids::Id,
            source_poi_id as kg_ids::Id,
            target_poi_id as kg_ids::Id,
            kind.as_label(),
            pass_type as PassType,
            RelationshipStatus::Pending,
            fingerprint,
        )
        .fetch_one(conn)
        .await?;

        Ok(row.id)
    }

    /// Looks up a resolved relationship by its deterministic fingerprint,
    /// the join key the Validation/Reconciliation workers use instead of
    /// the assigned id (which they don't otherwise have a way to recover).
    pub async fn find_by_fingerprint(
        &self,
        pool: &sqlx::PgPool,
        fingerprint: &kg_ids::Fingerprint,
    ) -> Result<Option<ResolvedRelationship>, Error> {
        let row = sqlx::query!(
            r#"
            SELECT
                id as "id: kg_ids::Id",
                source_poi_id as "source_poi_id: kg_ids::Id",
                target_poi_id as "target_poi_id: kg_ids::Id",
                type as relationship_type,
                confidence, explanation,
                pass_type as "pass_type: PassType",
                status as "status: RelationshipStatus"
            FROM resolved_relationships WHERE fingerprint = $1
            "#,
            fingerprint.to_hex(),
        )
        .fetch_optional(pool)
        .await?;

        row.map(|r| {
            Ok(ResolvedRelationship {
                id: r.id,
                source_poi_id: r.source_poi_id,
                target_poi_id: r.target_poi_id,
                kind: RelationshipType::parse(&r.relationship_type)
                    .map_err(|_| Error::Query(sqlx::Error::ColumnNotFound(r.relationship_type.clone())))?,
                confidence: r.confidence,
                explanation: r.explanation,
                pass_type: r.pass_type,
                status: r.status,
            })
        })
        .transpose()
    }

    /// Rows the Graph Ingestor (C14) should include in its next batch.
    pub async fn validated(&self, pool: &sqlx::PgPool, limit: i64) -> Result<Vec<ResolvedRelationship>, Error> {
        self.by_status(pool, RelationshipStatus::Validated, limit).await
    }

    async fn by_status(
        &self,
        pool: &sqlx::PgPool,
        status: RelationshipStatus,
        limit: i64,
    ) -> Result<Vec<ResolvedRelationship>, Error> {
        let rows = sqlx::query!(
            r#"
            SELECT
                id as "id: kg_ids::Id",
                source_poi_id as "source_poi_id: kg_ids::Id",
                target_poi_id as "target_poi_id: kg_ids::Id",
                type as relationship_type,
                confidence, explanation,
                pass_type as "pass_type: PassType",
                status as "status: RelationshipStatus"
            FROM resolved_relationships WHERE status = $1 LIMIT $2
            "#,
            status as RelationshipStatus,
            limit,
        )
        .fetch_all(pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(ResolvedRelationship {
                    id: r.id,
                    source_poi_id: r.source_poi_id,
                    target_poi_id: r.target_poi_id,
                    kind: RelationshipType::parse(&r.relationship_type)
                        .map_err(|_| Error::Query(sqlx::Error::ColumnNotFound(r.relationship_type.clone())))?,
                    confidence: r.confidence,
                    explanation: r.explanation,
                    pass_type: r.pass_type,
                    status: r.status,
                })
            })
            .collect()
    }

    pub async fn set_status(
        &self,
        conn: &mut sqlx::PgConnection,
        id: kg_ids::Id,
        status: RelationshipStatus,
    ) -> Result<(), Error> {
        sqlx::query!(
            "UPDATE resolved_relationships SET status = $2 WHERE id = $1",
            id as kg_ids::Id,
            status as RelationshipStatus,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn mark_ingested(&self, conn: &mut sqlx::PgConnection, ids: &[kg_ids::Id]) -> Result<(), Error> {
        for id in ids {
            self.set_status(conn, *id, RelationshipStatus::Ingested).await?;
        }
        Ok(())
    }

    /// True if this relationship already has an evidence row from the given
    /// pass. The Validation Worker (C12) checks this before writing a new
    /// row, so a pass that rediscovers the same edge from several primary
    /// POIs contributes at most one evidence row and one counter increment.
    pub async fn has_evidence_for_pass(
        &self,
        pool: &sqlx::PgPool,
        relationship_id: kg_ids::Id,
        pass_type: PassType,
    ) -> Result<bool, Error> {
        let pass_type_json = serde_json::to_value(pass_type)?;
        let row = sqlx::query!(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM relationship_evidence
                WHERE relationship_id = $1 AND evidence_payload @> jsonb_build_object('pass_type', $2::jsonb)
            ) as "exists!"
            "#,
            relationship_id as kg_ids::Id,
            pass_type_json,
        )
        .fetch_one(pool)
        .await?;

        Ok(row.exists)
    }

    /// For every fingerprint with at least one evidence row in this run,
    /// the count of *distinct* pass types that have contributed evidence so
    /// far. Global-Resolution (C9) uses this plus its own soon-to-be-written
    /// pass to seed `run_manifests.expected_count`.
    pub async fn evidence_pass_type_counts(
        &self,
        pool: &sqlx::PgPool,
        run_id: uuid::Uuid,
    ) -> Result<std::collections::HashMap<String, i64>, Error> {
        let rows = sqlx::query!(
            r#"
            SELECT
                evidence_payload ->> 'relationship_fingerprint' as "fingerprint!",
                COUNT(DISTINCT evidence_payload ->> 'pass_type') as "pass_types!"
            FROM relationship_evidence
            WHERE run_id = $1
            GROUP BY evidence_payload ->> 'relationship_fingerprint'
            "#,
            run_id,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.fingerprint, r.pass_types)).collect())
    }
}

impl Default for RelationshipRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::files::FileRepo;
    use crate::poi::PoiRepo;
    use kg_core::{Poi, PoiType};

    async fn seed_pois(conn: &mut sqlx::PgConnection) -> Result<(kg_ids::Id, kg_ids::Id), Error> {
        FileRepo::new().upsert(conn, &kg_core::File::new_pending("src/lib.rs", "abc123")).await?;
        let source = Poi::new("src/lib.rs", "caller", PoiType::Function, 1, 2, 0.9);
        let target = Poi::new("src/lib.rs", "callee", PoiType::Function, 3, 4, 0.9);
        let poi_repo = PoiRepo::new();
        poi_repo.upsert(conn, &source).await?;
        poi_repo.upsert(conn, &target).await?;
        Ok((source.id, target.id))
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn get_or_create_id_is_stable_across_calls(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = RelationshipRepo::new();
        let mut conn = pool.acquire().await?;
        let (source, target) = seed_pois(&mut conn).await?;

        let first = repo
            .get_or_create_id(&mut conn, source, target, RelationshipType::Calls, PassType::IntraFile)
            .await?;
        let second = repo
            .get_or_create_id(&mut conn, source, target, RelationshipType::Calls, PassType::Global)
            .await?;

        assert_eq!(first, second);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn get_or_create_id_does_not_disturb_a_resolved_row(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = RelationshipRepo::new();
        let mut conn = pool.acquire().await?;
        let (source, target) = seed_pois(&mut conn).await?;

        let id = repo
            .get_or_create_id(&mut conn, source, target, RelationshipType::Calls, PassType::IntraFile)
            .await?;
        repo.set_status(&mut conn, id, RelationshipStatus::Validated).await?;

        let again = repo
            .get_or_create_id(&mut conn, source, target, RelationshipType::Calls, PassType::Global)
            .await?;
        assert_eq!(id, again);

        let fingerprint = CandidateEvidence::fingerprint(&source, &target, RelationshipType::Calls);
        let loaded = repo.find_by_fingerprint(&pool, &fingerprint).await?.expect("row should exist");
        assert_eq!(loaded.status, RelationshipStatus::Validated);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn has_evidence_for_pass_dedupes_within_a_pass(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = RelationshipRepo::new();
        let mut conn = pool.acquire().await?;
        let (source, target) = seed_pois(&mut conn).await?;
        let id = repo
            .get_or_create_id(&mut conn, source, target, RelationshipType::Calls, PassType::IntraFile)
            .await?;

        assert!(!repo.has_evidence_for_pass(&pool, id, PassType::IntraFile).await?);

        let fingerprint = CandidateEvidence::fingerprint(&source, &target, RelationshipType::Calls);
        let evidence = CandidateEvidence {
            run_id: uuid::Uuid::new_v4(),
            relationship_fingerprint: fingerprint,
            source_poi_id: source,
            target_poi_id: target,
            kind: RelationshipType::Calls,
            pass_type: PassType::IntraFile,
            explanation: None,
            pass_confidence: 0.8,
        };
        repo.record_evidence(&mut conn, id, &evidence).await?;

        assert!(repo.has_evidence_for_pass(&pool, id, PassType::IntraFile).await?);
        assert!(!repo.has_evidence_for_pass(&pool, id, PassType::Global).await?);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn mark_ingested_updates_every_given_id(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = RelationshipRepo::new();
        let mut conn = pool.acquire().await?;
        let (source, target) = seed_pois(&mut conn).await?;
        let rel = ResolvedRelationship {
            id: kg_ids::next_id(),
            source_poi_id: source,
            target_poi_id: target,
            kind: RelationshipType::Calls,
            confidence: 0.9,
            explanation: None,
            pass_type: PassType::IntraFile,
            status: RelationshipStatus::Validated,
        };
        let id = repo.upsert_resolved(&mut conn, &rel).await?;

        repo.mark_ingested(&mut conn, &[id]).await?;

        let loaded = repo.validated(&pool, 10).await?;
        assert!(loaded.is_empty());
        Ok(())
    }
}
