use crate::allowlist::RelationshipType;

/// PassType records which analytical pass produced a given resolved
/// relationship, for cognitive triangulation's cross-validation and for
/// operator-facing provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PassType {
    IntraFile,
    IntraDirectory,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    Pending,
    Validated,
    Rejected,
    /// Set by the Graph Ingestor once a `Validated` row has been committed
    /// into the graph store, so later cycles don't re-ingest it.
    Ingested,
}

/// ResolvedRelationship is the state-store record that the reconciliation
/// worker (C13) writes and the graph ingestor (C14) reads. Unique by
/// `(source_poi_id, target_poi_id, type)`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ResolvedRelationship {
    pub id: kg_ids::Id,
    pub source_poi_id: kg_ids::Id,
    pub target_poi_id: kg_ids::Id,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub confidence: f32,
    pub explanation: Option<String>,
    pub pass_type: PassType,
    pub status: RelationshipStatus,
}

/// A single analytical pass's claim about a relationship, prior to
/// reconciliation. Many Evidence rows sharing a `relationship_fingerprint`
/// are folded into one [`ResolvedRelationship`] by the confidence scorer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CandidateEvidence {
    pub run_id: uuid::Uuid,
    pub relationship_fingerprint: kg_ids::Fingerprint,
    pub source_poi_id: kg_ids::Id,
    pub target_poi_id: kg_ids::Id,
    #[serde(rename = "type")]
    pub kind: RelationshipType,
    pub pass_type: PassType,
    pub explanation: Option<String>,
    /// The evidence-producing pass's own confidence in the claim, prior to
    /// triangulation. Distinct from [`ResolvedRelationship::confidence`],
    /// which is the *reconciled* score across all evidence for the
    /// fingerprint.
    pub pass_confidence: f32,
}

impl CandidateEvidence {
    pub fn fingerprint(
        source_poi_id: &kg_ids::Id,
        target_poi_id: &kg_ids::Id,
        kind: RelationshipType,
    ) -> kg_ids::Fingerprint {
        kg_ids::relationship_fingerprint(
            &source_poi_id.to_string(),
            &target_poi_id.to_string(),
            kind.as_label(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_for_same_triple() {
        let a = kg_ids::Id::new([1; 8]);
        let b = kg_ids::Id::new([2; 8]);

        let f1 = CandidateEvidence::fingerprint(&a, &b, RelationshipType::Calls);
        let f2 = CandidateEvidence::fingerprint(&a, &b, RelationshipType::Calls);
        assert_eq!(f1, f2);
    }

    #[test]
    fn fingerprint_distinguishes_direction() {
        let a = kg_ids::Id::new([1; 8]);
        let b = kg_ids::Id::new([2; 8]);

        let forward = CandidateEvidence::fingerprint(&a, &b, RelationshipType::Calls);
        let backward = CandidateEvidence::fingerprint(&b, &a, RelationshipType::Calls);
        assert_ne!(forward, backward);
    }
}
