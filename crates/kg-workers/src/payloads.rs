//! Job and event payloads exchanged between workers, named and field-shaped
//! per the fixed external-interface envelopes: `jobId`/`runId`/`filePath`
//! stay camelCase on the wire even though the rest of this codebase is
//! snake_case Rust.

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAnalysisJob {
    pub file_path: String,
    pub run_id: uuid::Uuid,
    pub job_id: uuid::Uuid,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum Finding {
    #[serde(rename = "file-analysis-finding")]
    FileAnalysis {
        source: String,
        job_id: uuid::Uuid,
        run_id: uuid::Uuid,
        file_path: String,
        pois: Vec<kg_core::Poi>,
    },
    #[serde(rename = "directory-analysis-finding")]
    DirectoryAnalysis {
        source: String,
        job_id: uuid::Uuid,
        run_id: uuid::Uuid,
        directory_path: String,
        summary: String,
    },
    #[serde(rename = "relationship-analysis-finding")]
    RelationshipAnalysis {
        source: String,
        job_id: uuid::Uuid,
        run_id: uuid::Uuid,
        file_path: String,
        pass_type: kg_core::PassType,
        relationships: Vec<RelationshipClaim>,
    },
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RelationshipClaim {
    pub id: uuid::Uuid,
    pub from: kg_ids::Id,
    pub to: kg_ids::Id,
    #[serde(rename = "type")]
    pub kind: kg_core::RelationshipType,
    pub evidence: Option<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeDirectoryJob {
    pub directory_path: String,
    pub run_id: uuid::Uuid,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalResolutionJob {
    pub run_id: uuid::Uuid,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipResolutionJob {
    pub file_path: String,
    pub primary_poi: kg_ids::Id,
    pub contextual_pois: Vec<kg_ids::Id>,
    pub run_id: uuid::Uuid,
    pub job_id: uuid::Uuid,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRelationshipJob {
    pub run_id: uuid::Uuid,
    pub fingerprint: kg_ids::Fingerprint,
}

/// External-input envelope for the Graph Ingestor (§6): a caller outside
/// this pipeline can hand it a batch directly instead of waiting for the
/// usual `VALIDATED`-row pull. Node and edge types are validated simply by
/// deserializing into `kg_core::PoiType`/`kg_core::RelationshipType` --
/// both closed enums -- so a payload naming anything outside the fixed
/// allowlists is rejected at the JSON boundary before it ever reaches the
/// ingestor's logic.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDataJob {
    pub batch_id: uuid::Uuid,
    pub graph_json: GraphDataPayload,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GraphDataPayload {
    pub pois: Vec<kg_core::Poi>,
    pub relationships: Vec<RelationshipClaim>,
}

/// Dead-letter record for a job that exhausted its retry budget; carried as
/// the payload of a `failed-jobs` outbox event rather than a dedicated task
/// type, since a permanently-failed job has nothing left to execute.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedJob {
    pub original_payload: serde_json::Value,
    pub error: String,
    pub failed_at: chrono::DateTime<chrono::Utc>,
}
