#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxStatus {
    Pending,
    Published,
    Dead,
}

/// OutboxEvent bridges a state-store transaction to the job bus. A worker
/// appends one of these in the same transaction as its domain write; the
/// Transactional Outbox Publisher (C11) is the only component that ever
/// flips its status, and does so exactly once per row.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OutboxEvent {
    pub id: kg_ids::Id,
    pub run_id: uuid::Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retry_count: i32,
}

impl OutboxEvent {
    pub fn new(
        id: kg_ids::Id,
        run_id: uuid::Uuid,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            run_id,
            event_type: event_type.into(),
            payload,
            status: OutboxStatus::Pending,
            retry_count: 0,
        }
    }
}

/// RefactorKind and RefactorTask model the structural graph changes derived
/// from a Scanner diff; they're applied by the Graph Ingestor's Pass A,
/// strictly before any node creation, to avoid path collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefactorKind {
    Delete,
    Rename,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RefactorTask {
    #[serde(rename = "type")]
    pub kind: RefactorKind,
    pub old_path: String,
    pub new_path: Option<String>,
}

impl RefactorTask {
    pub fn delete(old_path: impl Into<String>) -> Self {
        Self {
            kind: RefactorKind::Delete,
            old_path: old_path.into(),
            new_path: None,
        }
    }

    pub fn rename(old_path: impl Into<String>, new_path: impl Into<String>) -> Self {
        Self {
            kind: RefactorKind::Rename,
            old_path: old_path.into(),
            new_path: Some(new_path.into()),
        }
    }
}

/// DirectorySummary is the natural-language digest the Directory-Resolution
/// worker (C8) produces for a directory; the Global-Resolution worker (C9)
/// aggregates many of these into one prompt.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DirectorySummary {
    pub run_id: uuid::Uuid,
    pub directory_path: String,
    pub summary_text: String,
}

/// RunManifest records, per relationship fingerprint, how many evidence
/// items the Validation Worker (C12) should expect before it can fire a
/// `reconcile-relationship` job. One row is written when the fingerprint's
/// expected pass count first becomes known.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunManifest {
    pub run_id: uuid::Uuid,
    pub fingerprint: kg_ids::Fingerprint,
    pub expected_count: i32,
}
