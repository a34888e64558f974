pub mod allowlist;
pub mod confidence;
pub mod error;
pub mod file;
pub mod outbox;
pub mod poi;
pub mod relationship;

pub use allowlist::RelationshipType;
pub use error::{Error, Kind};
pub use file::{File, FileStatus, SpecialFileType};
pub use outbox::{DirectorySummary, OutboxEvent, OutboxStatus, RefactorKind, RefactorTask, RunManifest};
pub use poi::{Poi, PoiType};
pub use relationship::{CandidateEvidence, PassType, RelationshipStatus, ResolvedRelationship};
