//! Fixed `TaskType` assignments for every automation task in the pipeline.
//! Values are stable: they're persisted in `internal.tasks.task_type` and
//! must never be reused for a different meaning.
use super::TaskType;

pub const FILE_DISCOVERY_BATCHER: TaskType = TaskType(1);
pub const FILE_ANALYSIS: TaskType = TaskType(2);
// TaskType(3) is reserved: directory-aggregation bookkeeping is folded into
// FILE_ANALYSIS's own apply rather than being a standalone task (see
// DESIGN.md's C6/C7 notes).
pub const DIRECTORY_RESOLUTION: TaskType = TaskType(4);
pub const GLOBAL_RESOLUTION: TaskType = TaskType(5);
pub const RELATIONSHIP_RESOLUTION: TaskType = TaskType(6);
pub const OUTBOX_PUBLISHER: TaskType = TaskType(7);
pub const VALIDATION: TaskType = TaskType(8);
pub const RECONCILIATION: TaskType = TaskType(9);
pub const GRAPH_INGESTOR: TaskType = TaskType(10);
