use std::collections::HashMap;

use kg_core::{Poi, RefactorKind, RefactorTask, RelationshipType, ResolvedRelationship};
use neo4rs::{BoltMap, BoltType};

use crate::error::Error;

/// One graph-ingestion cycle: a batch of structural refactors (deletes and
/// renames), newly-validated POIs, and newly-validated relationships. The
/// whole batch commits as a single graph transaction, or none of it does.
#[derive(Debug, Default, Clone)]
pub struct IngestBatch {
    pub refactors: Vec<RefactorTask>,
    pub pois: Vec<Poi>,
    pub relationships: Vec<ResolvedRelationship>,
}

impl IngestBatch {
    pub fn is_empty(&self) -> bool {
        self.refactors.is_empty() && self.pois.is_empty() && self.relationships.is_empty()
    }
}

pub struct GraphStore {
    graph: neo4rs::Graph,
}

impl GraphStore {
    pub fn new(graph: neo4rs::Graph) -> Self {
        Self { graph }
    }

    pub async fn connect(uri: &str, user: &str, password: &str, database: &str) -> Result<Self, Error> {
        Ok(Self::new(crate::connect::connect(uri, user, password, database).await?))
    }

    /// Runs Pass A (refactors), Pass B (node MERGE), Pass C (relationship
    /// MERGE) in that order within one transaction, per §4.10.
    pub async fn ingest(&self, batch: &IngestBatch) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut txn = self.graph.start_txn().await?;

        if let Err(err) = self.run_pass_a(&mut txn, &batch.refactors).await {
            txn.rollback().await?;
            return Err(err);
        }
        if let Err(err) = self.run_pass_b(&mut txn, &batch.pois).await {
            txn.rollback().await?;
            return Err(err);
        }
        if let Err(err) = self.run_pass_c(&mut txn, &batch.relationships).await {
            txn.rollback().await?;
            return Err(err);
        }

        txn.commit().await?;
        Ok(())
    }

    async fn run_pass_a(&self, txn: &mut neo4rs::Txn, refactors: &[RefactorTask]) -> Result<(), Error> {
        for task in refactors {
            match task.kind {
                RefactorKind::Delete => {
                    let q = neo4rs::query("MATCH (n {path: $path}) DETACH DELETE n")
                        .param("path", task.old_path.as_str());
                    txn.run(q).await?;
                }
                RefactorKind::Rename => {
                    let new_path = task
                        .new_path
                        .as_deref()
                        .expect("RefactorTask::rename always sets new_path");
                    let q = neo4rs::query("MATCH (n {path: $old_path}) SET n.path = $new_path")
                        .param("old_path", task.old_path.as_str())
                        .param("new_path", new_path);
                    txn.run(q).await?;
                }
            }
        }
        Ok(())
    }

    async fn run_pass_b(&self, txn: &mut neo4rs::Txn, pois: &[Poi]) -> Result<(), Error> {
        if pois.is_empty() {
            return Ok(());
        }

        let mut by_label: HashMap<&'static str, neo4rs::BoltList> = HashMap::new();
        for poi in pois {
            let label = poi_type_label(poi.kind);
            let mut map = BoltMap::new();
            map.put("id".into(), poi.id.to_string().into());
            map.put("path".into(), poi.file_path.as_str().into());
            map.put("name".into(), poi.name.as_str().into());
            map.put("start_line".into(), (poi.start_line as i64).into());
            map.put("end_line".into(), (poi.end_line as i64).into());
            map.put("confidence".into(), (poi.confidence as f64).into());
            by_label.entry(label).or_default().push(BoltType::Map(map));
        }

        // Cypher can't parameterize a node label either, so one UNWIND query
        // is issued per label present, same as Pass C. File nodes are
        // merged by `path` (§6: "File keyed by path"); every other label is
        // merged by the POI's stable `id`, which is what Pass C's
        // relationship endpoints match on regardless of label. Every node,
        // File or not, still carries a `path` property so Pass A's
        // delete/rename match against it.
        for (label, rows) in by_label {
            let cypher = if label == "File" {
                format!(
                    "UNWIND $rows AS row \
                     MERGE (n:{label} {{path: row.path}}) \
                     SET n.id = row.id, n.name = row.name, \
                         n.start_line = row.start_line, n.end_line = row.end_line, n.confidence = row.confidence"
                )
            } else {
                format!(
                    "UNWIND $rows AS row \
                     MERGE (n:{label} {{id: row.id}}) \
                     SET n.path = row.path, n.name = row.name, \
                         n.start_line = row.start_line, n.end_line = row.end_line, n.confidence = row.confidence"
                )
            };
            let q = neo4rs::query(&cypher).param("rows", BoltType::List(rows));
            txn.run(q).await?;
        }

        Ok(())
    }

    async fn run_pass_c(&self, txn: &mut neo4rs::Txn, relationships: &[ResolvedRelationship]) -> Result<(), Error> {
        if relationships.is_empty() {
            return Ok(());
        }

        let mut by_label: HashMap<&'static str, neo4rs::BoltList> = HashMap::new();
        for rel in relationships {
            let label = rel.kind.as_label();
            let mut map = BoltMap::new();
            map.put("source_id".into(), rel.source_poi_id.to_string().into());
            map.put("target_id".into(), rel.target_poi_id.to_string().into());
            map.put("confidence".into(), (rel.confidence as f64).into());
            map.put(
                "explanation".into(),
                rel.explanation.clone().unwrap_or_default().into(),
            );
            by_label.entry(label).or_default().push(BoltType::Map(map));
        }

        // Cypher can't parameterize a relationship label, so one UNWIND
        // query is issued per label actually present in the batch; the
        // label itself always comes from the match above, never from
        // interpolating `rel.kind`'s string form directly.
        for (label, rows) in by_label {
            let cypher = format!(
                "UNWIND $rows AS row \
                 MATCH (source {{id: row.source_id}}), (target {{id: row.target_id}}) \
                 MERGE (source)-[edge:{label}]->(target) \
                 SET edge.confidence = row.confidence, edge.explanation = row.explanation"
            );
            let q = neo4rs::query(&cypher).param("rows", BoltType::List(rows));
            txn.run(q).await?;
        }

        Ok(())
    }
}

fn poi_type_label(kind: kg_core::PoiType) -> &'static str {
    match kind {
        kg_core::PoiType::File => "File",
        kg_core::PoiType::Class => "Class",
        kg_core::PoiType::Function => "Function",
        kg_core::PoiType::Method => "Method",
        kg_core::PoiType::Variable => "Variable",
        kg_core::PoiType::Table => "Table",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relationship_type_maps_to_a_fixed_label() {
        for kind in kg_core::RelationshipType::ALL {
            let label = kind.as_label();
            assert!(label.chars().all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }

    #[test]
    fn batch_is_empty_with_no_content() {
        assert!(IngestBatch::default().is_empty());
    }

    #[test]
    fn file_is_the_only_poi_type_keyed_by_path() {
        for kind in [
            kg_core::PoiType::Class,
            kg_core::PoiType::Function,
            kg_core::PoiType::Method,
            kg_core::PoiType::Variable,
            kg_core::PoiType::Table,
        ] {
            assert_ne!(poi_type_label(kind), "File");
        }
        assert_eq!(poi_type_label(kg_core::PoiType::File), "File");
    }
}
