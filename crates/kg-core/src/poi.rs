/// PoiType enumerates the kinds of entity the LLM is asked to recognize.
/// `Table` covers schema/DDL-derived entities; `File` lets a file itself be
/// addressed as a POI (e.g. as the source of a CONTAINS edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "PascalCase")]
#[serde(rename_all = "PascalCase")]
pub enum PoiType {
    File,
    Class,
    Function,
    Method,
    Variable,
    Table,
}

/// Poi is a Point of Interest: a named code entity detected by the LLM
/// within a single file. Its `id` is a deterministic fingerprint of
/// `(file_path, name, type, start_line, end_line)` via [`kg_ids::poi_fingerprint`],
/// so re-analyzing an unchanged file reproduces the same ids.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Poi {
    pub id: kg_ids::Id,
    pub file_path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PoiType,
    pub start_line: i32,
    pub end_line: i32,
    pub confidence: f32,
}

impl Poi {
    pub fn new(
        file_path: impl Into<String>,
        name: impl Into<String>,
        kind: PoiType,
        start_line: i32,
        end_line: i32,
        confidence: f32,
    ) -> Self {
        let file_path = file_path.into();
        let name = name.into();
        let id = kg_ids::poi_fingerprint(&file_path, &name, kind_label(kind), start_line, end_line)
            .to_id_bytes();

        Self {
            id: kg_ids::Id::new(id),
            file_path,
            name,
            kind,
            start_line,
            end_line,
            confidence,
        }
    }
}

fn kind_label(kind: PoiType) -> &'static str {
    match kind {
        PoiType::File => "File",
        PoiType::Class => "Class",
        PoiType::Function => "Function",
        PoiType::Method => "Method",
        PoiType::Variable => "Variable",
        PoiType::Table => "Table",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_produce_same_id() {
        let a = Poi::new("src/lib.rs", "getUser", PoiType::Function, 10, 20, 0.9);
        let b = Poi::new("src/lib.rs", "getUser", PoiType::Function, 10, 20, 0.4);
        assert_eq!(a.id, b.id, "id must not depend on confidence");
    }

    #[test]
    fn different_span_produces_different_id() {
        let a = Poi::new("src/lib.rs", "getUser", PoiType::Function, 10, 20, 0.9);
        let b = Poi::new("src/lib.rs", "getUser", PoiType::Function, 10, 21, 0.9);
        assert_ne!(a.id, b.id);
    }
}
