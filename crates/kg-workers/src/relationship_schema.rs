//! Wire shape for a relationship claim as the model emits it, kept local to
//! `kg-workers` rather than `kg-llm` since it's a domain-specific schema
//! (relationship resolution) rather than a generic completion concern.

/// One candidate relationship as the model is expected to emit it. `from`
/// and `to` reference POI ids the model was given in its prompt context, so
/// unlike [`kg_llm::RawPoi`] there's no id to derive downstream.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawRelationship {
    pub from: kg_ids::Id,
    pub to: kg_ids::Id,
    #[serde(rename = "type")]
    pub kind: kg_core::RelationshipType,
    pub explanation: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

/// Parses and validates a sanitized JSON value as `{"relationships": [...]}`,
/// mirroring `kg_llm::validate_pois`'s error shape so the same
/// correction-prompt loop handles both.
pub fn validate_relationships(value: &serde_json::Value) -> Result<Vec<RawRelationship>, kg_llm::Error> {
    let relationships = value
        .get("relationships")
        .ok_or_else(|| kg_llm::Error::SchemaInvalid {
            attempts: 1,
            detail: "response is missing a top-level \"relationships\" array".to_string(),
        })?;

    serde_json::from_value::<Vec<RawRelationship>>(relationships.clone()).map_err(|err| {
        kg_llm::Error::SchemaInvalid {
            attempts: 1,
            detail: format!("relationships[{}]: {err}", err.column()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_relationships() {
        let value = serde_json::json!({
            "relationships": [
                {"from": "0000000000000001", "to": "0000000000000002", "type": "Calls", "confidence": 0.8},
            ]
        });
        let relationships = validate_relationships(&value).unwrap();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, kg_core::RelationshipType::Calls);
    }

    #[test]
    fn defaults_confidence_when_absent() {
        let value = serde_json::json!({
            "relationships": [
                {"from": "0000000000000001", "to": "0000000000000002", "type": "Imports"},
            ]
        });
        let relationships = validate_relationships(&value).unwrap();
        assert_eq!(relationships[0].confidence, default_confidence());
    }

    #[test]
    fn rejects_response_without_relationships_key() {
        let value = serde_json::json!({"edges": []});
        assert!(validate_relationships(&value).is_err());
    }

    #[test]
    fn rejects_unknown_relationship_type() {
        let value = serde_json::json!({
            "relationships": [
                {"from": "0000000000000001", "to": "0000000000000002", "type": "Orbits"},
            ]
        });
        assert!(validate_relationships(&value).is_err());
    }
}
