use crate::error::Error;

/// Wire shape of one POI as the model is expected to emit it: no `id`
/// (that's derived deterministically downstream) and no provenance fields
/// the model didn't actually produce.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawPoi {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: kg_core::PoiType,
    pub start_line: i32,
    pub end_line: i32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

/// Parses and validates a sanitized JSON value as `{"pois": [...]}`.
/// Returns a `Data` error carrying enough detail to build a targeted
/// self-correction prompt (the field path and the serde error message),
/// rather than a generic "invalid JSON" message.
pub fn validate_pois(value: &serde_json::Value) -> Result<Vec<RawPoi>, Error> {
    let pois = value
        .get("pois")
        .ok_or_else(|| Error::SchemaInvalid {
            attempts: 1,
            detail: "response is missing a top-level \"pois\" array".to_string(),
        })?;

    serde_json::from_value::<Vec<RawPoi>>(pois.clone()).map_err(|err| Error::SchemaInvalid {
        attempts: 1,
        detail: format!("pois[{}]: {err}", err.column()),
    })
}

/// Builds a correction prompt that quotes the original content and the
/// validation failure, so the model can target its fix instead of
/// re-guessing the whole response. Used for both JSON-parse failures and
/// schema-validation failures (§4.3 step 4).
pub fn correction_prompt(original_prompt: &str, last_response: &str, error: &str) -> String {
    format!(
        "Your previous response could not be validated:\n\n{error}\n\n\
         Your previous response was:\n```\n{last_response}\n```\n\n\
         Re-read the original request below and return ONLY a corrected JSON \
         response that fixes the validation error above. Do not change fields \
         that were not implicated by the error.\n\n{original_prompt}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_pois() {
        let value = serde_json::json!({
            "pois": [
                {"name": "getUser", "type": "Function", "start_line": 10, "end_line": 20, "confidence": 0.9},
            ]
        });
        let pois = validate_pois(&value).unwrap();
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].name, "getUser");
    }

    #[test]
    fn defaults_confidence_when_absent() {
        let value = serde_json::json!({
            "pois": [
                {"name": "User", "type": "Class", "start_line": 1, "end_line": 5},
            ]
        });
        let pois = validate_pois(&value).unwrap();
        assert_eq!(pois[0].confidence, default_confidence());
    }

    #[test]
    fn rejects_response_without_pois_key() {
        let value = serde_json::json!({"entities": []});
        let err = validate_pois(&value).unwrap_err();
        assert!(matches!(err, Error::SchemaInvalid { .. }));
    }

    #[test]
    fn rejects_poi_missing_required_field() {
        let value = serde_json::json!({"pois": [{"name": "X"}]});
        assert!(validate_pois(&value).is_err());
    }

    #[test]
    fn correction_prompt_quotes_error_and_original() {
        let prompt = correction_prompt("analyze this file", "not json", "missing \"pois\" key");
        assert!(prompt.contains("missing \"pois\" key"));
        assert!(prompt.contains("analyze this file"));
        assert!(prompt.contains("not json"));
    }
}
