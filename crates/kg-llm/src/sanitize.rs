use crate::error::Error;

/// Turns a raw model response into a parsed [`serde_json::Value`], tolerating
/// the handful of ways models reliably misbehave: markdown code fences around
/// the JSON, leading/trailing prose, and trailing commas before a closing
/// bracket. Never repairs anything beyond that — a response that's
/// structurally broken in some other way is a `Data` error, not something to
/// guess at.
pub fn extract_json(raw: &str) -> Result<serde_json::Value, Error> {
    let stripped = strip_code_fences(raw);
    let outer = extract_outermost(stripped).ok_or_else(|| {
        Error::MalformedJson("no JSON object or array found in response".to_string())
    })?;
    let repaired = repair_trailing_commas(outer);

    serde_json::from_str(&repaired).map_err(|err| Error::MalformedJson(err.to_string()))
}

/// Strips a single leading/trailing ``` fence, with or without a language
/// tag (` ```json `), leaving everything else untouched.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner
        .strip_prefix("json")
        .or_else(|| inner.strip_prefix("JSON"))
        .unwrap_or(inner);
    let inner = inner.strip_prefix('\n').unwrap_or(inner);

    match inner.rfind("```") {
        Some(end) => inner[..end].trim(),
        None => inner.trim(),
    }
}

/// Finds the outermost balanced `{...}` or `[...]` in `text`, ignoring
/// braces/brackets that occur inside string literals. Returns `None` if no
/// balanced structure starts before the end of the text.
fn extract_outermost(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find(['{', '['])?;

    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Removes commas that precede a closing `}` or `]`, skipping over string
/// literals so that a comma inside a quoted value is never touched.
fn repair_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }

        if c == ',' {
            // Look ahead past whitespace for a closing bracket.
            let mut lookahead = chars.clone();
            let mut saw_only_whitespace = true;
            let mut next_significant = None;
            for la in lookahead.by_ref() {
                if la.is_whitespace() {
                    continue;
                }
                saw_only_whitespace = false;
                next_significant = Some(la);
                break;
            }
            let _ = saw_only_whitespace;
            if matches!(next_significant, Some('}') | Some(']')) {
                continue; // Drop the trailing comma.
            }
        }

        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_json_object() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn strips_fenced_json_with_language_tag() {
        let raw = "```json\n{\"a\": 1}\n```";
        let v = extract_json(raw).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn extracts_json_embedded_in_prose() {
        let raw = "Sure, here are the POIs:\n{\"pois\": []}\nLet me know if you need more.";
        let v = extract_json(raw).unwrap();
        assert_eq!(v["pois"], serde_json::json!([]));
    }

    #[test]
    fn repairs_trailing_comma_before_closing_brace() {
        let raw = r#"{"a": 1, "b": 2,}"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["b"], 2);
    }

    #[test]
    fn repairs_trailing_comma_before_closing_bracket() {
        let raw = r#"{"items": [1, 2, 3,]}"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["items"], serde_json::json!([1, 2, 3]));
    }

    #[test]
    fn ignores_braces_inside_string_literals() {
        let raw = r#"{"note": "use { and } carefully", "ok": true}"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn rejects_response_with_no_json_at_all() {
        assert!(extract_json("I cannot help with that.").is_err());
    }
}
