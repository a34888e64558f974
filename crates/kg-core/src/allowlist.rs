/// RelationshipType is the fixed allowlist of edges the graph ingestor will
/// ever create. It is a closed enum, not an open string: any value the LLM
/// or a worker proposes that doesn't parse into one of these variants is
/// rejected before a graph query is even built (`kg-graph` relies on this
/// exhaustiveness to use the type as a Cypher label, never as a property).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    sqlx::Type,
)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    Contains,
    Calls,
    Imports,
    Exports,
    Extends,
    Implements,
    DependsOn,
    UsesDataFrom,
    Uses,
}

impl RelationshipType {
    pub const ALL: &'static [RelationshipType] = &[
        RelationshipType::Contains,
        RelationshipType::Calls,
        RelationshipType::Imports,
        RelationshipType::Exports,
        RelationshipType::Extends,
        RelationshipType::Implements,
        RelationshipType::DependsOn,
        RelationshipType::UsesDataFrom,
        RelationshipType::Uses,
    ];

    /// The subset actively solicited by the relationship-resolution prompts.
    /// `Implements`/`DependsOn` stay in the allowlist (the ingestor must
    /// accept them if any pass ever emits them) but aren't directly asked
    /// for, since file/directory/global text rarely grounds them reliably.
    pub const SOLICITED: &'static [RelationshipType] = &[
        RelationshipType::Contains,
        RelationshipType::Calls,
        RelationshipType::Imports,
        RelationshipType::Exports,
        RelationshipType::Extends,
        RelationshipType::Uses,
        RelationshipType::UsesDataFrom,
    ];

    /// The Cypher relationship label this type is rendered as. Returning a
    /// `&'static str` drawn from a match (rather than a formatted string)
    /// is what lets `kg-graph` interpolate it as a label safely: there is no
    /// code path from arbitrary input to this string.
    pub fn as_label(self) -> &'static str {
        match self {
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Exports => "EXPORTS",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::UsesDataFrom => "USES_DATA_FROM",
            RelationshipType::Uses => "USES",
        }
    }

    /// Parses a label exactly as produced by [`RelationshipType::as_label`],
    /// rejecting anything else. This is the one gate every LLM-proposed
    /// relationship type MUST pass through before it's allowed near a graph
    /// query.
    pub fn parse(label: &str) -> Result<Self, crate::error::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_label() == label)
            .ok_or_else(|| {
                crate::error::Error::policy(format!(
                    "relationship type {label:?} is not in the allowlist"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_round_trips_through_its_label() {
        for t in RelationshipType::ALL {
            assert_eq!(RelationshipType::parse(t.as_label()).unwrap(), *t);
        }
    }

    #[test]
    fn unknown_label_is_a_policy_error() {
        let err = RelationshipType::parse("RELATES").unwrap_err();
        assert_eq!(err.kind, crate::error::Kind::Policy);
        assert!(!err.retriable());
    }
}
