/// Kind classifies an error along the lines every worker must agree on:
/// whether the bus should retry the job, and how.
///
/// Retriability is a property of the kind, never a property of the call
/// site — a worker that wants to know "should I retry" asks `kind.retriable()`
/// rather than pattern-matching on the underlying cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Network errors, 5xx responses, timeouts, bus contention. Retried with
    /// exponential backoff, then circuit-broken.
    Transient,
    /// Schema validation failure, unparsable JSON, empty input. Drives the
    /// LLM self-correction loop; exhausted retries become a terminal file
    /// status or a dead-letter entry.
    Data,
    /// File too large, path traversal, disallowed relationship type.
    /// Rejected immediately, logged, never retried.
    Policy,
    /// State-store or graph-store constraint violation or transaction
    /// failure. Always rolled back and requeued.
    Integrity,
}

impl Kind {
    /// Whether a job that failed with this kind of error should be retried
    /// by the bus. `Policy` errors are never retried: retrying a rejected
    /// file or a disallowed edge type can't produce a different outcome.
    pub fn retriable(self) -> bool {
        match self {
            Kind::Transient | Kind::Integrity => true,
            Kind::Data => true,
            Kind::Policy => false,
        }
    }
}

/// Error is the shared, classified error type threaded through kg-core's
/// callers. Component crates (kg-llm, kg-store, kg-graph, kg-kv) define
/// their own richer error enums and convert into this one at their public
/// boundary, the way estuary-flow's controllers convert into `anyhow::Error`
/// at the `Executor::poll` boundary.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct Error {
    pub kind: Kind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(Kind::Transient, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::new(Kind::Data, message)
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::new(Kind::Policy, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(Kind::Integrity, message)
    }

    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn retriable(&self) -> bool {
        self.kind.retriable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_errors_are_not_retriable() {
        assert!(!Kind::Policy.retriable());
        assert!(Kind::Transient.retriable());
        assert!(Kind::Integrity.retriable());
        assert!(Kind::Data.retriable());
    }

    #[test]
    fn error_display_includes_kind_and_message() {
        let err = Error::policy("path escapes target root");
        assert_eq!(format!("{err}"), "Policy: path escapes target root");
    }
}
