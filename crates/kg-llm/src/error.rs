#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LLM endpoint returned an error: {0}")]
    Endpoint(#[source] anyhow::Error),

    #[error("LLM call timed out or exceeded retry budget")]
    Exhausted,

    #[error("response was not valid JSON after sanitization: {0}")]
    MalformedJson(String),

    #[error("response failed schema validation after {attempts} attempt(s): {detail}")]
    SchemaInvalid { attempts: u32, detail: String },

    #[error("circuit breaker is open; request was not attempted")]
    CircuitOpen,
}

impl Error {
    pub fn kind(&self) -> kg_core::Kind {
        match self {
            Error::Endpoint(_) | Error::Exhausted | Error::CircuitOpen => kg_core::Kind::Transient,
            Error::MalformedJson(_) | Error::SchemaInvalid { .. } => kg_core::Kind::Data,
        }
    }
}

impl From<Error> for kg_core::Error {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        kg_core::Error::new(kind, err.to_string()).with_source(err)
    }
}
