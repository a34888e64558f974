#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("failed to (de)serialize KV payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> kg_core::Kind {
        match self {
            Error::Redis(_) => kg_core::Kind::Transient,
            Error::Json(_) => kg_core::Kind::Data,
        }
    }
}

impl From<Error> for kg_core::Error {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        kg_core::Error::new(kind, err.to_string()).with_source(err)
    }
}
