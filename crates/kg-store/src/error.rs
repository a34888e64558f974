#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("state-store query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("failed to (de)serialize state-store payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> kg_core::Kind {
        match self {
            Error::Query(sqlx::Error::PoolTimedOut) | Error::Query(sqlx::Error::Io(_)) => {
                kg_core::Kind::Transient
            }
            Error::Query(_) => kg_core::Kind::Integrity,
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
