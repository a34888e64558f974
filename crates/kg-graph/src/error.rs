#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("graph store query failed: {0}")]
    Query(#[from] neo4rs::Error),
}

impl Error {
    pub fn kind(&self) -> kg_core::Kind {
        match self {
            Error::Query(_) => kg_core::Kind::Transient,
        }
    }
}

impl From<Error> for kg_core::Error {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        kg_core::Error::new(kind, err.to_string()).with_source(err)
    }
}
