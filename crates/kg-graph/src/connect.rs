use crate::error::Error;

pub async fn connect(uri: &str, user: &str, password: &str, database: &str) -> Result<neo4rs::Graph, Error> {
    let config = neo4rs::ConfigBuilder::default()
        .uri(uri)
        .user(user)
        .password(password)
        .db(database)
        .build()
        .map_err(Error::Query)?;

    let graph = neo4rs::Graph::connect(config).await?;

    Ok(graph)
}
