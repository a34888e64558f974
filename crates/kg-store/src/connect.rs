use crate::error::Error;

/// Opens a connection pool to the state store, embeds and runs pending
/// migrations, and installs a lightweight per-release health check so a
/// connection that went bad while checked out is dropped instead of
/// silently handed to the next caller.
pub async fn connect(database_url: &str) -> Result<sqlx::PgPool, Error> {
    let pg_options = database_url
        .parse::<sqlx::postgres::PgConnectOptions>()?
        .application_name("kg-cli");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_secs(5))
        .after_release(|conn, meta| {
            Box::pin(async move {
                use sqlx::Connection;
                match tokio::time::timeout(std::time::Duration::from_secs(5), conn.ping()).await {
                    Ok(Ok(())) => Ok(true),
                    Ok(Err(err)) => {
                        tracing::warn!(error = ?err, ?meta, "connection ping failed, evicting from pool");
                        Ok(false)
                    }
                    Err(_) => {
                        tracing::warn!(?meta, "connection ping timed out, evicting from pool");
                        Ok(false)
                    }
                }
            })
        })
        .connect_with(pg_options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|err| {
        Error::Query(sqlx::Error::Migrate(Box::new(err)))
    })?;

    Ok(pool)
}
