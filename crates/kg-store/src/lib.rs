mod connect;
pub mod directory_summaries;
pub mod error;
pub mod files;
pub mod manifests;
pub mod outbox;
pub mod poi;
pub mod refactors;
pub mod relationships;

pub use connect::connect;
pub use directory_summaries::DirectorySummaryRepo;
pub use error::Error;
pub use files::FileRepo;
pub use manifests::ManifestRepo;
pub use outbox::OutboxRepo;
pub use poi::PoiRepo;
pub use refactors::RefactorRepo;
pub use relationships::RelationshipRepo;

/// Store is a thin façade over a `PgPool`, handing out one repository per
/// table family. Repos are zero-sized: read methods take `&PgPool` and
/// write methods take `&mut PgConnection`, so a worker can run several
/// repos' writes inside the one transaction its `Outcome::apply` owns.
#[derive(Clone)]
pub struct Store {
    pool: sqlx::PgPool,
}

impl Store {
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = connect::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }

    pub fn files(&self) -> FileRepo {
        FileRepo::new()
    }

    pub fn pois(&self) -> PoiRepo {
        PoiRepo::new()
    }

    pub fn relationships(&self) -> RelationshipRepo {
        RelationshipRepo::new()
    }

    pub fn outbox(&self) -> OutboxRepo {
        OutboxRepo::new()
    }

    pub fn directory_summaries(&self) -> DirectorySummaryRepo {
        DirectorySummaryRepo::new()
    }

    pub fn manifests(&self) -> ManifestRepo {
        ManifestRepo::new()
    }

    pub fn refactors(&self) -> RefactorRepo {
        RefactorRepo::new()
    }
}
