use crate::error::Error;
use kg_core::{File, FileStatus, RefactorKind, RefactorTask, SpecialFileType};

/// FileRepo is the sole writer of `files` rows. Every write is an upsert
/// keyed by `path`, so re-scanning an unchanged file is a no-op beyond the
/// round trip. Write methods take an open connection so they can run
/// inside a caller's own transaction; read methods take the pool, since
/// they're only ever used outside one (during an `Executor::poll`).
pub struct FileRepo;

impl FileRepo {
    pub fn new() -> Self {
        Self
    }

    pub async fn upsert(&self, conn: &mut sqlx::PgConnection, file: &File) -> Result<(), Error> {
        sqlx::query!(
            r#"
            INSERT INTO files (path, checksum, language, special_file_type, status, error_message, last_processed)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (path) DO UPDATE SET
                checksum = EXCLUDED.checksum,
                language = EXCLUDED.language,
                special_file_type = EXCLUDED.special_file_type,
                status = EXCLUDED.status,
                error_message = EXCLUDED.error_message,
                last_processed = EXCLUDED.last_processed
            "#,
            file.path,
            file.checksum,
            file.language,
            file.special_file_type as Option<SpecialFileType>,
            file.status as FileStatus,
            file.error_message,
            file.last_processed,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn set_status(
        &self,
        conn: &mut sqlx::PgConnection,
        path: &str,
        status: FileStatus,
        error_message: Option<&str>,
    ) -> Result<(), Error> {
        sqlx::query!(
            r#"
            UPDATE files SET status = $2, error_message = $3, last_processed = NOW()
            WHERE path = $1
            "#,
            path,
            status as FileStatus,
            error_message,
        )
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Loads the previous-run snapshot as a `path -> checksum` map, the
    /// input the Scanner diffs against (§4.1).
    pub async fn checksum_snapshot(
        &self,
        pool: &sqlx::PgPool,
    ) -> Result<std::collections::HashMap<String, String>, Error> {
        let rows = sqlx::query!("SELECT path, checksum FROM files WHERE status != 'DELETED_ON_DISK'")
            .fetch_all(pool)
            .await?;

        Ok(rows.into_iter().map(|r| (r.path, r.checksum)).collect())
    }

    /// Applies one of the Scanner's structural refactors to the `files`
    /// table itself: a delete marks the row `DELETED_ON_DISK`, a rename
    /// repoints its primary key so the row's history (status, language)
    /// survives the move. The Graph Ingestor applies the same `RefactorTask`
    /// against the graph store independently, in its own transaction.
    pub async fn apply_refactor(&self, conn: &mut sqlx::PgConnection, task: &RefactorTask) -> Result<(), Error> {
        match task.kind {
            RefactorKind::Delete => {
                self.set_status(conn, &task.old_path, FileStatus::DeletedOnDisk, None).await
            }
            RefactorKind::Rename => {
                let new_path = task.new_path.as_deref().expect("RefactorTask::rename always sets new_path");
                sqlx::query!("UPDATE files SET path = $2 WHERE path = $1", task.old_path, new_path)
                    .execute(conn)
                    .await?;
                Ok(())
            }
        }
    }

    /// Every known file, keyed by path. Used by the `scan` CLI subcommand to
    /// build the Scanner's `existing` map so a rescan preserves `language`/
    /// `special_file_type` and only resets `status` on an actual checksum
    /// change (see [`crate::files`]'s sibling `kg_workers::scanner`).
    pub async fn all(&self, pool: &sqlx::PgPool) -> Result<std::collections::HashMap<String, File>, Error> {
        let rows = sqlx::query!(
            r#"
            SELECT
                path, checksum, language,
                special_file_type as "special_file_type: SpecialFileType",
                status as "status: FileStatus",
                error_message, last_processed
            FROM files
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.path.clone(),
                    File {
                        path: r.path,
                        checksum: r.checksum,
                        language: r.language,
                        special_file_type: r.special_file_type,
                        status: r.status,
                        error_message: r.error_message,
                        last_processed: r.last_processed,
                    },
                )
            })
            .collect())
    }

    pub async fn get(&self, pool: &sqlx::PgPool, path: &str) -> Result<Option<File>, Error> {
        let row = sqlx::query!(
            r#"
            SELECT
                path, checksum, language,
                special_file_type as "special_file_type: SpecialFileType",
                status as "status: FileStatus",
                error_message, last_processed
            FROM files WHERE path = $1
            "#,
            path,
        )
        .fetch_optional(pool)
        .await?;

        Ok(row.map(|r| File {
            path: r.path,
            checksum: r.checksum,
            language: r.language,
            special_file_type: r.special_file_type,
            status: r.status,
            error_message: r.error_message,
            last_processed: r.last_processed,
        }))
    }
}

impl Default for FileRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_then_get_round_trips(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = FileRepo::new();
        let mut conn = pool.acquire().await?;
        let file = File::new_pending("src/lib.rs", "abc123");
        repo.upsert(&mut conn, &file).await?;

        let loaded = repo.get(&pool, "src/lib.rs").await?.expect("row should exist");
        assert_eq!(loaded.checksum, "abc123");
        assert_eq!(loaded.status, FileStatus::Pending);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_is_idempotent_on_path(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = FileRepo::new();
        let mut conn = pool.acquire().await?;
        let mut file = File::new_pending("src/lib.rs", "abc123");
        repo.upsert(&mut conn, &file).await?;
        file.observe_checksum("def456");
        repo.upsert(&mut conn, &file).await?;

        let loaded = repo.get(&pool, "src/lib.rs").await?.expect("row should exist");
        assert_eq!(loaded.checksum, "def456");
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn apply_refactor_delete_marks_deleted_on_disk(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = FileRepo::new();
        let mut conn = pool.acquire().await?;
        repo.upsert(&mut conn, &File::new_pending("src/old.rs", "abc123")).await?;

        repo.apply_refactor(&mut conn, &RefactorTask::delete("src/old.rs")).await?;

        let loaded = repo.get(&pool, "src/old.rs").await?.expect("row should still exist");
        assert_eq!(loaded.status, FileStatus::DeletedOnDisk);
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn apply_refactor_rename_repoints_path(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = FileRepo::new();
        let mut conn = pool.acquire().await?;
        repo.upsert(&mut conn, &File::new_pending("src/old.rs", "abc123")).await?;

        repo.apply_refactor(&mut conn, &RefactorTask::rename("src/old.rs", "src/new.rs")).await?;

        assert!(repo.get(&pool, "src/old.rs").await?.is_none());
        let loaded = repo.get(&pool, "src/new.rs").await?.expect("renamed row should exist");
        assert_eq!(loaded.checksum, "abc123");
        Ok(())
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn all_excludes_nothing_and_checksum_snapshot_excludes_deleted(pool: sqlx::PgPool) -> Result<(), Error> {
        let repo = FileRepo::new();
        let mut conn = pool.acquire().await?;
        repo.upsert(&mut conn, &File::new_pending("src/a.rs", "a1")).await?;
        repo.upsert(&mut conn, &File::new_pending("src/b.rs", "b1")).await?;
        repo.apply_refactor(&mut conn, &RefactorTask::delete("src/b.rs")).await?;

        let all = repo.all(&pool).await?;
        assert_eq!(all.len(), 2);

        let snapshot = repo.checksum_snapshot(&pool).await?;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("src/a.rs"));
        Ok(())
    }
}
