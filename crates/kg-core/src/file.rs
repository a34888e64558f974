/// FileStatus is the per-file state machine: `Pending -> Processing ->
/// (CompletedSuccess | Failed*)`, with `SkippedFileTooLarge` reachable
/// directly from `Pending` and `DeletedOnDisk` reachable from any state via
/// the Scanner. A checksum change always resets a file back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Pending,
    Processing,
    CompletedSuccess,
    SkippedFileTooLarge,
    FailedFileNotFound,
    FailedLlmApiError,
    FailedValidationError,
    DeletedOnDisk,
}

impl FileStatus {
    /// Statuses from which a file's POIs participate in reconciliation.
    pub fn is_eligible_for_reconciliation(self) -> bool {
        matches!(self, FileStatus::CompletedSuccess)
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(
            self,
            FileStatus::FailedFileNotFound
                | FileStatus::FailedLlmApiError
                | FileStatus::FailedValidationError
        )
    }
}

/// SpecialFileType tags files that play a distinguished role in the repo
/// (package manifests, entrypoints, config) so downstream prompts can give
/// the LLM that context without re-deriving it per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SpecialFileType {
    Manifest,
    Entrypoint,
    Config,
}

/// File is the state-store record for one path in the scanned tree.
/// Unique by `path`; `checksum` is the SHA-256 of its last-read content.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct File {
    pub path: String,
    pub checksum: String,
    pub language: Option<String>,
    pub special_file_type: Option<SpecialFileType>,
    pub status: FileStatus,
    pub error_message: Option<String>,
    pub last_processed: Option<chrono::DateTime<chrono::Utc>>,
}

impl File {
    pub fn new_pending(path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: checksum.into(),
            language: None,
            special_file_type: None,
            status: FileStatus::Pending,
            error_message: None,
            last_processed: None,
        }
    }

    /// A checksum change always resets status to Pending and clears any
    /// prior error, regardless of what state the file was previously in.
    pub fn observe_checksum(&mut self, checksum: impl Into<String>) {
        let checksum = checksum.into();
        if checksum != self.checksum {
            self.checksum = checksum;
            self.status = FileStatus::Pending;
            self.error_message = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_change_resets_to_pending() {
        let mut f = File::new_pending("src/lib.rs", "abc123");
        f.status = FileStatus::CompletedSuccess;
        f.error_message = None;

        f.observe_checksum("def456");
        assert_eq!(f.status, FileStatus::Pending);
        assert_eq!(f.checksum, "def456");
    }

    #[test]
    fn unchanged_checksum_is_a_no_op() {
        let mut f = File::new_pending("src/lib.rs", "abc123");
        f.status = FileStatus::CompletedSuccess;

        f.observe_checksum("abc123");
        assert_eq!(f.status, FileStatus::CompletedSuccess);
    }

    #[test]
    fn failed_statuses_are_terminal() {
        assert!(FileStatus::FailedValidationError.is_terminal_failure());
        assert!(!FileStatus::Pending.is_terminal_failure());
        assert!(!FileStatus::CompletedSuccess.is_terminal_failure());
    }
}
