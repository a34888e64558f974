use std::collections::HashMap;
use std::path::Path;

use kg_core::File;
use sha2::{Digest, Sha256};

/// The Scanner runs once per invocation of the `scan` CLI subcommand, not as
/// a resident bus worker: it has no `Executor` impl because its output
/// (a snapshot diff) is produced and fully persisted before any downstream
/// queue needs to see it.
pub struct ScanOutcome {
    pub new_or_modified: Vec<String>,
    pub deleted: Vec<kg_core::RefactorTask>,
}

/// Walks `root`, respecting `.gitignore`-style exclusion via the `ignore`
/// crate's walker, checksums every file with SHA-256, and diffs against
/// `previous` (a `path -> checksum` snapshot loaded from the state store).
/// Deletions and renames are reported as `RefactorTask`s: a deleted path
/// whose checksum reappears under a new path is a rename, not a
/// delete-then-create, so the graph store doesn't lose the node's history.
pub fn scan(root: &Path, previous: &HashMap<String, String>) -> std::io::Result<ScanOutcome> {
    let mut seen = HashMap::new();

    for entry in ignore::WalkBuilder::new(root).hidden(false).build() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        let content = match std::fs::read(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(path = %rel_path, error = %err, "skipping unreadable file");
                continue;
            }
        };

        let checksum = format!("{:x}", Sha256::digest(&content));
        seen.insert(rel_path, checksum);
    }

    let mut new_or_modified = Vec::new();
    for (path, checksum) in &seen {
        match previous.get(path) {
            Some(prev_checksum) if prev_checksum == checksum => {}
            _ => new_or_modified.push(path.clone()),
        }
    }

    let removed_paths: Vec<&String> = previous.keys().filter(|p| !seen.contains_key(*p)).collect();
    let added_checksums: HashMap<&String, &String> = seen
        .iter()
        .filter(|(p, _)| !previous.contains_key(*p))
        .map(|(p, c)| (c, p))
        .collect();

    let mut deleted = Vec::new();
    let mut renamed_new_paths = std::collections::HashSet::new();
    for old_path in removed_paths {
        let old_checksum = &previous[old_path];
        if let Some(new_path) = added_checksums.get(old_checksum) {
            deleted.push(kg_core::RefactorTask::rename(old_path.clone(), (*new_path).clone()));
            renamed_new_paths.insert((*new_path).clone());
        } else {
            deleted.push(kg_core::RefactorTask::delete(old_path.clone()));
        }
    }

    new_or_modified.retain(|p| !renamed_new_paths.contains(p));

    Ok(ScanOutcome {
        new_or_modified,
        deleted,
    })
}

/// Builds the `File` rows a scan's `new_or_modified` set should upsert,
/// resetting an existing file back to `Pending` on checksum change.
pub fn files_for_scan(
    root: &Path,
    paths: &[String],
    existing: &HashMap<String, File>,
) -> std::io::Result<Vec<File>> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let content = std::fs::read(root.join(path))?;
        let checksum = format!("{:x}", Sha256::digest(&content));

        let file = if let Some(existing) = existing.get(path) {
            let mut file = existing.clone();
            file.observe_checksum(checksum);
            file
        } else {
            File::new_pending(path.clone(), checksum)
        };
        out.push(file);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn first_scan_reports_every_file_as_new() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();

        let outcome = scan(dir.path(), &HashMap::new()).unwrap();

        let mut paths = outcome.new_or_modified.clone();
        paths.sort();
        assert_eq!(paths, vec!["a.rs", "b.rs"]);
        assert!(outcome.deleted.is_empty());
    }

    #[test]
    fn unchanged_file_is_not_reported_again() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let first = scan(dir.path(), &HashMap::new()).unwrap();
        let previous: HashMap<String, String> =
            files_for_scan(dir.path(), &first.new_or_modified, &HashMap::new())
                .unwrap()
                .into_iter()
                .map(|f| (f.path, f.checksum))
                .collect();

        let second = scan(dir.path(), &previous).unwrap();

        assert!(second.new_or_modified.is_empty());
        assert!(second.deleted.is_empty());
    }

    #[test]
    fn modified_file_is_reported_again() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        let mut previous = HashMap::new();
        previous.insert("a.rs".to_string(), "stale-checksum".to_string());

        let outcome = scan(dir.path(), &previous).unwrap();

        assert_eq!(outcome.new_or_modified, vec!["a.rs".to_string()]);
    }

    #[test]
    fn removed_file_with_no_checksum_match_is_a_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut previous = HashMap::new();
        previous.insert("gone.rs".to_string(), "old-checksum".to_string());

        let outcome = scan(dir.path(), &previous).unwrap();

        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.deleted[0].kind, kg_core::RefactorKind::Delete);
        assert_eq!(outcome.deleted[0].old_path, "gone.rs");
    }

    #[test]
    fn moved_file_with_unchanged_content_is_a_rename_not_new_plus_delete() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("new.rs"), "fn a() {}").unwrap();
        let checksum = format!("{:x}", sha2::Sha256::digest(b"fn a() {}"));
        let mut previous = HashMap::new();
        previous.insert("old.rs".to_string(), checksum);

        let outcome = scan(dir.path(), &previous).unwrap();

        assert!(outcome.new_or_modified.is_empty());
        assert_eq!(outcome.deleted.len(), 1);
        assert_eq!(outcome.deleted[0].kind, kg_core::RefactorKind::Rename);
        assert_eq!(outcome.deleted[0].old_path, "old.rs");
        assert_eq!(outcome.deleted[0].new_path.as_deref(), Some("new.rs"));
    }

    #[test]
    fn files_for_scan_preserves_language_across_a_rescan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();

        let mut existing_file = File::new_pending("a.rs", "stale-checksum");
        existing_file.language = Some("rust".to_string());
        let mut existing = HashMap::new();
        existing.insert("a.rs".to_string(), existing_file);

        let files = files_for_scan(dir.path(), &["a.rs".to_string()], &existing).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].language.as_deref(), Some("rust"));
        assert_ne!(files[0].checksum, "stale-checksum");
    }

    #[test]
    fn files_for_scan_creates_a_pending_file_when_unknown() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();

        let files = files_for_scan(dir.path(), &["a.rs".to_string()], &HashMap::new()).unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].status, kg_core::FileStatus::Pending);
    }
}
