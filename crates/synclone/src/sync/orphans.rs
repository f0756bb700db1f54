//! Removal of local checkouts whose repository the organization no longer
//! lists.
//!
//! Only directories that are git checkouts are removed. Hidden entries,
//! plain files and unrelated directories below the target are left alone,
//! and the walk never descends into a checkout.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use super::executor::repo_path;
use super::types::Session;

/// Local paths of every repository the session knows about, whatever its
/// status.
pub fn expected_paths(session: &Session) -> HashSet<PathBuf> {
    session
        .repositories
        .values()
        .map(|state| repo_path(&session.request.target_dir, &state.descriptor))
        .collect()
}

/// Remove checkouts below `target_dir` that are not in `keep`.
///
/// Returns the removed paths in the order they were removed. A checkout that
/// cannot be deleted is logged and kept; a missing target directory yields no
/// removals.
pub async fn remove_orphans(target_dir: &Path, keep: &HashSet<PathBuf>) -> io::Result<Vec<PathBuf>> {
    // Directories that lead to an expected checkout (GitLab subgroups).
    let parents: HashSet<&Path> = keep
        .iter()
        .flat_map(|path| path.ancestors().skip(1))
        .filter(|path| path.starts_with(target_dir) && *path != target_dir)
        .collect();

    let mut removed = Vec::new();
    let mut pending = vec![target_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        let mut children = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            children.push(entry.path());
        }
        children.sort();

        for path in children {
            if keep.contains(&path) {
                continue;
            }
            if parents.contains(path.as_path()) {
                pending.push(path);
                continue;
            }
            if !tokio::fs::try_exists(path.join(".git")).await? {
                continue;
            }
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed orphaned checkout");
                    removed.push(path);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to remove orphaned checkout: {e}");
                }
            }
        }
    }
    Ok(removed)
}
