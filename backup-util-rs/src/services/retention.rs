use crate::models::archive::{is_archive_name, ARCHIVE_EXTENSION, ARCHIVE_PREFIX};
use std::collections::HashSet;
use std::path::Path;

fn archive_timestamp(name: &str) -> Option<u128> {
    name.strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_EXTENSION)?
        .parse()
        .ok()
}

/// Keeps the `keep` newest archives in `dir` and removes the rest.
///
/// Files that do not look like archives are left alone, as are names in
/// `protected` (dumps still being written). Protected archives do not count
/// towards `keep`. Returns the names of the removed archives.
pub fn prune_archives(
    dir: &Path,
    keep: usize,
    protected: &HashSet<String>,
) -> std::io::Result<Vec<String>> {
    let mut archives: Vec<(u128, String)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            if !is_archive_name(&name) || protected.contains(&name) {
                return None;
            }
            archive_timestamp(&name).map(|ts| (ts, name))
        })
        .collect();

    archives.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = Vec::new();
    for (_, name) in archives.into_iter().skip(keep) {
        match std::fs::remove_file(dir.join(&name)) {
            Ok(()) => {
                tracing::info!(archive = %name, "Removed old archive");
                removed.push(name);
            }
            Err(e) => tracing::warn!(archive = %name, error = %e, "Failed to remove old archive"),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_prune_keeps_newest() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for ts in ["900", "1000", "20000", "3000"] {
            fs::write(temp_dir.path().join(format!("backup_{ts}.sql")), b"--")?;
        }

        let mut removed = prune_archives(temp_dir.path(), 2, &HashSet::new())?;
        removed.sort();
        assert_eq!(removed, vec!["backup_1000.sql", "backup_900.sql"]);

        assert!(temp_dir.path().join("backup_20000.sql").exists());
        assert!(temp_dir.path().join("backup_3000.sql").exists());
        Ok(())
    }

    #[test]
    fn test_prune_ignores_foreign_files() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("backup_1.sql"), b"--")?;
        fs::write(temp_dir.path().join("backup_2.sql"), b"--")?;
        fs::write(temp_dir.path().join("README.txt"), b"keep me")?;

        let removed = prune_archives(temp_dir.path(), 1, &HashSet::new())?;
        assert_eq!(removed, vec!["backup_1.sql"]);
        assert!(temp_dir.path().join("README.txt").exists());
        Ok(())
    }

    #[test]
    fn test_prune_under_limit_is_noop() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("backup_1.sql"), b"--")?;
        assert!(prune_archives(temp_dir.path(), 5, &HashSet::new())?.is_empty());
        Ok(())
    }

    #[test]
    fn test_prune_skips_archives_in_flight() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        for ts in ["100", "200", "300"] {
            fs::write(temp_dir.path().join(format!("backup_{ts}.sql")), b"--")?;
        }
        let in_flight: HashSet<String> = ["backup_100.sql".to_string()].into();

        let removed = prune_archives(temp_dir.path(), 1, &in_flight)?;
        assert_eq!(removed, vec!["backup_200.sql"]);
        assert!(temp_dir.path().join("backup_100.sql").exists());
        assert!(temp_dir.path().join("backup_300.sql").exists());
        Ok(())
    }
}
