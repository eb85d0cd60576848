use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ARCHIVE_PREFIX: &str = "backup_";
pub const ARCHIVE_EXTENSION: &str = ".sql";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub id: String,
    pub filename: String,
    pub date: String,
    pub size: String,
    pub status: String,
}

/// `backup_<epoch-ms>.sql` for the given instant.
pub fn archive_filename(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("{}{}{}", ARCHIVE_PREFIX, now.timestamp_millis(), ARCHIVE_EXTENSION)
}

pub fn archive_path(dir: &Path, now: chrono::DateTime<chrono::Utc>) -> (String, PathBuf) {
    let name = archive_filename(now);
    let path = dir.join(&name);
    (name, path)
}

pub fn is_archive_name(name: &str) -> bool {
    name.strip_prefix(ARCHIVE_PREFIX)
        .and_then(|rest| rest.strip_suffix(ARCHIVE_EXTENSION))
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

pub fn format_size_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / BYTES_PER_MB)
}

/// Builds the listing entry for one directory entry.
///
/// A file removed between `read_dir` and `stat` (retention running
/// concurrently) yields `Ok(None)`, as does anything that is not a file.
fn archive_entry(
    filename: String,
    meta: std::io::Result<std::fs::Metadata>,
) -> std::io::Result<Option<ArchiveEntry>> {
    let meta = match meta {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !meta.is_file() {
        return Ok(None);
    }

    let id = filename
        .strip_suffix(ARCHIVE_EXTENSION)
        .unwrap_or(&filename)
        .to_string();
    let date = meta
        .modified()
        .ok()
        .map(|t| {
            let dt: chrono::DateTime<chrono::Utc> = t.into();
            dt.to_rfc3339()
        })
        .unwrap_or_default();

    Ok(Some(ArchiveEntry {
        id,
        filename,
        date,
        size: format_size_mb(meta.len()),
        status: "completed".into(),
    }))
}

/// Every regular file in `dir`, in directory order.
pub fn list_archives(dir: &Path) -> std::io::Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let filename = entry.file_name().to_string_lossy().to_string();
        if let Some(archive) = archive_entry(filename, entry.metadata())? {
            entries.push(archive);
        }
    }

    Ok(entries)
}
