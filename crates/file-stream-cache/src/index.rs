//! Directory scan that rebuilds the in-memory index on open

use crate::error::{CacheError, Result};
use crate::hash::is_identifier;
use crate::types::{CacheEntry, CacheIndex};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Suffix appended to an identifier to name its metadata sidecar
pub(crate) const METADATA_SUFFIX: &str = ".json";

pub(crate) fn data_path(dir: &Path, identifier: &str) -> PathBuf {
    dir.join(identifier)
}

pub(crate) fn sidecar_path(dir: &Path, identifier: &str) -> PathBuf {
    dir.join(format!("{}{}", identifier, METADATA_SUFFIX))
}

/// Scan the cache directory and rebuild the entry index, creating the
/// directory (and parents) if it does not exist yet.
///
/// Only names shaped like identifiers are treated as data files, and only
/// `<identifier>.json` names as sidecars; anything else in the directory is
/// ignored.
pub(crate) async fn build(dir: &Path) -> Result<CacheIndex> {
    match fs::metadata(dir).await {
        Ok(stats) if stats.is_dir() => {}
        Ok(_) => return Err(CacheError::NotADirectory(dir.to_path_buf())),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            fs::create_dir_all(dir).await?;
        }
        Err(err) => return Err(err.into()),
    }

    let mut data_files = Vec::new();
    let mut sidecars = HashSet::new();
    let mut dirents = fs::read_dir(dir).await?;
    while let Some(dirent) = dirents.next_entry().await? {
        let name = dirent.file_name();
        let Some(name) = name.to_str() else {
            debug!(path = ?dirent.path(), "ignoring non-UTF-8 name in cache directory");
            continue;
        };
        if is_identifier(name) {
            data_files.push(name.to_string());
        } else if let Some(stem) = name.strip_suffix(METADATA_SUFFIX) {
            if is_identifier(stem) {
                sidecars.insert(stem.to_string());
            } else {
                debug!(file = name, "ignoring stray file in cache directory");
            }
        } else {
            debug!(file = name, "ignoring stray file in cache directory");
        }
    }

    let mut entries = Vec::with_capacity(data_files.len());
    for identifier in data_files {
        let stats = fs::metadata(data_path(dir, &identifier)).await?;
        let has_metadata = sidecars.contains(&identifier);
        let meta_size = if has_metadata {
            match fs::metadata(sidecar_path(dir, &identifier)).await {
                Ok(stats) => stats.len(),
                Err(_) => 0,
            }
        } else {
            0
        };
        entries.push(CacheEntry::settled(
            identifier,
            stats.len(),
            meta_size,
            access_time(&stats),
            has_metadata,
        ));
    }

    entries.sort_by_key(|entry| entry.last_access);

    let mut index = CacheIndex::default();
    for entry in entries {
        index.insert(entry);
    }
    info!(
        path = ?dir,
        entries = index.len(),
        total_size = index.total_size(),
        "cache directory scanned"
    );
    Ok(index)
}

/// Last access time of a file, falling back to the modification time (and
/// finally to now) on platforms that do not report atime
fn access_time(stats: &std::fs::Metadata) -> DateTime<Utc> {
    stats
        .accessed()
        .or_else(|_| stats.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
