//! TTL-gated eviction of the oldest entries

use crate::index::{data_path, sidecar_path};
use crate::types::CacheIndex;
use chrono::Utc;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

/// Evict oldest entries until at least `bytes_to_free` bytes are reclaimed.
///
/// Eviction is strictly FIFO by access time: the loop stops as soon as the
/// oldest remaining entry is still within `ttl_ms`, even if newer entries
/// past it would be expired. Returns the number of bytes actually freed; the
/// caller compares it against the requested amount.
///
/// Unlink failures never abort the loop. A data file that is already gone
/// was freed by someone else; the index entry still has to go.
pub(crate) async fn evict_until(
    index: &mut CacheIndex,
    dir: &Path,
    ttl_ms: u64,
    bytes_to_free: u64,
) -> u64 {
    let mut freed: u64 = 0;
    while freed < bytes_to_free {
        match index.oldest() {
            None => {
                debug!(needed = bytes_to_free, freed, "cache exhausted before enough space was freed");
                break;
            }
            Some(entry) => {
                let age_ms = (Utc::now() - entry.last_access).num_milliseconds();
                if age_ms <= ttl_ms as i64 {
                    debug!(
                        identifier = %entry.identifier,
                        age_ms,
                        ttl_ms,
                        "oldest entry still within ttl, stopping eviction"
                    );
                    break;
                }
            }
        }

        if let Some(entry) = index.pop_oldest() {
            if let Err(err) = fs::remove_file(data_path(dir, &entry.identifier)).await {
                warn!(
                    identifier = %entry.identifier,
                    error = %err,
                    "failed to unlink evicted data file, treating as already freed"
                );
            }
            if entry.has_metadata {
                if let Err(err) = fs::remove_file(sidecar_path(dir, &entry.identifier)).await {
                    debug!(
                        identifier = %entry.identifier,
                        error = %err,
                        "failed to unlink metadata sidecar during eviction"
                    );
                }
            }
            freed += entry.stored_size();
            debug!(
                identifier = %entry.identifier,
                size = entry.stored_size(),
                freed,
                "evicted oldest cache entry"
            );
        }
    }
    freed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CacheEntry;
    use chrono::Duration;
    use tempfile::tempdir;

    fn aged_entry(identifier: &str, data_size: u64, meta_size: u64, age_ms: i64) -> CacheEntry {
        CacheEntry::settled(
            identifier.to_string(),
            data_size,
            meta_size,
            Utc::now() - Duration::milliseconds(age_ms),
            meta_size > 0,
        )
    }

    async fn write_entry_files(dir: &Path, entry: &CacheEntry) {
        fs::write(data_path(dir, &entry.identifier), vec![0u8; entry.data_size as usize])
            .await
            .unwrap();
        if entry.has_metadata {
            fs::write(
                sidecar_path(dir, &entry.identifier),
                vec![b' '; entry.meta_size as usize],
            )
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_evicts_oldest_first_until_enough_freed() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::default();
        for (name, age_ms) in [("old", 5000i64), ("mid", 3000), ("new", 1000)] {
            let entry = aged_entry(name, 10, 0, age_ms);
            write_entry_files(dir.path(), &entry).await;
            index.insert(entry);
        }

        let freed = evict_until(&mut index, dir.path(), 0, 15).await;

        assert_eq!(freed, 20);
        assert_eq!(index.len(), 1);
        assert!(index.get("old").is_none());
        assert!(index.get("mid").is_none());
        assert!(index.get("new").is_some());
        assert!(fs::metadata(data_path(dir.path(), "old")).await.is_err());
        assert!(fs::metadata(data_path(dir.path(), "new")).await.is_ok());
    }

    #[tokio::test]
    async fn test_stops_at_entry_within_ttl() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::default();
        let expired = aged_entry("expired", 10, 0, 10_000);
        let young = aged_entry("young", 10, 0, 100);
        write_entry_files(dir.path(), &expired).await;
        write_entry_files(dir.path(), &young).await;
        index.insert(expired);
        index.insert(young);

        // Needs 20 bytes but only the expired head qualifies
        let freed = evict_until(&mut index, dir.path(), 5_000, 20).await;

        assert_eq!(freed, 10);
        assert_eq!(index.len(), 1);
        assert!(index.get("young").is_some());
    }

    #[tokio::test]
    async fn test_young_head_blocks_expired_entries_behind_it() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::default();
        // Head is young, an expired entry sits behind it. Strict FIFO means
        // nothing gets evicted.
        let young = aged_entry("young-head", 10, 0, 100);
        let expired = aged_entry("expired-behind", 10, 0, 10_000);
        write_entry_files(dir.path(), &young).await;
        write_entry_files(dir.path(), &expired).await;
        index.insert(young);
        index.insert(expired);
        // Force ordering: young first
        assert_eq!(index.oldest().unwrap().identifier, "young-head");

        let freed = evict_until(&mut index, dir.path(), 5_000, 10).await;

        assert_eq!(freed, 0);
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_data_file_does_not_abort_loop() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::default();
        // "vanished" has an index entry but no file on disk
        index.insert(aged_entry("vanished", 10, 0, 10_000));
        let survivor_target = aged_entry("target", 10, 0, 8_000);
        write_entry_files(dir.path(), &survivor_target).await;
        index.insert(survivor_target);

        let freed = evict_until(&mut index, dir.path(), 0, 20).await;

        assert_eq!(freed, 20);
        assert!(index.is_empty());
        assert_eq!(index.total_size(), 0);
    }

    #[tokio::test]
    async fn test_sidecar_removed_with_entry() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::default();
        let entry = aged_entry("with-meta", 10, 4, 10_000);
        write_entry_files(dir.path(), &entry).await;
        index.insert(entry);

        let freed = evict_until(&mut index, dir.path(), 0, 1).await;

        assert_eq!(freed, 14);
        assert!(fs::metadata(sidecar_path(dir.path(), "with-meta"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_empty_index_reports_zero_freed() {
        let dir = tempdir().unwrap();
        let mut index = CacheIndex::default();
        assert_eq!(evict_until(&mut index, dir.path(), 0, 100).await, 0);
    }
}
