//! The cache engine: open, set, get, clean

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::evict;
use crate::hash::key_to_identifier;
use crate::index::{self, data_path, sidecar_path};
use crate::types::{CacheEntry, CacheIndex, CacheStats, CachedStream, WriteState};
use chrono::Utc;
use serde::Serialize;
use std::io::ErrorKind;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::watch;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct CacheState {
    opened: bool,
    next_write_id: u64,
    index: CacheIndex,
}

/// Persistent, size- and age-bounded on-disk cache for byte streams
///
/// Values are stored under hashed keys directly inside the configured
/// directory, metadata in a `<identifier>.json` sidecar next to the data
/// file. One instance owns its directory exclusively; pointing two instances
/// (or two processes) at the same path is undefined.
///
/// Running `clean` concurrently with `set`/`get` is caller responsibility to
/// avoid: it invalidates the index those operations are using.
pub struct StreamCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

impl StreamCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Open the cache, scanning the directory into the in-memory index.
    ///
    /// Idempotent: repeated or concurrent calls serialize on the state lock
    /// and observe the index built by the first one. All other operations
    /// open lazily, so calling this up front is optional.
    pub async fn open(&self) -> Result<()> {
        self.ready().await?;
        Ok(())
    }

    /// Lock the state, building the directory index first if this is the
    /// first operation to run.
    async fn ready(&self) -> Result<MutexGuard<'_, CacheState>> {
        let mut state = self.state.lock().await;
        if !state.opened {
            state.index = index::build(&self.config.path).await?;
            state.opened = true;
            info!(
                path = ?self.config.path,
                entries = state.index.len(),
                total_size = state.index.total_size(),
                "cache opened"
            );
        }
        Ok(state)
    }

    /// Store a byte stream under `key`, without metadata.
    ///
    /// Returns `Ok(false)` when the entry cannot be admitted: it is larger
    /// than the cache on its own, or eviction cannot free enough space
    /// because the oldest entries are still within their TTL.
    pub async fn set<R>(&self, key: &str, source: R, size: u64) -> Result<bool>
    where
        R: AsyncRead + Unpin,
    {
        self.set_inner(key, source, size, None).await
    }

    /// Store a byte stream under `key` with a JSON-serializable metadata
    /// value; the serialized metadata bytes count against the cache
    /// footprint along with the payload.
    pub async fn set_with_metadata<R, M>(
        &self,
        key: &str,
        source: R,
        size: u64,
        metadata: &M,
    ) -> Result<bool>
    where
        R: AsyncRead + Unpin,
        M: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(metadata)?;
        self.set_inner(key, source, size, Some(bytes)).await
    }

    async fn set_inner<R>(
        &self,
        key: &str,
        mut source: R,
        size: u64,
        meta_bytes: Option<Vec<u8>>,
    ) -> Result<bool>
    where
        R: AsyncRead + Unpin,
    {
        let identifier = key_to_identifier(key);
        let meta_size = meta_bytes.as_ref().map(|b| b.len() as u64).unwrap_or(0);
        let effective_size = size + meta_size;

        // Admission runs under the state lock: the decision plus the
        // reservation are one critical section, so concurrent sets cannot
        // double-spend freed space.
        let (write_id, completion_tx, stale_sidecar) = {
            let mut state = self.ready().await?;

            if effective_size > self.config.max_size {
                debug!(
                    key,
                    effective_size,
                    max_size = self.config.max_size,
                    "entry exceeds cache capacity on its own, rejected"
                );
                return Ok(false);
            }

            let projected = state.index.total_size() + effective_size;
            if projected > self.config.max_size {
                let needed = projected - self.config.max_size;
                let freed =
                    evict::evict_until(&mut state.index, &self.config.path, self.config.ttl_ms, needed)
                        .await;
                if freed < needed {
                    debug!(key, needed, freed, "eviction could not free enough space, rejected");
                    return Ok(false);
                }
            }

            // Replace-and-reaccount: the size of a previous entry for this
            // key is released only now that the new write is admitted. If
            // the old entry carried metadata and the new one does not, its
            // sidecar has to go during the write phase.
            let previous = state.index.remove(&identifier);
            let stale_sidecar = previous
                .as_ref()
                .is_some_and(|entry| entry.has_metadata && meta_bytes.is_none());

            state.next_write_id += 1;
            let write_id = state.next_write_id;
            let (completion_tx, completion) = watch::channel(WriteState::Pending);
            state.index.insert(CacheEntry {
                identifier: identifier.clone(),
                data_size: size,
                meta_size,
                last_access: Utc::now(),
                has_metadata: meta_bytes.is_some(),
                write_id,
                completion,
            });
            (write_id, completion_tx, stale_sidecar)
        };

        match self
            .write_entry(&identifier, &mut source, size, meta_bytes.as_deref(), stale_sidecar)
            .await
        {
            Ok(()) => {
                let _ = completion_tx.send(WriteState::Complete);
                debug!(key, identifier = %identifier, size = effective_size, "cached entry");
                Ok(true)
            }
            Err(err) => {
                let _ = completion_tx.send(WriteState::Failed);
                self.rollback(&identifier, write_id).await;
                Err(err)
            }
        }
    }

    /// Stream the payload to the data file and write the metadata sidecar
    async fn write_entry<R>(
        &self,
        identifier: &str,
        source: &mut R,
        declared_size: u64,
        meta_bytes: Option<&[u8]>,
        stale_sidecar: bool,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let path = data_path(&self.config.path, identifier);
        let mut dst = fs::File::create(&path).await?;
        let copied = tokio::io::copy(source, &mut dst).await?;
        dst.flush().await?;
        if copied != declared_size {
            return Err(CacheError::SizeMismatch {
                expected: declared_size,
                actual: copied,
            });
        }

        let sidecar = sidecar_path(&self.config.path, identifier);
        match meta_bytes {
            Some(bytes) => fs::write(&sidecar, bytes).await?,
            None if stale_sidecar => {
                if let Err(err) = fs::remove_file(&sidecar).await {
                    debug!(identifier, error = %err, "failed to remove stale metadata sidecar");
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Undo a reservation after a failed write, unless a newer write for the
    /// same key already replaced it
    async fn rollback(&self, identifier: &str, write_id: u64) {
        let mut state = self.state.lock().await;
        let owned = state
            .index
            .get(identifier)
            .map(|entry| entry.write_id == write_id)
            .unwrap_or(false);
        if !owned {
            return;
        }
        state.index.remove(identifier);
        drop(state);
        warn!(identifier, "write failed, reservation rolled back");

        // Partial files are useless without an index entry
        let _ = fs::remove_file(data_path(&self.config.path, identifier)).await;
        let _ = fs::remove_file(sidecar_path(&self.config.path, identifier)).await;
    }

    /// Look up `key`, returning a fresh read stream over its data file plus
    /// the stored payload size and deserialized metadata.
    ///
    /// A missing key is `Ok(None)`, not an error. If the entry's write is
    /// still in flight the call waits for it to settle first; a write that
    /// failed (or was dropped mid-copy) reads as a miss.
    pub async fn get(&self, key: &str) -> Result<Option<CachedStream>> {
        let identifier = key_to_identifier(key);
        let entry = {
            let state = self.ready().await?;
            match state.index.get(&identifier) {
                Some(entry) => entry.clone(),
                None => {
                    debug!(key, "cache miss");
                    return Ok(None);
                }
            }
        };

        let mut completion = entry.completion.clone();
        let mut write = *completion.borrow();
        if write == WriteState::Pending {
            write = match completion
                .wait_for(|write| *write != WriteState::Pending)
                .await
            {
                Ok(write) => *write,
                // Sender dropped mid-copy; the entry was never completed
                Err(_) => WriteState::Failed,
            };
        }
        if write != WriteState::Complete {
            debug!(key, "in-flight write did not complete, treating as miss");
            return Ok(None);
        }

        let metadata = if entry.has_metadata {
            match fs::read(sidecar_path(&self.config.path, &identifier)).await {
                Ok(bytes) => Some(serde_json::from_slice(&bytes)?),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    warn!(key, identifier = %identifier, "metadata sidecar missing");
                    None
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            None
        };

        let reader = match fs::File::open(data_path(&self.config.path, &identifier)).await {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(key, identifier = %identifier, "data file vanished, treating as miss");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        debug!(key, size = entry.data_size, "cache hit");
        Ok(Some(CachedStream {
            reader,
            size: entry.data_size,
            metadata,
        }))
    }

    /// Drop the index and delete the whole cache directory tree, leaving the
    /// cache ready and empty on a freshly created directory.
    pub async fn clean(&self) -> Result<()> {
        let mut state = self.ready().await?;
        state.index.clear();
        match fs::remove_dir_all(&self.config.path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        fs::create_dir_all(&self.config.path).await?;
        info!(path = ?self.config.path, "cache cleaned");
        Ok(())
    }

    /// Current entry count and total stored size
    pub async fn stats(&self) -> Result<CacheStats> {
        let state = self.ready().await?;
        Ok(CacheStats {
            entries: state.index.len(),
            total_size: state.index.total_size(),
        })
    }
}
