//! Two-tier store for file bodies.
//!
//! The live tier is a map of open buffers shared between concurrent opens of
//! the same item; the cold tier is the `content` tree of the persistence
//! layer. Buffers load on open and flush back to the cold tier on release.
//! Each buffer carries its own read-write lock, so reads on one file proceed
//! in parallel and opens of distinct ids never contend.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};

use crate::auth::Credential;
use crate::cache::item::Item;
use crate::error::{FsError, FsResult};
use crate::persistency::Persistence;
use crate::remote::RemoteGateway;

/// An open file body. Mutations are purely local until flush.
pub struct ContentBuffer {
    data: Vec<u8>,
    dirty: bool,
}

impl ContentBuffer {
    fn new(data: Vec<u8>) -> Self {
        Self { data, dirty: false }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Copy out up to `size` bytes from `offset`; short read at EOF.
    pub fn read(&self, offset: usize, size: usize) -> Vec<u8> {
        let end = offset.saturating_add(size).min(self.data.len());
        if offset >= end {
            return Vec::new();
        }
        self.data[offset..end].to_vec()
    }

    /// Overwrite in place, or overwrite-via-append when the write reaches
    /// past the current end. Sparse holes are not supported: the offset must
    /// not exceed the current size.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> FsResult<u32> {
        if offset > self.data.len() {
            return Err(FsError::LocalIo(format!(
                "write at offset {} past end of {}-byte buffer",
                offset,
                self.data.len()
            )));
        }
        if offset + data.len() >= self.data.len() {
            self.data.truncate(offset);
            self.data.extend_from_slice(data);
        } else {
            self.data[offset..offset + data.len()].copy_from_slice(data);
        }
        self.dirty = true;
        Ok(data.len() as u32)
    }

    /// Cut the buffer in place. Only shortens; equal size is a no-op and
    /// extension is not supported. Returns whether anything changed.
    pub fn truncate(&mut self, size: usize) -> bool {
        if size >= self.data.len() {
            return false;
        }
        self.data.truncate(size);
        self.dirty = true;
        true
    }
}

pub struct ContentStore {
    live: Mutex<HashMap<String, Arc<RwLock<ContentBuffer>>>>,
    store: Arc<Persistence>,
    /// Ids with an upload currently in flight; gives at-most-one-in-flight.
    uploads: Mutex<HashSet<String>>,
}

impl ContentStore {
    pub fn new(store: Arc<Persistence>) -> Self {
        Self {
            live: Mutex::new(HashMap::new()),
            store,
            uploads: Mutex::new(HashSet::new()),
        }
    }

    /// Bring an item's content into the live tier and return the shared
    /// buffer. Resolution order: live hit, cold hit, remote fetch, and for a
    /// fresh local creation a new empty buffer.
    pub async fn open(
        &self,
        item: &Item,
        gateway: &Arc<dyn RemoteGateway>,
        cred: &Credential,
    ) -> FsResult<Arc<RwLock<ContentBuffer>>> {
        if let Some(buffer) = self.live.lock().unwrap().get(&item.id) {
            return Ok(buffer.clone());
        }

        let bytes = match self.store.get_content(&item.id)? {
            Some(bytes) => bytes,
            None if item.has_remote_id() => {
                debug!("fetching content for {}", item.id);
                gateway.fetch_content(&item.id, cred).await?
            }
            None => Vec::new(),
        };

        // another open may have installed a buffer while we were fetching
        let mut live = self.live.lock().unwrap();
        let buffer = live
            .entry(item.id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(ContentBuffer::new(bytes))))
            .clone();
        Ok(buffer)
    }

    fn live_buffer(&self, id: &str) -> FsResult<Arc<RwLock<ContentBuffer>>> {
        self.live
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| FsError::NotFound(id.to_string()))
    }

    pub fn read(&self, id: &str, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let buffer = self.live_buffer(id)?;
        let guard = buffer.read().unwrap();
        Ok(guard.read(offset as usize, size))
    }

    /// Returns the bytes written and the buffer's new size.
    pub fn write(&self, id: &str, offset: u64, data: &[u8]) -> FsResult<(u32, u64)> {
        let buffer = self.live_buffer(id)?;
        let mut guard = buffer.write().unwrap();
        let written = guard.write(offset as usize, data)?;
        Ok((written, guard.len() as u64))
    }

    /// Returns the buffer's new size and whether it changed.
    pub fn truncate(&self, id: &str, size: u64) -> FsResult<(u64, bool)> {
        let buffer = self.live_buffer(id)?;
        let mut guard = buffer.write().unwrap();
        if size as usize > guard.len() {
            warn!(
                "refusing to extend {} from {} to {} bytes via truncate",
                id,
                guard.len(),
                size
            );
            return Ok((guard.len() as u64, false));
        }
        let changed = guard.truncate(size as usize);
        Ok((guard.len() as u64, changed))
    }

    /// Whether the live buffer (if any) has unflushed mutations.
    pub fn is_dirty_live(&self, id: &str) -> bool {
        self.live
            .lock()
            .unwrap()
            .get(id)
            .map(|buffer| buffer.read().unwrap().is_dirty())
            .unwrap_or(false)
    }

    /// Persist the live buffer to the cold tier and drop it from the live
    /// map. Returns the buffer's bytes when it carried unflushed mutations,
    /// so the caller can schedule an upload.
    pub fn flush_to_cold(&self, id: &str) -> FsResult<Option<Vec<u8>>> {
        let buffer = match self.live.lock().unwrap().remove(id) {
            Some(buffer) => buffer,
            None => return Ok(None),
        };
        let guard = buffer.read().unwrap();
        self.store.put_content(id, guard.data())?;
        if guard.is_dirty() {
            Ok(Some(guard.data().to_vec()))
        } else {
            Ok(None)
        }
    }

    /// A copy of the cold-tier bytes, for upload retries after the live
    /// buffer is gone.
    pub fn cold_copy(&self, id: &str) -> FsResult<Option<Vec<u8>>> {
        self.store.get_content(id)
    }

    /// Remove the item's content from both tiers.
    pub fn evict(&self, id: &str) {
        self.live.lock().unwrap().remove(id);
        if let Err(err) = self.store.delete_content(id) {
            warn!("failed to evict cold content for {}: {}", id, err);
        }
    }

    /// Relocate content to a new id during local-to-remote promotion. Open
    /// handles keep working because the shared buffer moves with the key.
    pub fn rekey(&self, old_id: &str, new_id: &str) {
        let mut live = self.live.lock().unwrap();
        if let Some(buffer) = live.remove(old_id) {
            live.insert(new_id.to_string(), buffer);
        }
        drop(live);
        if let Err(err) = self.store.rekey_content(old_id, new_id) {
            warn!("failed to rekey cold content {} -> {}: {}", old_id, new_id, err);
        }
    }

    /// Claim the upload slot for an item. Returns false when an upload is
    /// already in flight, in which case the item stays dirty and the next
    /// flush retries.
    pub fn begin_upload(&self, id: &str) -> bool {
        self.uploads.lock().unwrap().insert(id.to_string())
    }

    pub fn finish_upload(&self, id: &str) {
        self.uploads.lock().unwrap().remove(id);
    }
}
