//! Durable cold tier for metadata and file content.
//!
//! One embedded key/value database with two trees: `metadata` maps item ids
//! to serialized [`Item`]s, `content` maps item ids to raw bytes. Writes are
//! short and never span network I/O.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::cache::item::Item;
use crate::error::FsResult;

const METADATA_TREE: &str = "metadata";
const CONTENT_TREE: &str = "content";

/// How long to keep retrying when another process holds the database lock.
const OPEN_RETRY_WINDOW: Duration = Duration::from_secs(1);
const OPEN_RETRY_STEP: Duration = Duration::from_millis(50);

pub struct Persistence {
    db: sled::Db,
    metadata: sled::Tree,
    content: sled::Tree,
    path: PathBuf,
}

impl Persistence {
    /// Open (or create) the cache database. A lock held by another instance
    /// is retried for about a second before giving up, at which point the
    /// caller should treat the mount as failed.
    pub fn open(path: &Path) -> FsResult<Self> {
        let deadline = Instant::now() + OPEN_RETRY_WINDOW;
        let db = loop {
            match sled::open(path) {
                Ok(db) => break db,
                Err(err) if Instant::now() < deadline => {
                    debug!("cache database busy, retrying: {}", err);
                    std::thread::sleep(OPEN_RETRY_STEP);
                }
                Err(err) => return Err(err.into()),
            }
        };
        let metadata = db.open_tree(METADATA_TREE)?;
        let content = db.open_tree(CONTENT_TREE)?;
        info!("opened cache database at {}", path.display());
        Ok(Self {
            db,
            metadata,
            content,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn put_item(&self, item: &Item) -> FsResult<()> {
        let bytes = serde_json::to_vec(item)?;
        self.metadata.insert(item.id.as_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_item(&self, id: &str) -> FsResult<Option<Item>> {
        match self.metadata.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_item(&self, id: &str) -> FsResult<()> {
        self.metadata.remove(id.as_bytes())?;
        Ok(())
    }

    /// Move a serialized item to a new id key, as part of local-to-remote
    /// promotion.
    pub fn rekey_item(&self, old_id: &str, item: &Item) -> FsResult<()> {
        self.metadata.remove(old_id.as_bytes())?;
        self.put_item(item)
    }

    pub fn put_content(&self, id: &str, data: &[u8]) -> FsResult<()> {
        self.content.insert(id.as_bytes(), data)?;
        Ok(())
    }

    pub fn get_content(&self, id: &str) -> FsResult<Option<Vec<u8>>> {
        Ok(self.content.get(id.as_bytes())?.map(|bytes| bytes.to_vec()))
    }

    pub fn delete_content(&self, id: &str) -> FsResult<()> {
        self.content.remove(id.as_bytes())?;
        Ok(())
    }

    pub fn rekey_content(&self, old_id: &str, new_id: &str) -> FsResult<()> {
        if let Some(bytes) = self.content.remove(old_id.as_bytes())? {
            self.content.insert(new_id.as_bytes(), bytes)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> FsResult<()> {
        self.db.flush()?;
        Ok(())
    }

    /// Drop everything. Called on unmount; keeping the cache for offline
    /// reuse across mounts is future work.
    pub fn purge(&self) -> FsResult<()> {
        self.metadata.clear()?;
        self.content.clear()?;
        self.db.flush()?;
        Ok(())
    }
}
