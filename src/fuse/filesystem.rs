//! The composition root for the filesystem core.
//!
//! `GraphFs` wires the metadata cache, the content store and the remote
//! gateway together and carries the cross-cutting helpers the operation
//! handlers share: path hygiene, the desktop-probe ignore list and
//! local-to-remote id promotion.

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::auth::Credential;
use crate::cache::{ContentStore, DriveCache, Item};
use crate::error::{FsError, FsResult};
use crate::persistency::Persistence;
use crate::remote::RemoteGateway;
use crate::sync::DeltaSynchronizer;

/// Name of the cache database inside the working directory.
const CACHE_DB_NAME: &str = "graphfs.db";

/// Paths desktop environments probe for speculatively. They will never exist
/// on the remote, so they are rejected before touching the graph.
const IGNORED_PATHS: [&str; 9] = [
    "/BDMV",
    "/.Trash",
    "/.Trash-1000",
    "/.xdg-volume-info",
    "/autorun.inf",
    "/.localized",
    "/.DS_Store",
    "/._.",
    "/.hidden",
];

pub(crate) fn leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

pub(crate) fn ignored(path: &str) -> bool {
    IGNORED_PATHS.contains(&path)
}

/// Directory part of a virtual path (`/` for top-level entries).
pub(crate) fn parent_path(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(pos) => path[..pos].to_string(),
    }
}

/// Final component of a virtual path.
pub(crate) fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    }
}

pub struct GraphFs {
    cache: Arc<DriveCache>,
    content: Arc<ContentStore>,
    gateway: Arc<dyn RemoteGateway>,
    cred: Credential,
    store: Arc<Persistence>,
}

impl GraphFs {
    /// Open the cache database under `data_dir` and bootstrap the metadata
    /// graph from the drive root.
    pub async fn new(
        gateway: Arc<dyn RemoteGateway>,
        cred: Credential,
        data_dir: &Path,
    ) -> FsResult<Self> {
        let store = Arc::new(Persistence::open(&data_dir.join(CACHE_DB_NAME))?);
        let cache = Arc::new(DriveCache::new(gateway.clone(), &cred, store.clone()).await?);
        let content = Arc::new(ContentStore::new(store.clone()));
        Ok(Self {
            cache,
            content,
            gateway,
            cred,
            store,
        })
    }

    pub fn cache(&self) -> &Arc<DriveCache> {
        &self.cache
    }

    pub fn content(&self) -> &Arc<ContentStore> {
        &self.content
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.gateway
    }

    pub fn credential(&self) -> &Credential {
        &self.cred
    }

    /// Start the background delta loop. The handle may be aborted at
    /// unmount; the loop holds no state the filesystem misses.
    pub fn spawn_delta_sync(&self) -> tokio::task::JoinHandle<()> {
        Arc::new(DeltaSynchronizer::new(
            self.cache.clone(),
            self.content.clone(),
            self.cred.clone(),
        ))
        .spawn()
    }

    /// Release everything at unmount. The on-disk cache is dropped; keeping
    /// it for offline reuse across mounts is future work.
    pub fn on_unmount(&self) {
        if let Err(err) = self.store.purge() {
            warn!("failed to drop the cache database: {}", err);
        }
        info!("cache released on unmount");
    }

    /// Normalize a handler path and reject speculative desktop probes.
    pub(crate) fn checked_path(&self, path: &str) -> FsResult<String> {
        let path = leading_slash(path);
        if ignored(&path) {
            return Err(FsError::NotFound(path));
        }
        Ok(path)
    }

    /// The item's server id, uploading an empty file first if the item only
    /// has a local id. Directories always have server ids by construction.
    /// The snapshot may be stale: if another thread finished the initial
    /// upload in the meantime, the reservation comes back `nameAlreadyExists`
    /// and the already-promoted id is adopted instead.
    pub async fn remote_id(&self, item: &Item) -> FsResult<String> {
        if item.is_dir() || item.has_remote_id() {
            return Ok(item.id.clone());
        }
        if !self.cred.has_token() {
            return Err(FsError::NeedCredential(item.name.clone()));
        }

        match self
            .gateway
            .upload_new(&item.parent_id, &item.name, Vec::new(), &self.cred)
            .await
        {
            Ok(wire) => {
                self.promote(&item.id, &wire.id)?;
                Ok(wire.id)
            }
            Err(err) if err.is_name_conflict() => {
                // The reservation raced an initial upload that just
                // completed. Another thread may have promoted our item
                // already, or the server may know the file under its own id.
                if let Some(sibling) = self.cache.child_by_name(&item.parent_id, &item.name) {
                    if sibling.has_remote_id() {
                        debug!("{} already promoted to {}", item.name, sibling.id);
                        return Ok(sibling.id);
                    }
                }
                let path = self
                    .cache
                    .path_of(&item.id)
                    .ok_or_else(|| FsError::NotFound(item.name.clone()))?;
                let latest = self.gateway.fetch_item(&path, &self.cred).await?;
                self.promote(&item.id, &latest.id)?;
                Ok(latest.id)
            }
            Err(err) => Err(err),
        }
    }

    /// Rewrite an item's id after the server issued one, relocating both the
    /// graph entry and any open content buffers.
    pub(crate) fn promote(&self, old_id: &str, new_id: &str) -> FsResult<()> {
        debug!("promoting {} -> {}", old_id, new_id);
        self.cache.move_id(old_id, new_id)?;
        self.content.rekey(old_id, new_id);
        Ok(())
    }
}
