//! The FUSE-facing operation handlers.
//!
//! Every handler is path-addressed; the kernel shim resolves inodes and file
//! handles to paths before calling in, and maps the returned [`FsError`]s to
//! errno values via [`FsError::errno`]. Handlers never hold a graph or item
//! lock across a gateway call.

use std::time::Duration;

use log::{debug, warn};

use crate::cache::{is_local_id, Item, ItemKind};
use crate::error::{FsError, FsResult};
use crate::fuse::attributes::{DirEntry, FileAttributes, StatFs};
use crate::fuse::filesystem::{base_name, parent_path, GraphFs};
use crate::remote::models::{ItemPatch, ParentReference};

/// Wait applied before retrying a PATCH that hit the server's post-create
/// inconsistency window.
const PATCH_RETRY_DELAY: Duration = Duration::from_secs(1);

impl GraphFs {
    /// Stat an item.
    pub async fn get_attr(&self, path: &str) -> FsResult<FileAttributes> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        Ok(FileAttributes::from_item(&item))
    }

    /// List a directory.
    pub async fn open_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let path = self.checked_path(path)?;
        let dir = self.cache().resolve(&path, self.credential()).await?;
        let children = self.cache().children_of(&dir.id, self.credential()).await?;
        Ok(children
            .iter()
            .map(|child| DirEntry {
                name: child.name.clone(),
                mode: child.mode,
            })
            .collect())
    }

    /// Open a file, making sure its content is resident in the live tier.
    /// Returns a metadata snapshot for the shim to hold.
    pub async fn open(&self, path: &str) -> FsResult<Item> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        if !item.is_dir() {
            self.content()
                .open(&item, self.gateway(), self.credential())
                .await?;
        }
        Ok(item)
    }

    /// Create a new empty file. Purely local: the server learns about the
    /// file on first flush, when the initial upload promotes its id.
    pub async fn create(&self, path: &str, mode: u32) -> FsResult<Item> {
        let path = self.checked_path(path)?;
        let parent = self
            .cache()
            .resolve(&parent_path(&path), self.credential())
            .await?;
        // enumerate first so the new entry lands in an initialized list
        self.cache()
            .children_of(&parent.id, self.credential())
            .await?;
        let item = Item::new_local(base_name(&path), mode, ItemKind::File, &parent.id);
        debug!("created {} as {}", path, item.id);
        self.cache().insert(item.clone());
        Ok(item)
    }

    /// Create a directory. The server call comes first so the folder is born
    /// with a server id; a local placeholder is inserted for any in-flight
    /// resolvers, then promoted.
    pub async fn mkdir(&self, path: &str, mode: u32) -> FsResult<Item> {
        let path = self.checked_path(path)?;
        let parent = self
            .cache()
            .resolve(&parent_path(&path), self.credential())
            .await?;
        self.cache()
            .children_of(&parent.id, self.credential())
            .await?;
        let name = base_name(&path);

        let wire = self
            .gateway()
            .create_folder(&parent.id, name, self.credential())
            .await?;

        let placeholder = Item::new_local(name, mode, ItemKind::Directory, &parent.id);
        let local = placeholder.id.clone();
        self.cache().insert(placeholder);
        self.promote(&local, &wire.id)?;
        self.cache()
            .get(&wire.id)
            .ok_or_else(|| FsError::NotFound(path))
    }

    /// Remove a directory. The server enforces the empty-directory rule;
    /// whatever it answers is propagated.
    pub async fn rmdir(&self, path: &str) -> FsResult<()> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        self.gateway()
            .delete_item(&item.id, self.credential())
            .await?;
        self.cache().delete(&item.id);
        Ok(())
    }

    /// Delete a file. Items that never reached the server are removed
    /// locally without a remote call.
    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        if item.has_remote_id() {
            self.gateway()
                .delete_item(&item.id, self.credential())
                .await?;
        }
        self.cache().delete(&item.id);
        self.content().evict(&item.id);
        Ok(())
    }

    /// Rename and/or move an item. The server change happens first; the
    /// local graph follows only once the server has accepted it, and a name
    /// changed optimistically is reverted on failure.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> FsResult<()> {
        let old_path = self.checked_path(old_path)?;
        let new_path = self.checked_path(new_path)?;
        debug!("rename {} -> {}", old_path, new_path);

        let item = self.cache().resolve(&old_path, self.credential()).await?;
        let id = self.remote_id(&item).await?;
        if is_local_id(&id) {
            // the server cannot patch an item it has never seen
            return Err(FsError::LocalOnlyId(old_path));
        }

        let old_dir = parent_path(&old_path);
        let new_dir = parent_path(&new_path);
        let old_base = base_name(&old_path);
        let new_base = base_name(&new_path);

        let mut patch = ItemPatch::replace_existing();
        let new_parent_id = if old_dir != new_dir {
            let new_parent = self.cache().resolve(&new_dir, self.credential()).await?;
            let parent_id = self.remote_id(&new_parent).await?;
            if is_local_id(&parent_id) {
                return Err(FsError::LocalOnlyId(new_dir));
            }
            patch.parent_reference = Some(ParentReference {
                id: parent_id.clone(),
                path: None,
            });
            parent_id
        } else {
            item.parent_id.clone()
        };

        let renamed = old_base != new_base;
        if renamed {
            patch.name = Some(new_base.to_string());
            self.cache().update(&id, |item| {
                item.name = new_base.to_string();
            });
        }

        if let Err(err) = self.patch_with_retry(&id, &patch).await {
            if renamed {
                self.cache().update(&id, |item| {
                    item.name = old_base.to_string();
                });
            }
            return Err(err);
        }

        self.cache().move_path(&id, &new_parent_id, new_base)?;
        Ok(())
    }

    async fn patch_with_retry(&self, id: &str, patch: &ItemPatch) -> FsResult<()> {
        match self.gateway().patch_item(id, patch, self.credential()).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_resource_modified() => {
                // recently created items can lag the server's own etags for
                // just under a second
                warn!("patch of {} hit a stale resource, retrying once: {}", id, err);
                tokio::time::sleep(PATCH_RETRY_DELAY).await;
                self.gateway()
                    .patch_item(id, patch, self.credential())
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
        }
    }

    /// Record new permission bits. The server has no permission model, so
    /// this never leaves the cache.
    pub async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        self.cache().update(&item.id, |item| item.set_perms(mode));
        Ok(())
    }

    /// Ownership changes make no sense on a single-user filesystem.
    pub fn chown(&self, _path: &str, _uid: u32, _gid: u32) -> FsResult<()> {
        Err(FsError::Unsupported("chown"))
    }

    /// Record a new modification time locally.
    pub async fn utimens(&self, path: &str, _atime: i64, mtime: i64) -> FsResult<()> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        self.cache().update(&item.id, |item| item.mtime = mtime);
        Ok(())
    }

    /// Read from a file, loading its content first if necessary.
    pub async fn read(&self, path: &str, offset: u64, size: usize) -> FsResult<Vec<u8>> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        self.content()
            .open(&item, self.gateway(), self.credential())
            .await?;
        self.content().read(&item.id, offset, size)
    }

    /// Write to a file. Changes stay local until flush.
    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> FsResult<u32> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        self.content()
            .open(&item, self.gateway(), self.credential())
            .await?;
        let (written, new_size) = self.content().write(&item.id, offset, data)?;
        self.cache().update(&item.id, |item| {
            item.size = new_size;
            item.has_local_changes = true;
        });
        Ok(written)
    }

    /// Shorten a file in place.
    pub async fn truncate(&self, path: &str, size: u64) -> FsResult<()> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        self.content()
            .open(&item, self.gateway(), self.credential())
            .await?;
        let (new_size, changed) = self.content().truncate(&item.id, size)?;
        if changed {
            self.cache().update(&item.id, |item| {
                item.size = new_size;
                item.has_local_changes = true;
            });
        }
        Ok(())
    }

    /// Release a file: persist its buffer to the cold tier and, when the
    /// content changed locally, upload it. The first upload of a locally
    /// created file promotes its id. An upload failure keeps the item dirty
    /// so the next flush retries; the flush itself still succeeds locally.
    pub async fn flush(&self, path: &str) -> FsResult<()> {
        let path = self.checked_path(path)?;
        let item = self.cache().resolve(&path, self.credential()).await?;
        if item.is_dir() {
            return Ok(());
        }

        let flushed = self.content().flush_to_cold(&item.id)?;
        let dirty = flushed.is_some()
            || self
                .cache()
                .get(&item.id)
                .map(|item| item.has_local_changes)
                .unwrap_or(false);
        if !dirty {
            return Ok(());
        }
        if !self.content().begin_upload(&item.id) {
            debug!("upload of {} already in flight, deferring", item.id);
            return Ok(());
        }

        let data = match flushed {
            Some(data) => data,
            None => self.content().cold_copy(&item.id)?.unwrap_or_default(),
        };
        let outcome = self.upload(&item, data).await;
        self.content().finish_upload(&item.id);

        match outcome {
            Ok(uploaded_id) => {
                // a write that landed while we were uploading stays dirty
                if !self.content().is_dirty_live(&uploaded_id) {
                    self.cache().update(&uploaded_id, |item| {
                        item.has_local_changes = false;
                    });
                }
                Ok(())
            }
            Err(err) => {
                warn!("upload of {} failed, retrying on next flush: {}", path, err);
                Ok(())
            }
        }
    }

    async fn upload(&self, item: &Item, data: Vec<u8>) -> FsResult<String> {
        if item.has_remote_id() {
            let wire = self
                .gateway()
                .upload_replace(&item.id, data, self.credential())
                .await?;
            self.cache().update(&item.id, |item| {
                if let Some(size) = wire.size {
                    item.size = size;
                }
            });
            Ok(item.id.clone())
        } else {
            if !self.credential().has_token() {
                return Err(FsError::NeedCredential(item.name.clone()));
            }
            let wire = self
                .gateway()
                .upload_new(&item.parent_id, &item.name, data, self.credential())
                .await?;
            self.promote(&item.id, &wire.id)?;
            self.cache().update(&wire.id, |item| {
                if let Some(size) = wire.size {
                    item.size = size;
                }
            });
            Ok(wire.id)
        }
    }

    /// Filesystem-wide statistics from the drive quota.
    pub async fn stat_fs(&self) -> FsResult<StatFs> {
        let drive = self.gateway().drive(self.credential()).await?;
        if drive.drive_type == "personal" {
            warn!("personal accounts do not report file counts; inode totals are synthetic");
        }
        Ok(StatFs::from_quota(&drive.quota))
    }
}
