//! The domain representation of a file or folder in the metadata graph.

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::remote::models::DriveItem;

const LOCAL_ID_PREFIX: &str = "local-";

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Synthesize an id for an item created before the server knows about it.
pub fn local_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..20)
        .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
        .collect();
    format!("{}{}", LOCAL_ID_PREFIX, suffix)
}

/// Whether an id was issued locally (or never issued at all).
pub fn is_local_id(id: &str) -> bool {
    id.starts_with(LOCAL_ID_PREFIX) || id.is_empty()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Directory,
    File,
}

/// A node in the metadata graph.
///
/// The graph map owns every item; `parent_id` and `children` are lookup keys,
/// never owning edges. `children == None` means the directory has not been
/// enumerated yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    /// Empty for the root item.
    pub parent_id: String,
    pub kind: ItemKind,
    pub size: u64,
    /// Kind bit plus permission bits.
    pub mode: u32,
    /// Unix seconds.
    pub mtime: i64,
    pub children: Option<Vec<String>>,
    /// Count of child directories, maintained for `nlink`.
    pub subdir_count: u32,
    /// Content has been mutated locally and not yet uploaded.
    pub has_local_changes: bool,
}

impl Item {
    /// A brand new item that only exists in the local cache.
    pub fn new_local(name: &str, perms: u32, kind: ItemKind, parent_id: &str) -> Self {
        Self {
            id: local_id(),
            name: name.to_string(),
            parent_id: parent_id.to_string(),
            kind,
            size: 0,
            mode: kind_bit(kind) | (perms & 0o7777),
            mtime: Utc::now().timestamp(),
            children: match kind {
                ItemKind::Directory => Some(Vec::new()),
                ItemKind::File => None,
            },
            subdir_count: 0,
            has_local_changes: false,
        }
    }

    /// Build an item from its server representation. Mode is defaulted since
    /// the server has no permission model.
    pub fn from_remote(wire: &DriveItem) -> Self {
        let kind = if wire.folder.is_some() {
            ItemKind::Directory
        } else {
            ItemKind::File
        };
        let mtime = wire
            .last_modified
            .as_deref()
            .and_then(|stamp| chrono::DateTime::parse_from_rfc3339(stamp).ok())
            .map(|stamp| stamp.timestamp())
            .unwrap_or_else(|| Utc::now().timestamp());
        Self {
            id: wire.id.clone(),
            name: wire.name.clone().unwrap_or_else(|| "unnamed".to_string()),
            parent_id: wire
                .parent_reference
                .as_ref()
                .map(|parent| parent.id.clone())
                .unwrap_or_default(),
            kind,
            size: wire.size.unwrap_or(0),
            mode: kind_bit(kind) | default_perms(kind),
            mtime,
            children: None,
            subdir_count: 0,
            has_local_changes: false,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == ItemKind::Directory
    }

    pub fn has_remote_id(&self) -> bool {
        !is_local_id(&self.id)
    }

    /// Folders pretend to be 4096 bytes, since they do not really exist.
    pub fn display_size(&self) -> u64 {
        if self.is_dir() {
            4096
        } else {
            self.size
        }
    }

    /// Hard link count: `2 + subdirectories` for folders, 1 for files.
    pub fn nlink(&self) -> u32 {
        if self.is_dir() {
            2 + self.subdir_count
        } else {
            1
        }
    }

    /// Replace the permission bits while preserving the kind bit.
    pub fn set_perms(&mut self, perms: u32) {
        self.mode = kind_bit(self.kind) | (perms & 0o7777);
    }
}

fn kind_bit(kind: ItemKind) -> u32 {
    match kind {
        ItemKind::Directory => libc::S_IFDIR,
        ItemKind::File => libc::S_IFREG,
    }
}

fn default_perms(kind: ItemKind) -> u32 {
    match kind {
        ItemKind::Directory => 0o755,
        ItemKind::File => 0o644,
    }
}
