//! The metadata cache: graph, resolver, content store and their durable tier.

pub mod content;
pub mod graph;
pub mod item;
pub mod resolver;

use std::sync::{Arc, RwLock};

use log::{info, warn};

use crate::auth::Credential;
use crate::error::FsResult;
use crate::persistency::Persistence;
use crate::remote::RemoteGateway;

pub use content::{ContentBuffer, ContentStore};
pub use graph::ItemGraph;
pub use item::{is_local_id, local_id, Item, ItemKind};

/// The metadata graph wired to its gateway and cold tier.
///
/// The cache never expires entries on its own; server-side changes arrive
/// through the delta synchronizer and local mutations through the operation
/// handlers. Metadata is mirrored to the cold tier opportunistically after
/// each mutation; a write failure there is logged and ignored since the
/// in-memory graph remains authoritative for the life of the mount.
pub struct DriveCache {
    graph: ItemGraph,
    store: Arc<Persistence>,
    gateway: Arc<dyn RemoteGateway>,
    root_id: RwLock<String>,
}

impl DriveCache {
    /// Fetch the drive root and seed the graph with it. Requires a usable
    /// credential; a cache cannot bootstrap offline.
    pub async fn new(
        gateway: Arc<dyn RemoteGateway>,
        cred: &Credential,
        store: Arc<Persistence>,
    ) -> FsResult<Self> {
        let wire = gateway.fetch_item("/", cred).await?;
        let mut root = Item::from_remote(&wire);
        root.parent_id = String::new();
        let root_id = root.id.clone();
        let cache = Self {
            graph: ItemGraph::new(),
            store,
            gateway,
            root_id: RwLock::new(root_id.clone()),
        };
        cache.insert(root);
        info!("drive root cached as {}", root_id);
        Ok(cache)
    }

    pub fn root_id(&self) -> String {
        self.root_id.read().unwrap().clone()
    }

    pub fn graph(&self) -> &ItemGraph {
        &self.graph
    }

    pub fn gateway(&self) -> &Arc<dyn RemoteGateway> {
        &self.gateway
    }

    pub fn get(&self, id: &str) -> Option<Item> {
        self.graph.get(id)
    }

    pub fn insert(&self, item: Item) {
        self.persist(&item);
        self.graph.insert(item);
    }

    pub fn delete(&self, id: &str) -> Option<Item> {
        let removed = self.graph.delete(id);
        if removed.is_some() {
            if let Err(err) = self.store.delete_item(id) {
                warn!("failed to drop cold metadata for {}: {}", id, err);
            }
            self.persist_id_of_parent(removed.as_ref());
        }
        removed
    }

    /// Promote an item to a new id and move its cold records along.
    pub fn move_id(&self, old_id: &str, new_id: &str) -> FsResult<()> {
        self.graph.move_id(old_id, new_id)?;
        if let Some(item) = self.graph.get(new_id) {
            if let Err(err) = self.store.rekey_item(old_id, &item) {
                warn!("failed to rekey cold metadata {} -> {}: {}", old_id, new_id, err);
            }
        }
        Ok(())
    }

    /// Reparent/rename locally after the server accepted the change.
    pub fn move_path(&self, id: &str, new_parent_id: &str, new_name: &str) -> FsResult<()> {
        self.graph.move_path(id, new_parent_id, new_name)?;
        self.persist_id(id);
        Ok(())
    }

    /// Mutate one item's fields and mirror the result to the cold tier.
    /// Returns false when the id is unknown.
    pub fn update<F>(&self, id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Item),
    {
        if self.graph.with_item_mut(id, f).is_none() {
            return false;
        }
        self.persist_id(id);
        true
    }

    /// Walk parent links back to the root to rebuild an item's path.
    pub fn path_of(&self, id: &str) -> Option<String> {
        let mut segments = Vec::new();
        let mut current = self.graph.get(id)?;
        while !current.parent_id.is_empty() {
            segments.push(current.name.clone());
            current = self.graph.get(&current.parent_id)?;
        }
        segments.reverse();
        Some(format!("/{}", segments.join("/")))
    }

    /// Case-insensitive sibling lookup within an enumerated directory;
    /// the last enumeration entry wins for case-only duplicates.
    pub fn child_by_name(&self, parent_id: &str, name: &str) -> Option<Item> {
        let wanted = name.to_lowercase();
        let child_ids = self.graph.children(parent_id)?;
        child_ids
            .iter()
            .rev()
            .filter_map(|child_id| self.graph.get(child_id))
            .find(|child| child.name.to_lowercase() == wanted)
    }

    fn persist(&self, item: &Item) {
        if let Err(err) = self.store.put_item(item) {
            warn!("failed to persist metadata for {}: {}", item.id, err);
        }
    }

    pub(crate) fn persist_id(&self, id: &str) {
        if let Some(item) = self.graph.get(id) {
            self.persist(&item);
        }
    }

    fn persist_id_of_parent(&self, removed: Option<&Item>) {
        if let Some(item) = removed {
            if !item.parent_id.is_empty() {
                self.persist_id(&item.parent_id);
            }
        }
    }
}
