//! The in-memory metadata graph.
//!
//! One map from id to [`Item`], guarded by a coarse read-write lock. Mutations
//! keep the parent/child bookkeeping consistent: a directory's `children` list
//! (when initialized) always names exactly the items whose `parent_id` points
//! back at it, and `subdir_count` tracks the directory children within it.
//! No operation here performs I/O or holds the lock across a suspension point.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::cache::item::Item;
use crate::error::{FsError, FsResult};

#[derive(Default)]
pub struct ItemGraph {
    items: RwLock<HashMap<String, Item>>,
}

impl ItemGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure lookup; returns a snapshot of the item.
    pub fn get(&self, id: &str) -> Option<Item> {
        self.items.read().unwrap().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().unwrap().is_empty()
    }

    /// Add or replace an item. If the parent is a known directory whose
    /// children have been enumerated, the new id is appended there.
    pub fn insert(&self, item: Item) {
        let mut items = self.items.write().unwrap();
        let id = item.id.clone();
        let parent_id = item.parent_id.clone();
        let is_dir = item.is_dir();
        items.insert(id.clone(), item);
        if parent_id.is_empty() {
            return;
        }
        if let Some(parent) = items.get_mut(&parent_id) {
            if let Some(children) = parent.children.as_mut() {
                if !children.iter().any(|child| child == &id) {
                    children.push(id);
                    if is_dir {
                        parent.subdir_count += 1;
                    }
                }
            }
        }
    }

    /// Remove an item and detach it from its parent. Does not recurse.
    pub fn delete(&self, id: &str) -> Option<Item> {
        let mut items = self.items.write().unwrap();
        let removed = items.remove(id)?;
        if let Some(parent) = items.get_mut(&removed.parent_id) {
            if let Some(children) = parent.children.as_mut() {
                if let Some(pos) = children.iter().position(|child| child == id) {
                    children.remove(pos);
                    if removed.is_dir() {
                        parent.subdir_count = parent.subdir_count.saturating_sub(1);
                    }
                }
            }
        }
        Some(removed)
    }

    /// Rewrite an item's id, atomically with respect to concurrent readers.
    /// Used to promote local ids to server ids. The parent's children entry
    /// and any enumerated children's back-pointers follow.
    pub fn move_id(&self, old_id: &str, new_id: &str) -> FsResult<()> {
        let mut items = self.items.write().unwrap();
        let mut item = items
            .remove(old_id)
            .ok_or_else(|| FsError::NotFound(old_id.to_string()))?;
        item.id = new_id.to_string();
        let parent_id = item.parent_id.clone();
        let child_ids = item.children.clone();
        items.insert(new_id.to_string(), item);

        if !parent_id.is_empty() {
            if let Some(parent) = items.get_mut(&parent_id) {
                if let Some(children) = parent.children.as_mut() {
                    if let Some(slot) = children.iter_mut().find(|child| child.as_str() == old_id)
                    {
                        *slot = new_id.to_string();
                    }
                }
            }
        }
        if let Some(child_ids) = child_ids {
            for child_id in child_ids {
                if let Some(child) = items.get_mut(&child_id) {
                    child.parent_id = new_id.to_string();
                }
            }
        }
        Ok(())
    }

    /// Reparent and rename an item in one step, fixing up both parents'
    /// bookkeeping. The target parent only records the child if its children
    /// have been enumerated.
    pub fn move_path(&self, id: &str, new_parent_id: &str, new_name: &str) -> FsResult<()> {
        let mut items = self.items.write().unwrap();
        let (old_parent_id, is_dir) = match items.get(id) {
            Some(item) => (item.parent_id.clone(), item.is_dir()),
            None => return Err(FsError::NotFound(id.to_string())),
        };

        if old_parent_id != new_parent_id {
            if let Some(old_parent) = items.get_mut(&old_parent_id) {
                if let Some(children) = old_parent.children.as_mut() {
                    if let Some(pos) = children.iter().position(|child| child == id) {
                        children.remove(pos);
                        if is_dir {
                            old_parent.subdir_count = old_parent.subdir_count.saturating_sub(1);
                        }
                    }
                }
            }
            if let Some(new_parent) = items.get_mut(new_parent_id) {
                if let Some(children) = new_parent.children.as_mut() {
                    if !children.iter().any(|child| child == id) {
                        children.push(id.to_string());
                        if is_dir {
                            new_parent.subdir_count += 1;
                        }
                    }
                }
            }
        }

        if let Some(item) = items.get_mut(id) {
            item.parent_id = new_parent_id.to_string();
            item.name = new_name.to_string();
        }
        Ok(())
    }

    /// The enumerated children of a directory, or `None` when the directory
    /// is unknown or has not been enumerated yet.
    pub fn children(&self, id: &str) -> Option<Vec<String>> {
        self.items
            .read()
            .unwrap()
            .get(id)
            .and_then(|item| item.children.clone())
    }

    /// Install the enumerated children list wholesale and recompute
    /// `subdir_count` from the items currently in the graph.
    pub fn set_children(&self, id: &str, child_ids: Vec<String>) {
        let mut items = self.items.write().unwrap();
        let subdirs = child_ids
            .iter()
            .filter(|child_id| {
                items
                    .get(child_id.as_str())
                    .map(|child| child.is_dir())
                    .unwrap_or(false)
            })
            .count() as u32;
        if let Some(item) = items.get_mut(id) {
            item.children = Some(child_ids);
            item.subdir_count = subdirs;
        }
    }

    /// Mutate a single item's fields under an exclusive claim.
    pub fn with_item_mut<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Item) -> R,
    {
        self.items.write().unwrap().get_mut(id).map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::item::ItemKind;

    fn remote_item(id: &str, name: &str, kind: ItemKind, parent_id: &str) -> Item {
        let mut item = Item::new_local(name, 0o755, kind, parent_id);
        item.id = id.to_string();
        item
    }

    fn graph_with_root() -> ItemGraph {
        let graph = ItemGraph::new();
        let mut root = remote_item("root-id", "root", ItemKind::Directory, "");
        root.parent_id = String::new();
        graph.insert(root);
        graph
    }

    #[test]
    fn insert_attaches_to_an_enumerated_parent() {
        let graph = graph_with_root();
        graph.insert(remote_item("D1", "docs", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("F1", "a.txt", ItemKind::File, "root-id"));

        let root = graph.get("root-id").unwrap();
        assert_eq!(root.subdir_count, 1);
        assert_eq!(root.nlink(), 3);
        let children = root.children.unwrap();
        assert_eq!(children, vec!["D1".to_string(), "F1".to_string()]);
    }

    #[test]
    fn reinserting_the_same_id_does_not_double_count() {
        let graph = graph_with_root();
        graph.insert(remote_item("D1", "docs", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("D1", "docs", ItemKind::Directory, "root-id"));
        let root = graph.get("root-id").unwrap();
        assert_eq!(root.children.unwrap().len(), 1);
        assert_eq!(root.subdir_count, 1);
    }

    #[test]
    fn delete_detaches_from_the_parent() {
        let graph = graph_with_root();
        graph.insert(remote_item("D1", "docs", ItemKind::Directory, "root-id"));
        graph.delete("D1");

        assert!(graph.get("D1").is_none());
        let root = graph.get("root-id").unwrap();
        assert!(root.children.unwrap().is_empty());
        assert_eq!(root.subdir_count, 0);
    }

    #[test]
    fn move_id_relocates_the_item_and_all_references() {
        let graph = graph_with_root();
        graph.insert(remote_item("local-x", "d", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("C1", "inner", ItemKind::File, "local-x"));

        graph.move_id("local-x", "R9").unwrap();

        assert!(graph.get("local-x").is_none());
        let moved = graph.get("R9").unwrap();
        assert_eq!(moved.name, "d");
        assert_eq!(
            graph.get("root-id").unwrap().children.unwrap(),
            vec!["R9".to_string()]
        );
        assert_eq!(graph.get("C1").unwrap().parent_id, "R9");
    }

    #[test]
    fn move_id_of_an_unknown_id_fails() {
        let graph = graph_with_root();
        assert!(matches!(
            graph.move_id("nope", "R1"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn move_path_reparents_and_renames() {
        let graph = graph_with_root();
        graph.insert(remote_item("A", "a", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("B", "b", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("F", "f", ItemKind::File, "A"));

        graph.move_path("F", "B", "g").unwrap();

        assert!(graph.get("A").unwrap().children.unwrap().is_empty());
        assert_eq!(
            graph.get("B").unwrap().children.unwrap(),
            vec!["F".to_string()]
        );
        let moved = graph.get("F").unwrap();
        assert_eq!(moved.parent_id, "B");
        assert_eq!(moved.name, "g");
    }

    #[test]
    fn set_children_recomputes_subdir_count() {
        let graph = graph_with_root();
        graph.insert(remote_item("D1", "one", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("D2", "two", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("F1", "f", ItemKind::File, "root-id"));

        graph.set_children(
            "root-id",
            vec!["D1".to_string(), "D2".to_string(), "F1".to_string()],
        );
        let root = graph.get("root-id").unwrap();
        assert_eq!(root.subdir_count, 2);
    }

    #[test]
    fn parent_back_pointers_stay_consistent() {
        // invariant: every child id in a parent's list names an item whose
        // parent_id points back
        let graph = graph_with_root();
        graph.insert(remote_item("D1", "docs", ItemKind::Directory, "root-id"));
        graph.insert(remote_item("F1", "a.txt", ItemKind::File, "D1"));
        graph.set_children("D1", vec!["F1".to_string()]);

        for id in ["D1", "F1"] {
            let item = graph.get(id).unwrap();
            let parent = graph.get(&item.parent_id).unwrap();
            assert!(parent.children.unwrap().contains(&item.id));
        }
    }
}
