//! Path resolution: walk the graph from the root one component at a time,
//! enumerating directories on demand and memoizing the results.

use log::{debug, warn};

use crate::auth::Credential;
use crate::cache::{DriveCache, Item};
use crate::error::{FsError, FsResult};

impl DriveCache {
    /// Resolve a slash-delimited path (leading `/`, case-insensitive) to an
    /// item. Directories along the way are enumerated through the gateway
    /// when the cache has not seen them yet, which requires a credential.
    pub async fn resolve(&self, path: &str, cred: &Credential) -> FsResult<Item> {
        let root_id = self.root_id();
        if path == "/" {
            return self
                .graph()
                .get(&root_id)
                .ok_or_else(|| FsError::NotFound("/".to_string()));
        }

        let trimmed = path.trim_end_matches('/');
        let components: Vec<&str> = trimmed.split('/').skip(1).collect();
        let mut current_id = root_id;
        for (depth, component) in components.iter().enumerate() {
            let children = self.children_of(&current_id, cred).await?;
            let wanted = component.to_lowercase();
            // the last enumeration entry wins for names differing only in case
            let child = children
                .iter()
                .rev()
                .find(|child| child.name.to_lowercase() == wanted);
            match child {
                Some(child) => current_id = child.id.clone(),
                None => {
                    let prefix = components[..=depth].join("/");
                    debug!("{} does not exist on the server or locally", prefix);
                    return Err(FsError::NotFound(prefix));
                }
            }
        }
        self.graph()
            .get(&current_id)
            .ok_or_else(|| FsError::NotFound(trimmed.to_string()))
    }

    /// The children of a directory, enumerated through the gateway on first
    /// access. Asking for the children of a plain file yields an empty
    /// listing; that only happens when a caller got confused upstream.
    pub async fn children_of(&self, id: &str, cred: &Credential) -> FsResult<Vec<Item>> {
        let item = self
            .graph()
            .get(id)
            .ok_or_else(|| FsError::NotFound(id.to_string()))?;
        if !item.is_dir() {
            warn!("attempted to enumerate children of plain file {}", item.name);
            return Ok(Vec::new());
        }

        if let Some(child_ids) = item.children {
            // ids may lag a concurrent tombstone briefly; skip the missing
            return Ok(child_ids
                .iter()
                .filter_map(|child_id| self.graph().get(child_id))
                .collect());
        }

        if !cred.has_token() {
            return Err(FsError::NeedCredential(item.name.clone()));
        }

        let fetched = self.gateway().fetch_children(id, cred).await?;
        let mut child_ids = Vec::with_capacity(fetched.len());
        let mut children = Vec::with_capacity(fetched.len());
        for wire in &fetched {
            let mut child = Item::from_remote(wire);
            child.parent_id = id.to_string();
            child_ids.push(child.id.clone());
            self.insert(child.clone());
            children.push(child);
        }
        self.graph().set_children(id, child_ids);
        self.persist_id(id);
        Ok(children)
    }
}
