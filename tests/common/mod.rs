#![allow(dead_code)]
//! Test harness: an in-memory Graph server standing in for the remote
//! gateway, with per-operation call recording and scriptable failures.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use graphfs::auth::Credential;
use graphfs::error::{FsError, FsResult, RemoteErrorKind};
use graphfs::fuse::GraphFs;
use graphfs::remote::models::{
    DeltaPage, Drive, DriveItem, DriveQuota, FileFacet, FolderFacet, ItemPatch, ParentReference,
};
use graphfs::remote::RemoteGateway;

pub const ROOT_ID: &str = "root-id";

#[derive(Default)]
struct MockState {
    next_id: u64,
    /// id -> item, including the drive root.
    items: HashMap<String, DriveItem>,
    /// directory id -> child ids, in insertion order.
    children: HashMap<String, Vec<String>>,
    contents: HashMap<String, Vec<u8>>,
    calls: Vec<String>,
    /// How many upcoming PATCH calls fail with `resourceModified`.
    patch_failures: usize,
    /// How many upcoming uploads fail with a server error.
    upload_failures: usize,
    /// How many upcoming `upload_new` calls fail with `nameAlreadyExists`.
    upload_conflicts: usize,
    delta_pages: VecDeque<DeltaPage>,
}

pub struct MockGateway {
    state: Mutex<MockState>,
}

fn not_found(what: &str) -> FsError {
    FsError::remote(RemoteErrorKind::NotFound, format!("404: {} itemNotFound", what))
}

fn folder_item(id: &str, name: &str, parent_id: Option<&str>) -> DriveItem {
    DriveItem {
        id: id.to_string(),
        name: Some(name.to_string()),
        folder: Some(FolderFacet::default()),
        parent_reference: parent_id.map(|parent| ParentReference {
            id: parent.to_string(),
            path: None,
        }),
        ..Default::default()
    }
}

fn file_item(id: &str, name: &str, parent_id: &str, size: u64) -> DriveItem {
    DriveItem {
        id: id.to_string(),
        name: Some(name.to_string()),
        size: Some(size),
        file: Some(FileFacet::default()),
        last_modified: Some("2024-01-15T10:30:00Z".to_string()),
        parent_reference: Some(ParentReference {
            id: parent_id.to_string(),
            path: None,
        }),
        ..Default::default()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.items.insert(
            ROOT_ID.to_string(),
            folder_item(ROOT_ID, "root", None),
        );
        state.children.insert(ROOT_ID.to_string(), Vec::new());
        Self {
            state: Mutex::new(state),
        }
    }

    fn record(state: &mut MockState, call: impl Into<String>) {
        state.calls.push(call.into());
    }

    fn alloc_id(state: &mut MockState) -> String {
        state.next_id += 1;
        format!("remote-{}", state.next_id)
    }

    /// Every remote operation performed so far, as `op:argument` strings.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn fail_next_patches(&self, count: usize) {
        self.state.lock().unwrap().patch_failures = count;
    }

    pub fn fail_next_uploads(&self, count: usize) {
        self.state.lock().unwrap().upload_failures = count;
    }

    pub fn conflict_next_uploads(&self, count: usize) {
        self.state.lock().unwrap().upload_conflicts = count;
    }

    pub fn push_delta_page(&self, page: DeltaPage) {
        self.state.lock().unwrap().delta_pages.push_back(page);
    }

    /// Seed a directory on the "server" without recording a call.
    pub fn add_remote_dir(&self, parent_id: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = Self::alloc_id(&mut state);
        state
            .items
            .insert(id.clone(), folder_item(&id, name, Some(parent_id)));
        state.children.insert(id.clone(), Vec::new());
        state
            .children
            .entry(parent_id.to_string())
            .or_default()
            .push(id.clone());
        id
    }

    /// Seed a file on the "server" without recording a call.
    pub fn add_remote_file(&self, parent_id: &str, name: &str, data: &[u8]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = Self::alloc_id(&mut state);
        state
            .items
            .insert(id.clone(), file_item(&id, name, parent_id, data.len() as u64));
        state.contents.insert(id.clone(), data.to_vec());
        state
            .children
            .entry(parent_id.to_string())
            .or_default()
            .push(id.clone());
        id
    }

    fn child_by_name(state: &MockState, parent_id: &str, name: &str) -> Option<String> {
        let wanted = name.to_lowercase();
        state.children.get(parent_id)?.iter().find_map(|child_id| {
            let child = state.items.get(child_id)?;
            if child.name.as_deref()?.to_lowercase() == wanted {
                Some(child_id.clone())
            } else {
                None
            }
        })
    }

    fn detach_from_parent(state: &mut MockState, id: &str) {
        let parent_id = state
            .items
            .get(id)
            .and_then(|item| item.parent_reference.as_ref())
            .map(|parent| parent.id.clone());
        if let Some(parent_id) = parent_id {
            if let Some(siblings) = state.children.get_mut(&parent_id) {
                siblings.retain(|child| child != id);
            }
        }
    }
}

#[async_trait]
impl RemoteGateway for MockGateway {
    async fn fetch_item(&self, path: &str, _cred: &Credential) -> FsResult<DriveItem> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("fetch_item:{}", path));
        if path == "/" {
            return Ok(state.items[ROOT_ID].clone());
        }
        let mut current = ROOT_ID.to_string();
        for component in path.split('/').skip(1) {
            current = Self::child_by_name(&state, &current, component)
                .ok_or_else(|| not_found(path))?;
        }
        Ok(state.items[&current].clone())
    }

    async fn fetch_item_by_id(&self, id: &str, _cred: &Credential) -> FsResult<DriveItem> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("fetch_item_by_id:{}", id));
        state.items.get(id).cloned().ok_or_else(|| not_found(id))
    }

    async fn fetch_children(&self, id: &str, _cred: &Credential) -> FsResult<Vec<DriveItem>> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("fetch_children:{}", id));
        if !state.items.contains_key(id) {
            return Err(not_found(id));
        }
        let child_ids = state.children.get(id).cloned().unwrap_or_default();
        Ok(child_ids
            .iter()
            .filter_map(|child_id| state.items.get(child_id).cloned())
            .collect())
    }

    async fn fetch_content(&self, id: &str, _cred: &Credential) -> FsResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("fetch_content:{}", id));
        if !state.items.contains_key(id) {
            return Err(not_found(id));
        }
        Ok(state.contents.get(id).cloned().unwrap_or_default())
    }

    async fn upload_new(
        &self,
        parent_id: &str,
        name: &str,
        data: Vec<u8>,
        _cred: &Credential,
    ) -> FsResult<DriveItem> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("upload_new:{}/{}", parent_id, name));
        if state.upload_failures > 0 {
            state.upload_failures -= 1;
            return Err(FsError::remote(
                RemoteErrorKind::Server,
                "503 Service Unavailable",
            ));
        }
        if state.upload_conflicts > 0 {
            state.upload_conflicts -= 1;
            return Err(FsError::remote(
                RemoteErrorKind::NameConflict,
                "409 Conflict: nameAlreadyExists",
            ));
        }
        if !state.items.contains_key(parent_id) {
            return Err(not_found(parent_id));
        }
        // PUT to an existing name replaces its content
        let id = match Self::child_by_name(&state, parent_id, name) {
            Some(existing) => existing,
            None => {
                let id = Self::alloc_id(&mut state);
                state
                    .items
                    .insert(id.clone(), file_item(&id, name, parent_id, 0));
                state
                    .children
                    .entry(parent_id.to_string())
                    .or_default()
                    .push(id.clone());
                id
            }
        };
        let size = data.len() as u64;
        state.contents.insert(id.clone(), data);
        if let Some(item) = state.items.get_mut(&id) {
            item.size = Some(size);
        }
        Ok(state.items[&id].clone())
    }

    async fn upload_replace(
        &self,
        id: &str,
        data: Vec<u8>,
        _cred: &Credential,
    ) -> FsResult<DriveItem> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("upload_replace:{}", id));
        if state.upload_failures > 0 {
            state.upload_failures -= 1;
            return Err(FsError::remote(
                RemoteErrorKind::Server,
                "503 Service Unavailable",
            ));
        }
        if !state.items.contains_key(id) {
            return Err(not_found(id));
        }
        let size = data.len() as u64;
        state.contents.insert(id.to_string(), data);
        if let Some(item) = state.items.get_mut(id) {
            item.size = Some(size);
        }
        Ok(state.items[id].clone())
    }

    async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        _cred: &Credential,
    ) -> FsResult<DriveItem> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("create_folder:{}/{}", parent_id, name));
        if !state.items.contains_key(parent_id) {
            return Err(not_found(parent_id));
        }
        let id = Self::alloc_id(&mut state);
        state
            .items
            .insert(id.clone(), folder_item(&id, name, Some(parent_id)));
        state.children.insert(id.clone(), Vec::new());
        state
            .children
            .entry(parent_id.to_string())
            .or_default()
            .push(id.clone());
        Ok(state.items[&id].clone())
    }

    async fn patch_item(
        &self,
        id: &str,
        patch: &ItemPatch,
        _cred: &Credential,
    ) -> FsResult<DriveItem> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("patch_item:{}", id));
        if state.patch_failures > 0 {
            state.patch_failures -= 1;
            return Err(FsError::remote(
                RemoteErrorKind::Server,
                "412 Precondition Failed: resourceModified",
            ));
        }
        if !state.items.contains_key(id) {
            return Err(not_found(id));
        }
        if let Some(new_parent) = &patch.parent_reference {
            Self::detach_from_parent(&mut state, id);
            state
                .children
                .entry(new_parent.id.clone())
                .or_default()
                .push(id.to_string());
            if let Some(item) = state.items.get_mut(id) {
                item.parent_reference = Some(ParentReference {
                    id: new_parent.id.clone(),
                    path: None,
                });
            }
        }
        if let Some(name) = &patch.name {
            if let Some(item) = state.items.get_mut(id) {
                item.name = Some(name.clone());
            }
        }
        Ok(state.items[id].clone())
    }

    async fn delete_item(&self, id: &str, _cred: &Credential) -> FsResult<()> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("delete_item:{}", id));
        if !state.items.contains_key(id) {
            return Err(not_found(id));
        }
        Self::detach_from_parent(&mut state, id);
        state.items.remove(id);
        state.children.remove(id);
        state.contents.remove(id);
        Ok(())
    }

    async fn delta_page(&self, link: &str, _cred: &Credential) -> FsResult<DeltaPage> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, format!("delta_page:{}", link));
        Ok(state.delta_pages.pop_front().unwrap_or(DeltaPage {
            value: Vec::new(),
            next_link: None,
            delta_link: Some("/me/drive/root/delta?token=mock".to_string()),
        }))
    }

    async fn drive(&self, _cred: &Credential) -> FsResult<Drive> {
        let mut state = self.state.lock().unwrap();
        Self::record(&mut state, "drive");
        Ok(Drive {
            id: "mock-drive".to_string(),
            drive_type: "personal".to_string(),
            quota: DriveQuota {
                total: 5 * 1024 * 1024 * 1024,
                used: 1024 * 1024 * 1024,
                remaining: 4 * 1024 * 1024 * 1024,
                state: "normal".to_string(),
                ..Default::default()
            },
        })
    }
}

/// A mounted filesystem over a fresh mock gateway and scratch database.
pub async fn new_fs() -> (GraphFs, Arc<MockGateway>, TempDir) {
    let scratch = tempfile::tempdir().expect("scratch directory");
    let gateway = Arc::new(MockGateway::new());
    let dyn_gateway: Arc<dyn RemoteGateway> = gateway.clone();
    let fs = GraphFs::new(dyn_gateway, Credential::new("test-token"), scratch.path())
        .await
        .expect("filesystem bootstrap");
    (fs, gateway, scratch)
}
