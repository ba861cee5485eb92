//! The boundary between the cache and the Graph REST API.
//!
//! [`RemoteGateway`] is the capability handed to the core; [`GraphGateway`]
//! is the production implementation. Tests substitute a recording mock.
//! Every operation verifies a token is present before going on the wire.

use async_trait::async_trait;
use serde_json::json;

use crate::auth::Credential;
use crate::error::{FsError, FsResult};
use crate::remote::http::HttpClient;
use crate::remote::models::{DeltaPage, Drive, DriveItem, DriveItemList, ItemPatch};

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Item lookup addressed by drive path (`/` for the root).
    async fn fetch_item(&self, path: &str, cred: &Credential) -> FsResult<DriveItem>;

    /// Item lookup addressed by id.
    async fn fetch_item_by_id(&self, id: &str, cred: &Credential) -> FsResult<DriveItem>;

    /// Listing of an item's children.
    async fn fetch_children(&self, id: &str, cred: &Credential) -> FsResult<Vec<DriveItem>>;

    /// Full content download.
    async fn fetch_content(&self, id: &str, cred: &Credential) -> FsResult<Vec<u8>>;

    /// Small-file upload addressed by parent and name. Uploading an empty
    /// body is how a freshly created local file reserves a server id.
    async fn upload_new(
        &self,
        parent_id: &str,
        name: &str,
        data: Vec<u8>,
        cred: &Credential,
    ) -> FsResult<DriveItem>;

    /// Content replacement for an item that already has a server id.
    async fn upload_replace(&self, id: &str, data: Vec<u8>, cred: &Credential)
        -> FsResult<DriveItem>;

    async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        cred: &Credential,
    ) -> FsResult<DriveItem>;

    async fn patch_item(
        &self,
        id: &str,
        patch: &ItemPatch,
        cred: &Credential,
    ) -> FsResult<DriveItem>;

    async fn delete_item(&self, id: &str, cred: &Credential) -> FsResult<()>;

    /// One page of the change feed. `link` is either the initial relative
    /// delta URL or an absolute `@odata.nextLink`/`@odata.deltaLink`.
    async fn delta_page(&self, link: &str, cred: &Credential) -> FsResult<DeltaPage>;

    /// Drive metadata, used for quota reporting.
    async fn drive(&self, cred: &Credential) -> FsResult<Drive>;
}

pub struct GraphGateway {
    http: HttpClient,
}

impl GraphGateway {
    pub fn new() -> FsResult<Self> {
        Ok(Self {
            http: HttpClient::new()?,
        })
    }

    fn require_token(cred: &Credential, what: &str) -> FsResult<()> {
        if cred.has_token() {
            Ok(())
        } else {
            Err(FsError::NeedCredential(what.to_string()))
        }
    }

    /// Path-addressed item URL; each segment is escaped individually so the
    /// separators survive.
    fn item_url(path: &str) -> String {
        if path == "/" {
            return "/me/drive/root".to_string();
        }
        let escaped: Vec<String> = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!("/me/drive/root:{}", escaped.join("/"))
    }
}

#[async_trait]
impl RemoteGateway for GraphGateway {
    async fn fetch_item(&self, path: &str, cred: &Credential) -> FsResult<DriveItem> {
        Self::require_token(cred, path)?;
        self.http.get_json(&Self::item_url(path), cred).await
    }

    async fn fetch_item_by_id(&self, id: &str, cred: &Credential) -> FsResult<DriveItem> {
        Self::require_token(cred, id)?;
        self.http
            .get_json(&format!("/me/drive/items/{}", id), cred)
            .await
    }

    async fn fetch_children(&self, id: &str, cred: &Credential) -> FsResult<Vec<DriveItem>> {
        Self::require_token(cred, id)?;
        let listing: DriveItemList = self
            .http
            .get_json(&format!("/me/drive/items/{}/children", id), cred)
            .await?;
        Ok(listing.value)
    }

    async fn fetch_content(&self, id: &str, cred: &Credential) -> FsResult<Vec<u8>> {
        Self::require_token(cred, id)?;
        self.http
            .get_bytes(&format!("/me/drive/items/{}/content", id), cred)
            .await
    }

    async fn upload_new(
        &self,
        parent_id: &str,
        name: &str,
        data: Vec<u8>,
        cred: &Credential,
    ) -> FsResult<DriveItem> {
        Self::require_token(cred, name)?;
        let url = format!(
            "/me/drive/items/{}:/{}:/content",
            parent_id,
            urlencoding::encode(name)
        );
        self.http.put_bytes(&url, data, cred).await
    }

    async fn upload_replace(
        &self,
        id: &str,
        data: Vec<u8>,
        cred: &Credential,
    ) -> FsResult<DriveItem> {
        Self::require_token(cred, id)?;
        self.http
            .put_bytes(&format!("/me/drive/items/{}/content", id), data, cred)
            .await
    }

    async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
        cred: &Credential,
    ) -> FsResult<DriveItem> {
        Self::require_token(cred, name)?;
        let body = json!({ "name": name, "folder": {} });
        self.http
            .post_json(&format!("/me/drive/items/{}/children", parent_id), &body, cred)
            .await
    }

    async fn patch_item(
        &self,
        id: &str,
        patch: &ItemPatch,
        cred: &Credential,
    ) -> FsResult<DriveItem> {
        Self::require_token(cred, id)?;
        self.http
            .patch_json(&format!("/me/drive/items/{}", id), patch, cred)
            .await
    }

    async fn delete_item(&self, id: &str, cred: &Credential) -> FsResult<()> {
        Self::require_token(cred, id)?;
        self.http
            .delete(&format!("/me/drive/items/{}", id), cred)
            .await
    }

    async fn delta_page(&self, link: &str, cred: &Credential) -> FsResult<DeltaPage> {
        Self::require_token(cred, "delta")?;
        self.http.get_json(link, cred).await
    }

    async fn drive(&self, cred: &Credential) -> FsResult<Drive> {
        Self::require_token(cred, "drive")?;
        self.http.get_json("/me/drive", cred).await
    }
}
