//! Wire models for the Graph API JSON payloads consumed and emitted by the core.

use serde::{Deserialize, Serialize};

/// Parent pointer carried by a drive item. Only the id matters to the cache;
/// the path is informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentReference {
    #[serde(default)]
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderFacet {
    #[serde(rename = "childCount", default)]
    pub child_count: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileFacet {
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Present on delta tombstones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeletedFacet {
    #[serde(default)]
    pub state: String,
}

/// A file or folder as the server represents it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveItem {
    #[serde(default)]
    pub id: String,
    pub name: Option<String>,
    pub size: Option<u64>,
    #[serde(rename = "lastModifiedDateTime")]
    pub last_modified: Option<String>,
    pub folder: Option<FolderFacet>,
    pub file: Option<FileFacet>,
    pub deleted: Option<DeletedFacet>,
    #[serde(rename = "parentReference")]
    pub parent_reference: Option<ParentReference>,
}

/// Response shape of a `/children` listing.
#[derive(Debug, Default, Deserialize)]
pub struct DriveItemList {
    #[serde(default)]
    pub value: Vec<DriveItem>,
}

/// One page of the delta feed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeltaPage {
    #[serde(default)]
    pub value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink", skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
    #[serde(rename = "@odata.deltaLink", skip_serializing_if = "Option::is_none")]
    pub delta_link: Option<String>,
}

/// PATCH body for rename and move operations.
#[derive(Debug, Default, Serialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "parentReference", skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ParentReference>,
    #[serde(
        rename = "@microsoft.graph.conflictBehavior",
        skip_serializing_if = "Option::is_none"
    )]
    pub conflict_behavior: Option<String>,
}

impl ItemPatch {
    /// A patch that wipes whatever the target name currently points at.
    pub fn replace_existing() -> Self {
        Self {
            conflict_behavior: Some("replace".to_string()),
            ..Default::default()
        }
    }
}

/// Storage quota for a drive.
/// `fileCount` is unavailable on personal accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriveQuota {
    #[serde(default)]
    pub deleted: u64,
    #[serde(rename = "fileCount", default)]
    pub file_count: u64,
    #[serde(default)]
    pub remaining: u64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub used: u64,
}

/// General information about the user's drive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Drive {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "driveType", default)]
    pub drive_type: String,
    #[serde(default)]
    pub quota: DriveQuota,
}
