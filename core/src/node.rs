//! Node model for the remote store.
//!
//! Nodes form a DAG: a node may have zero, one or several parents, so the
//! same node can be reachable from the sandbox root along more than one path.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mime type the store uses to mark folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Mime type of native documents that must be exported to read as text.
pub const DOCUMENT_MIME: &str = "application/vnd.google-apps.document";

/// Export target used when reading native documents.
pub const TEXT_EXPORT_MIME: &str = "text/plain";

/// Opaque identifier assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Creates an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Whether a node is a file or a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[default]
    File,
    Folder,
}

impl NodeKind {
    /// Classifies a node by its mime type.
    pub fn from_mime(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }
}

/// A file or folder in the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Parent ids. Empty for top-level nodes.
    #[serde(default)]
    pub parents: Vec<NodeId>,
    #[serde(default)]
    pub trashed: bool,
    pub mime_type: String,
    /// Size in bytes; folders and native documents report none.
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

impl Node {
    /// Returns true if this node is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Returns true if `parent` is one of this node's parents.
    pub fn has_parent(&self, parent: &NodeId) -> bool {
        self.parents.iter().any(|p| p == parent)
    }
}

/// Request to create a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNode {
    pub name: String,
    pub mime_type: String,
    pub parents: Vec<NodeId>,
    /// Initial body for files.
    #[serde(default)]
    pub content: Option<Vec<u8>>,
}

impl NewNode {
    /// Describes a folder with the given parents.
    pub fn folder(name: impl Into<String>, parents: Vec<NodeId>) -> Self {
        Self {
            name: name.into(),
            mime_type: FOLDER_MIME.to_string(),
            parents,
            content: None,
        }
    }

    /// Describes a file with a body.
    pub fn file(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        parents: Vec<NodeId>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            parents,
            content: Some(content),
        }
    }

    /// Kind implied by the mime type.
    pub fn kind(&self) -> NodeKind {
        NodeKind::from_mime(&self.mime_type)
    }
}

/// Partial update to a node. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    pub name: Option<String>,
    pub mime_type: Option<String>,
    pub content: Option<Vec<u8>>,
    pub trashed: Option<bool>,
}

impl NodePatch {
    /// Patch that renames a node.
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Patch that moves a node to the trash.
    pub fn trash() -> Self {
        Self {
            trashed: Some(true),
            ..Default::default()
        }
    }
}

/// A node emitted by scoped listing, tagged with the depth of the folder it was
/// found in (children of the start node have depth 0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedNode {
    pub node: Node,
    pub depth: usize,
}

/// Outcome of one id in a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItemReport {
    pub id: NodeId,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl BatchItemReport {
    /// Successful item.
    pub fn ok(id: NodeId) -> Self {
        Self {
            id,
            ok: true,
            reason: None,
        }
    }

    /// Failed item with a reason.
    pub fn failed(id: NodeId, reason: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// Returns true if text can be extracted from nodes of this mime type.
///
/// Native documents are exported; anything under `text/` or naming json,
/// markdown or csv is downloaded and decoded.
pub fn is_text_bearing(mime_type: &str) -> bool {
    mime_type == DOCUMENT_MIME
        || mime_type.starts_with("text/")
        || mime_type.contains("json")
        || mime_type.contains("markdown")
        || mime_type.contains("csv")
}
