//! Storage client seam.
//!
//! [`StorageClient`] is the capability-only view of the remote store the
//! sandbox core needs. It performs no scope checks of its own; the scope
//! module and [`crate::drive::ScopedDrive`] verify every id before calling it.

mod memory;

pub use memory::{MemoryStore, MemoryStoreBuilder};

use async_trait::async_trait;

use crate::error::Result;
use crate::node::{NewNode, Node, NodeId, NodePatch};

/// Field mask for ancestry lookups.
pub const PARENT_FIELDS: &str = "id, parents";

/// Field mask for full node metadata.
pub const NODE_FIELDS: &str = "id, name, mimeType, parents, trashed, size, modifiedTime";

/// Remote hierarchical store.
///
/// Listing and query methods return non-trashed nodes only, in store order.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fetches one node. `fields` is the store's field mask.
    async fn get_metadata(&self, id: &NodeId, fields: &str) -> Result<Node>;

    /// Lists direct children of `parent`, one page of at most `page_size`.
    async fn list_children(&self, parent: &NodeId, page_size: usize) -> Result<Vec<Node>>;

    /// Creates a node.
    async fn create_node(&self, spec: NewNode) -> Result<Node>;

    /// Applies a partial update.
    async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node>;

    /// Permanently deletes a node.
    async fn delete_node(&self, id: &NodeId) -> Result<()>;

    /// Exports a native document to text in `target_mime`.
    async fn export_as_text(&self, id: &NodeId, target_mime: &str) -> Result<String>;

    /// Downloads the raw body of a file.
    async fn download_bytes(&self, id: &NodeId) -> Result<Vec<u8>>;

    /// Adds and removes parent links in one call.
    ///
    /// Fails if an added parent is `id` itself or one of its descendants.
    async fn set_parents(&self, id: &NodeId, add: &[NodeId], remove: &[NodeId]) -> Result<Node>;

    /// Nodes whose name contains `text`.
    async fn query_by_name_substring(&self, text: &str) -> Result<Vec<Node>>;

    /// Every node in the store.
    async fn query_all(&self) -> Result<Vec<Node>>;

    /// Folders with no parents named exactly `name`.
    async fn find_top_level_folders(&self, name: &str) -> Result<Vec<Node>>;

    /// Returns the name of this store backend.
    fn name(&self) -> &str;
}
