//! Scoped drive operations.
//!
//! [`ScopedDrive`] is the surface transport layers call. Every operation
//! resolves the root afresh and checks each id argument against it before the
//! store sees any mutation or read.

use std::sync::Arc;

use crate::config::ScopeConfig;
use crate::error::{Error, Result};
use crate::node::{BatchItemReport, ListedNode, NewNode, Node, NodeId, NodePatch};
use crate::scope::{
    extract_text, Ancestry, AncestryVerifier, RootResolver, ScopedTraversal, SearchEngine,
};
use crate::storage::{StorageClient, NODE_FIELDS};

/// File and folder operations confined to the sandbox root.
pub struct ScopedDrive {
    store: Arc<dyn StorageClient>,
    config: ScopeConfig,
    resolver: RootResolver,
    verifier: Arc<AncestryVerifier>,
    traversal: ScopedTraversal,
    search: SearchEngine,
}

impl ScopedDrive {
    /// Validates `config` and wires the scope components over one store.
    pub fn new(store: Arc<dyn StorageClient>, config: ScopeConfig) -> Result<Self> {
        let config = config.validated()?;
        tracing::debug!(
            store = store.name(),
            root_name = %config.root_name,
            hop_budget = config.hop_budget,
            "scoped drive ready"
        );

        let verifier = Arc::new(AncestryVerifier::new(
            store.clone(),
            config.hop_budget,
            config.max_concurrency,
        ));
        let resolver = RootResolver::new(store.clone(), &config);
        let traversal = ScopedTraversal::new(
            store.clone(),
            verifier.clone(),
            config.page_size,
            config.max_concurrency,
        );
        let search = SearchEngine::new(store.clone(), verifier.clone(), config.max_concurrency);

        Ok(Self {
            store,
            config,
            resolver,
            verifier,
            traversal,
            search,
        })
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Returns the sandbox root id, creating the root folder if needed.
    pub async fn resolve_root(&self) -> Result<NodeId> {
        self.resolver.resolve().await
    }

    /// Returns true if `id` is the root or lies below it.
    pub async fn is_in_scope(&self, id: &NodeId) -> Result<bool> {
        let root = self.resolve_root().await?;
        Ok(self.verifier.is_descendant(id, &root).await)
    }

    /// Lists descendants of `start` (default: the root) to `depth` levels
    /// (default: the configured listing depth).
    pub async fn list_scoped(
        &self,
        start: Option<&NodeId>,
        depth: Option<usize>,
    ) -> Result<Vec<ListedNode>> {
        let root = self.resolve_root().await?;
        let start = start.unwrap_or(&root);
        let depth = depth.unwrap_or(self.config.default_list_depth);
        self.traversal.list_scoped(&root, start, depth).await
    }

    /// Searches names, and optionally text bodies, inside the sandbox.
    pub async fn search_scoped(&self, query: &str, include_content: bool) -> Result<Vec<Node>> {
        let root = self.resolve_root().await?;
        self.search.search_scoped(&root, query, include_content).await
    }

    /// Fetches metadata for an in-scope node.
    pub async fn get_node(&self, id: &NodeId) -> Result<Node> {
        let root = self.resolve_root().await?;
        self.ensure_in_scope(id, &root).await?;
        self.store.get_metadata(id, NODE_FIELDS).await
    }

    /// Reads the text of an in-scope file.
    pub async fn read_text(&self, id: &NodeId) -> Result<String> {
        let node = self.get_node(id).await?;
        extract_text(self.store.as_ref(), &node).await
    }

    /// Creates a folder under `parent` (default: the root).
    pub async fn create_folder(&self, name: &str, parent: Option<&NodeId>) -> Result<Node> {
        let parent = self.writable_parent(parent).await?;
        let node = self
            .store
            .create_node(NewNode::folder(name, vec![parent]))
            .await?;
        tracing::info!(node_id = %node.id, name = %name, "created folder");
        Ok(node)
    }

    /// Uploads a new file under `parent` (default: the root).
    pub async fn upload_file(
        &self,
        name: &str,
        parent: Option<&NodeId>,
        mime_type: &str,
        content: Vec<u8>,
    ) -> Result<Node> {
        let parent = self.writable_parent(parent).await?;
        let node = self
            .store
            .create_node(NewNode::file(name, mime_type, vec![parent], content))
            .await?;
        tracing::info!(node_id = %node.id, name = %name, size = ?node.size, "uploaded file");
        Ok(node)
    }

    /// Replaces the body of an in-scope file, optionally changing its type.
    pub async fn update_file(
        &self,
        id: &NodeId,
        content: Vec<u8>,
        mime_type: Option<&str>,
    ) -> Result<Node> {
        let root = self.resolve_root().await?;
        self.ensure_in_scope(id, &root).await?;
        let patch = NodePatch {
            content: Some(content),
            mime_type: mime_type.map(str::to_string),
            ..Default::default()
        };
        self.store.update_node(id, patch).await
    }

    /// Renames an in-scope node other than the root.
    pub async fn rename(&self, id: &NodeId, name: &str) -> Result<Node> {
        let root = self.resolve_root().await?;
        self.ensure_mutable(id, &root).await?;
        self.store.update_node(id, NodePatch::rename(name)).await
    }

    /// Moves an in-scope node under another in-scope folder.
    ///
    /// All current parents are replaced by `new_parent`. The read of the
    /// current parents and the write are separate store calls. Moving a node
    /// under itself or one of its descendants is refused, since it would cut
    /// the whole subtree off from the root.
    pub async fn move_node(&self, id: &NodeId, new_parent: &NodeId) -> Result<Node> {
        let root = self.resolve_root().await?;
        self.ensure_mutable(id, &root).await?;
        self.ensure_in_scope(new_parent, &root).await?;

        // The destination must not sit at or below the node being moved
        if self.verifier.is_descendant(new_parent, id).await {
            tracing::warn!(node_id = %id, parent = %new_parent, "refused cyclic move");
            return Err(Error::CyclicMove {
                id: id.clone(),
                new_parent: new_parent.clone(),
            });
        }

        let current = self.store.get_metadata(id, NODE_FIELDS).await?;
        let remove: Vec<NodeId> = current
            .parents
            .into_iter()
            .filter(|p| p != new_parent)
            .collect();
        let moved = self
            .store
            .set_parents(id, std::slice::from_ref(new_parent), &remove)
            .await?;
        tracing::info!(node_id = %id, parent = %new_parent, "moved node");
        Ok(moved)
    }

    /// Moves an in-scope node other than the root to the trash.
    pub async fn trash(&self, id: &NodeId) -> Result<Node> {
        let root = self.resolve_root().await?;
        self.ensure_mutable(id, &root).await?;
        self.store.update_node(id, NodePatch::trash()).await
    }

    /// Permanently deletes an in-scope node other than the root.
    pub async fn delete(&self, id: &NodeId) -> Result<()> {
        let root = self.resolve_root().await?;
        self.delete_under(id, &root).await
    }

    /// Deletes each id independently and reports per item.
    ///
    /// A failure never stops later items and never undoes earlier ones.
    pub async fn batch_delete(&self, ids: &[NodeId]) -> Result<Vec<BatchItemReport>> {
        let root = self.resolve_root().await?;
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            let report = match self.delete_under(id, &root).await {
                Ok(()) => BatchItemReport::ok(id.clone()),
                Err(e) => {
                    tracing::warn!(node_id = %id, error = %e, "batch delete item failed");
                    BatchItemReport::failed(id.clone(), e.reason())
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }

    async fn delete_under(&self, id: &NodeId, root: &NodeId) -> Result<()> {
        self.ensure_mutable(id, root).await?;
        self.store.delete_node(id).await?;
        tracing::info!(node_id = %id, "deleted node");
        Ok(())
    }

    async fn writable_parent(&self, parent: Option<&NodeId>) -> Result<NodeId> {
        let root = self.resolve_root().await?;
        match parent {
            Some(parent) => {
                self.ensure_in_scope(parent, &root).await?;
                Ok(parent.clone())
            }
            None => Ok(root),
        }
    }

    async fn ensure_in_scope(&self, id: &NodeId, root: &NodeId) -> Result<()> {
        match self.verifier.check(id, root).await {
            Ancestry::Reached => Ok(()),
            Ancestry::Missing => Err(Error::NotFound(id.clone())),
            Ancestry::Unreachable => {
                tracing::warn!(node_id = %id, "denied access outside sandbox");
                Err(Error::ScopeViolation { id: id.clone() })
            }
        }
    }

    async fn ensure_mutable(&self, id: &NodeId, root: &NodeId) -> Result<()> {
        if id == root {
            return Err(Error::RootProtected(id.clone()));
        }
        self.ensure_in_scope(id, root).await
    }
}
