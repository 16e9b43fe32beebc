//! In-memory store used by tests and by the snapshot-backed CLI.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::node::{NewNode, Node, NodeId, NodeKind, NodePatch, DOCUMENT_MIME, FOLDER_MIME};

use super::StorageClient;

/// A node plus its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredNode {
    node: Node,
    #[serde(default)]
    content: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    /// Insertion order, which is the order queries return.
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, StoredNode>,
    /// Ids whose metadata fetches fail with an upstream error.
    failing: HashSet<NodeId>,
    /// Ids whose export and download fail with an upstream error.
    failing_content: HashSet<NodeId>,
}

impl State {
    fn insert(&mut self, stored: StoredNode) {
        let id = stored.node.id.clone();
        if self.nodes.insert(id.clone(), stored).is_none() {
            self.order.push(id);
        }
    }

    fn live(&self) -> impl Iterator<Item = &StoredNode> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|stored| !stored.node.trashed)
    }

    fn get(&self, id: &NodeId) -> Result<&StoredNode> {
        self.nodes.get(id).ok_or_else(|| Error::NotFound(id.clone()))
    }

    fn get_mut(&mut self, id: &NodeId) -> Result<&mut StoredNode> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.clone()))
    }

    fn readable(&self, id: &NodeId) -> Result<&StoredNode> {
        if self.failing_content.contains(id) {
            return Err(Error::Upstream(format!("injected content failure for {}", id)));
        }
        self.get(id)
    }

    /// Returns true if `ancestor` is `id` or lies on any upward path from it.
    fn is_ancestor_or_self(&self, ancestor: &NodeId, id: &NodeId) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(stored) = self.nodes.get(current) {
                pending.extend(stored.node.parents.iter());
            }
        }
        false
    }

    fn require_parents(&self, parents: &[NodeId]) -> Result<()> {
        for parent in parents {
            self.get(parent)?;
        }
        Ok(())
    }
}

/// Multi-parent store held in memory.
///
/// Supports failure injection per id and counts metadata and listing calls
/// so tests can observe how many remote round trips an operation costs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    metadata_calls: AtomicUsize,
    list_calls: AtomicUsize,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder for fixture stores.
    pub fn builder() -> MemoryStoreBuilder {
        MemoryStoreBuilder::default()
    }

    /// Loads a store from a JSON snapshot written by [`MemoryStore::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let nodes: Vec<StoredNode> = serde_json::from_str(&json)?;
        let store = Self::new();
        {
            let mut state = store.lock();
            for stored in nodes {
                state.insert(stored);
            }
        }
        Ok(store)
    }

    /// Writes every node, trashed ones included, to a JSON snapshot.
    pub fn save(&self, path: &Path) -> Result<()> {
        let state = self.lock();
        let nodes: Vec<&StoredNode> = state
            .order
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .collect();
        let json = serde_json::to_string_pretty(&nodes)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Makes metadata fetches for `id` fail with an upstream error.
    pub fn fail_metadata_for(&self, id: impl Into<NodeId>) {
        self.lock().failing.insert(id.into());
    }

    /// Makes export and download of `id` fail with an upstream error.
    pub fn fail_content_for(&self, id: impl Into<NodeId>) {
        self.lock().failing_content.insert(id.into());
    }

    /// Returns true if a node with this id exists, trashed or not.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.lock().nodes.contains_key(id)
    }

    /// Number of nodes, trashed ones included.
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    /// Returns true if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `get_metadata` calls served so far.
    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_children` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn stored_node(id: NodeId, spec: NewNode) -> StoredNode {
    let kind = spec.kind();
    let size = match kind {
        NodeKind::Folder => None,
        NodeKind::File => spec.content.as_ref().map(|c| c.len() as u64),
    };
    StoredNode {
        node: Node {
            id,
            name: spec.name,
            kind,
            parents: spec.parents,
            trashed: false,
            mime_type: spec.mime_type,
            size,
            modified_time: Some(Utc::now()),
        },
        content: spec.content,
    }
}

#[async_trait]
impl StorageClient for MemoryStore {
    async fn get_metadata(&self, id: &NodeId, _fields: &str) -> Result<Node> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.failing.contains(id) {
            return Err(Error::Upstream(format!("injected failure for {}", id)));
        }
        Ok(state.get(id)?.node.clone())
    }

    async fn list_children(&self, parent: &NodeId, page_size: usize) -> Result<Vec<Node>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        Ok(state
            .live()
            .filter(|stored| stored.node.has_parent(parent))
            .take(page_size)
            .map(|stored| stored.node.clone())
            .collect())
    }

    async fn create_node(&self, spec: NewNode) -> Result<Node> {
        let mut state = self.lock();
        state.require_parents(&spec.parents)?;
        let id = NodeId::new(uuid::Uuid::new_v4().simple().to_string());
        let stored = stored_node(id, spec);
        let node = stored.node.clone();
        state.insert(stored);
        Ok(node)
    }

    async fn update_node(&self, id: &NodeId, patch: NodePatch) -> Result<Node> {
        let mut state = self.lock();
        let stored = state.get_mut(id)?;
        if let Some(name) = patch.name {
            stored.node.name = name;
        }
        if let Some(mime_type) = patch.mime_type {
            stored.node.kind = NodeKind::from_mime(&mime_type);
            stored.node.mime_type = mime_type;
        }
        if let Some(content) = patch.content {
            stored.node.size = Some(content.len() as u64);
            stored.content = Some(content);
        }
        if let Some(trashed) = patch.trashed {
            stored.node.trashed = trashed;
        }
        stored.node.modified_time = Some(Utc::now());
        Ok(stored.node.clone())
    }

    async fn delete_node(&self, id: &NodeId) -> Result<()> {
        let mut state = self.lock();
        state.get(id)?;

        // Deleting a folder takes every node left without a parent with it.
        let mut pending = vec![id.clone()];
        while let Some(gone) = pending.pop() {
            state.nodes.remove(&gone);
            for stored in state.nodes.values_mut() {
                if stored.node.has_parent(&gone) {
                    stored.node.parents.retain(|p| p != &gone);
                    if stored.node.parents.is_empty() {
                        pending.push(stored.node.id.clone());
                    }
                }
            }
        }
        let State { order, nodes, .. } = &mut *state;
        order.retain(|id| nodes.contains_key(id));
        Ok(())
    }

    async fn export_as_text(&self, id: &NodeId, target_mime: &str) -> Result<String> {
        let state = self.lock();
        let stored = state.readable(id)?;
        if stored.node.mime_type != DOCUMENT_MIME {
            return Err(Error::Upstream(format!(
                "cannot export {} ({}) as {}",
                id, stored.node.mime_type, target_mime
            )));
        }
        let bytes = stored.content.clone().unwrap_or_default();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn download_bytes(&self, id: &NodeId) -> Result<Vec<u8>> {
        let state = self.lock();
        let stored = state.readable(id)?;
        if stored.node.mime_type == FOLDER_MIME || stored.node.mime_type == DOCUMENT_MIME {
            return Err(Error::Upstream(format!(
                "{} ({}) has no downloadable body",
                id, stored.node.mime_type
            )));
        }
        Ok(stored.content.clone().unwrap_or_default())
    }

    async fn set_parents(&self, id: &NodeId, add: &[NodeId], remove: &[NodeId]) -> Result<Node> {
        let mut state = self.lock();
        state.require_parents(add)?;
        state.get(id)?;
        if let Some(parent) = add.iter().find(|p| state.is_ancestor_or_self(id, p)) {
            return Err(Error::CyclicMove {
                id: id.clone(),
                new_parent: parent.clone(),
            });
        }
        let stored = state.get_mut(id)?;
        stored.node.parents.retain(|p| !remove.contains(p));
        for parent in add {
            if !stored.node.has_parent(parent) {
                stored.node.parents.push(parent.clone());
            }
        }
        stored.node.modified_time = Some(Utc::now());
        Ok(stored.node.clone())
    }

    async fn query_by_name_substring(&self, text: &str) -> Result<Vec<Node>> {
        let needle = text.to_lowercase();
        let state = self.lock();
        Ok(state
            .live()
            .filter(|stored| stored.node.name.to_lowercase().contains(&needle))
            .map(|stored| stored.node.clone())
            .collect())
    }

    async fn query_all(&self) -> Result<Vec<Node>> {
        let state = self.lock();
        Ok(state.live().map(|stored| stored.node.clone()).collect())
    }

    async fn find_top_level_folders(&self, name: &str) -> Result<Vec<Node>> {
        let state = self.lock();
        Ok(state
            .live()
            .filter(|stored| stored.node.parents.is_empty())
            .filter(|stored| stored.node.is_folder() && stored.node.name == name)
            .map(|stored| stored.node.clone())
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Builds fixture stores with caller-chosen ids.
#[derive(Debug, Default)]
pub struct MemoryStoreBuilder {
    state: State,
}

impl MemoryStoreBuilder {
    /// Adds a folder.
    pub fn folder(mut self, id: &str, name: &str, parents: &[&str]) -> Self {
        let spec = NewNode::folder(name, ids(parents));
        self.state.insert(stored_node(NodeId::from(id), spec));
        self
    }

    /// Adds a file with a body.
    pub fn file(mut self, id: &str, name: &str, mime_type: &str, parents: &[&str], body: &str) -> Self {
        let spec = NewNode::file(name, mime_type, ids(parents), body.as_bytes().to_vec());
        self.state.insert(stored_node(NodeId::from(id), spec));
        self
    }

    /// Marks an already added node as trashed.
    pub fn trashed(mut self, id: &str) -> Self {
        if let Some(stored) = self.state.nodes.get_mut(&NodeId::from(id)) {
            stored.node.trashed = true;
        }
        self
    }

    /// Finishes the store.
    pub fn build(self) -> MemoryStore {
        MemoryStore {
            state: Mutex::new(self.state),
            ..Default::default()
        }
    }
}

fn ids(raw: &[&str]) -> Vec<NodeId> {
    raw.iter().map(|id| NodeId::from(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::PARENT_FIELDS as PARENT;

    fn fixture() -> MemoryStore {
        MemoryStore::builder()
            .folder("root", "sandbox", &[])
            .folder("a", "docs", &["root"])
            .file("b", "notes.txt", "text/plain", &["a"], "hello")
            .file("c", "old.txt", "text/plain", &["a"], "bye")
            .trashed("c")
            .build()
    }

    #[tokio::test]
    async fn list_children_skips_trashed() {
        let store = fixture();
        let children = store.list_children(&NodeId::from("a"), 100).await.unwrap();

        let names: Vec<_> = children.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["notes.txt"]);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn list_children_respects_page_size() {
        let store = MemoryStore::builder()
            .folder("root", "sandbox", &[])
            .file("1", "one", "text/plain", &["root"], "")
            .file("2", "two", "text/plain", &["root"], "")
            .build();

        let children = store.list_children(&NodeId::from("root"), 1).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].id, NodeId::from("1"));
    }

    #[tokio::test]
    async fn get_metadata_reports_missing_and_injected_failures() {
        let store = fixture();
        store.fail_metadata_for("a");

        let missing = store.get_metadata(&NodeId::from("nope"), PARENT).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));

        let failing = store.get_metadata(&NodeId::from("a"), PARENT).await;
        assert!(matches!(failing, Err(Error::Upstream(_))));
        assert_eq!(store.metadata_calls(), 2);
    }

    #[tokio::test]
    async fn create_requires_existing_parents() {
        let store = fixture();
        let result = store
            .create_node(NewNode::folder("x", vec![NodeId::from("ghost")]))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));

        let created = store
            .create_node(NewNode::folder("x", vec![NodeId::from("a")]))
            .await
            .unwrap();
        assert!(created.is_folder());
        assert!(store.contains(&created.id));
    }

    #[tokio::test]
    async fn delete_cascades_to_orphans_only() {
        let store = MemoryStore::builder()
            .folder("root", "sandbox", &[])
            .folder("a", "a", &["root"])
            .folder("other", "other", &[])
            .file("only", "only.txt", "text/plain", &["a"], "")
            .file("shared", "shared.txt", "text/plain", &["a", "other"], "")
            .build();

        store.delete_node(&NodeId::from("a")).await.unwrap();

        assert!(!store.contains(&NodeId::from("a")));
        assert!(!store.contains(&NodeId::from("only")));
        let shared = store
            .get_metadata(&NodeId::from("shared"), PARENT)
            .await
            .unwrap();
        assert_eq!(shared.parents, vec![NodeId::from("other")]);
    }

    #[tokio::test]
    async fn set_parents_adds_and_removes() {
        let store = fixture();
        let moved = store
            .set_parents(&NodeId::from("b"), &[NodeId::from("root")], &[NodeId::from("a")])
            .await
            .unwrap();
        assert_eq!(moved.parents, vec![NodeId::from("root")]);
    }

    #[tokio::test]
    async fn set_parents_refuses_cycles() {
        let store = MemoryStore::builder()
            .folder("root", "sandbox", &[])
            .folder("a", "a", &["root"])
            .folder("b", "b", &["a"])
            .build();
        let a = NodeId::from("a");

        let onto_self = store.set_parents(&a, &[a.clone()], &[]).await;
        assert!(matches!(onto_self, Err(Error::CyclicMove { .. })));

        let below = store
            .set_parents(&a, &[NodeId::from("b")], &[NodeId::from("root")])
            .await;
        assert!(matches!(below, Err(Error::CyclicMove { new_parent, .. }) if new_parent == NodeId::from("b")));

        let a_node = store.get_metadata(&a, PARENT).await.unwrap();
        assert_eq!(a_node.parents, vec![NodeId::from("root")]);
    }

    #[tokio::test]
    async fn root_lookup_only_sees_top_level_folders() {
        let store = MemoryStore::builder()
            .folder("root", "sandbox", &[])
            .folder("nested", "sandbox", &["root"])
            .build();

        let found = store.find_top_level_folders("sandbox").await.unwrap();
        let ids: Vec<_> = found.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root"]);
    }

    #[tokio::test]
    async fn export_only_serves_documents() {
        let store = MemoryStore::builder()
            .file("doc", "Plan", DOCUMENT_MIME, &[], "quarterly report")
            .file("txt", "plan.txt", "text/plain", &[], "plain")
            .build();

        let text = store
            .export_as_text(&NodeId::from("doc"), "text/plain")
            .await
            .unwrap();
        assert_eq!(text, "quarterly report");
        assert!(store
            .export_as_text(&NodeId::from("txt"), "text/plain")
            .await
            .is_err());
        assert!(store.download_bytes(&NodeId::from("doc")).await.is_err());
        assert_eq!(
            store.download_bytes(&NodeId::from("txt")).await.unwrap(),
            b"plain".to_vec()
        );
    }

    #[tokio::test]
    async fn name_query_is_case_insensitive_and_skips_trash() {
        let store = fixture();
        let hits = store.query_by_name_substring("TXT").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, NodeId::from("b"));
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = fixture();
        store.save(&path).unwrap();

        assert!(MemoryStore::new().is_empty());
        let loaded = MemoryStore::load(&path).unwrap();
        assert!(!loaded.is_empty());
        assert_eq!(loaded.len(), 4);
        let all = loaded.query_all().await.unwrap();
        let ids: Vec<_> = all.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "a", "b"]);
    }
}
