//! Name and content search restricted to the sandbox.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::node::{is_text_bearing, Node, NodeId, DOCUMENT_MIME, TEXT_EXPORT_MIME};
use crate::storage::StorageClient;

use super::ancestry::AncestryVerifier;

/// Reads the text of a node, exporting native documents and downloading
/// other text-bearing kinds.
pub async fn extract_text(store: &dyn StorageClient, node: &Node) -> Result<String> {
    if !is_text_bearing(&node.mime_type) {
        return Err(Error::NotText {
            id: node.id.clone(),
            mime_type: node.mime_type.clone(),
        });
    }
    if node.mime_type == DOCUMENT_MIME {
        return store.export_as_text(&node.id, TEXT_EXPORT_MIME).await;
    }
    let bytes = store.download_bytes(&node.id).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Two-phase search: name hits first, then optional body hits.
pub struct SearchEngine {
    store: Arc<dyn StorageClient>,
    verifier: Arc<AncestryVerifier>,
    max_concurrency: usize,
}

impl SearchEngine {
    pub fn new(
        store: Arc<dyn StorageClient>,
        verifier: Arc<AncestryVerifier>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            verifier,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Searches the sandbox under `root`.
    ///
    /// Name hits keep store order. With `include_content`, nodes whose text
    /// contains `query` (case-insensitive) are appended in discovery order,
    /// skipping ids already found by name. Extraction failures and
    /// non-text kinds are silently skipped.
    pub async fn search_scoped(
        &self,
        root: &NodeId,
        query: &str,
        include_content: bool,
    ) -> Result<Vec<Node>> {
        let by_name = self.store.query_by_name_substring(query).await?;
        let mut results = self.in_scope(root, by_name).await;
        tracing::debug!(query = %query, hits = results.len(), "name search");

        if !include_content {
            return Ok(results);
        }

        let mut found: HashSet<NodeId> = results.iter().map(|n| n.id.clone()).collect();
        let candidates: Vec<Node> = self
            .store
            .query_all()
            .await?
            .into_iter()
            .filter(|node| !found.contains(&node.id) && is_text_bearing(&node.mime_type))
            .collect();
        let candidates = self.in_scope(root, candidates).await;

        let needle = query.to_lowercase();
        let needle = needle.as_str();
        let store = &self.store;
        let matched: Vec<_> = stream::iter(candidates)
            .map(|node| async move {
                let hit = match extract_text(store.as_ref(), &node).await {
                    Ok(text) => text.to_lowercase().contains(needle),
                    Err(e) => {
                        tracing::debug!(node_id = %node.id, error = %e, "skipping unreadable node");
                        false
                    }
                };
                (node, hit)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        for (node, hit) in matched {
            if hit && found.insert(node.id.clone()) {
                results.push(node);
            }
        }

        tracing::debug!(query = %query, hits = results.len(), "content search");
        Ok(results)
    }

    /// Keeps the nodes that pass the ancestry check, preserving order.
    async fn in_scope(&self, root: &NodeId, nodes: Vec<Node>) -> Vec<Node> {
        let verifier = &self.verifier;
        let checked: Vec<_> = stream::iter(nodes)
            .map(|node| async move {
                let allowed = verifier.is_descendant(&node.id, root).await;
                (node, allowed)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        checked
            .into_iter()
            .filter_map(|(node, allowed)| allowed.then_some(node))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn engine(store: &Arc<MemoryStore>) -> SearchEngine {
        let verifier = Arc::new(AncestryVerifier::new(store.clone(), 30, 2));
        SearchEngine::new(store.clone(), verifier, 2)
    }

    fn ids(nodes: &[Node]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    fn fixture() -> MemoryStore {
        MemoryStore::builder()
            .folder("root", "sandbox", &[])
            .folder("outside", "elsewhere", &[])
            .file("r1", "report-q1.txt", "text/plain", &["root"], "numbers")
            .file("r2", "report-q2.txt", "text/plain", &["outside"], "numbers")
            .file("x", "x.txt", "text/plain", &["root"], "see the Report attached")
            .file("doc", "Minutes", DOCUMENT_MIME, &["root"], "report follows")
            .file("json", "data.json", "application/json", &["root"], "{\"kind\":\"report\"}")
            .file("pdf", "scan.pdf", "application/pdf", &["root"], "report")
            .file("leak", "leak.txt", "text/plain", &["outside"], "report")
            .file("old", "old.txt", "text/plain", &["root"], "report")
            .trashed("old")
            .build()
    }

    #[tokio::test]
    async fn name_search_filters_to_scope() {
        let store = Arc::new(fixture());
        let hits = engine(&store)
            .search_scoped(&NodeId::from("root"), "report", false)
            .await
            .unwrap();

        assert_eq!(ids(&hits), vec!["r1"]);
    }

    #[tokio::test]
    async fn content_search_appends_body_hits() {
        let store = Arc::new(fixture());
        let hits = engine(&store)
            .search_scoped(&NodeId::from("root"), "report", true)
            .await
            .unwrap();

        assert_eq!(ids(&hits), vec!["r1", "x", "doc", "json"]);
    }

    #[tokio::test]
    async fn name_and_body_hit_is_reported_once() {
        let store = Arc::new(
            MemoryStore::builder()
                .folder("root", "sandbox", &[])
                .file("both", "report.md", "text/markdown", &["root"], "report body")
                .build(),
        );
        let hits = engine(&store)
            .search_scoped(&NodeId::from("root"), "report", true)
            .await
            .unwrap();

        assert_eq!(ids(&hits), vec!["both"]);
    }

    #[tokio::test]
    async fn extraction_failures_are_skipped() {
        let store = Arc::new(
            MemoryStore::builder()
                .folder("root", "sandbox", &[])
                .file("bad", "bad.csv", "text/csv", &["root"], "report")
                .file("good", "good.csv", "text/csv", &["root"], "report,1")
                .build(),
        );
        store.fail_content_for("bad");
        let hits = engine(&store)
            .search_scoped(&NodeId::from("root"), "REPORT", true)
            .await
            .unwrap();

        assert_eq!(ids(&hits), vec!["good"]);
    }

    #[tokio::test]
    async fn extract_text_rejects_binary_kinds() {
        let store = fixture();
        let pdf = store
            .get_metadata(&NodeId::from("pdf"), crate::storage::NODE_FIELDS)
            .await
            .unwrap();

        let result = extract_text(&store, &pdf).await;
        assert!(matches!(result, Err(Error::NotText { .. })));
    }
}
