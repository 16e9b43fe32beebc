//! Depth-bounded breadth-first listing below a verified start folder.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{Error, Result};
use crate::node::{ListedNode, NodeId};
use crate::storage::StorageClient;

use super::ancestry::{Ancestry, AncestryVerifier};

/// Lists descendants of a start node in breadth-first order.
///
/// Each node appears once, at the first position BFS reaches it, even when
/// several in-scope parents lead to it. This also stops parent-link cycles
/// from looping.
pub struct ScopedTraversal {
    store: Arc<dyn StorageClient>,
    verifier: Arc<AncestryVerifier>,
    page_size: usize,
    max_concurrency: usize,
}

impl ScopedTraversal {
    pub fn new(
        store: Arc<dyn StorageClient>,
        verifier: Arc<AncestryVerifier>,
        page_size: usize,
        max_concurrency: usize,
    ) -> Self {
        Self {
            store,
            verifier,
            page_size,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Lists non-trashed descendants of `start` down to `max_depth` levels.
    ///
    /// Children of `start` carry depth 0. A folder at depth `d` is expanded
    /// only when `d + 1 < max_depth`. Sibling order is the store's order.
    pub async fn list_scoped(
        &self,
        root: &NodeId,
        start: &NodeId,
        max_depth: usize,
    ) -> Result<Vec<ListedNode>> {
        match self.verifier.check(start, root).await {
            Ancestry::Reached => {}
            Ancestry::Missing => return Err(Error::NotFound(start.clone())),
            Ancestry::Unreachable => {
                tracing::warn!(node_id = %start, "listing denied outside sandbox");
                return Err(Error::ScopeViolation { id: start.clone() });
            }
        }

        let mut listed = Vec::new();
        if max_depth == 0 {
            return Ok(listed);
        }

        let mut seen: HashSet<NodeId> = HashSet::from([start.clone()]);
        let mut level = vec![start.clone()];
        let mut depth = 0;

        while !level.is_empty() {
            let store = &self.store;
            let page_size = self.page_size;
            let pages: Vec<_> = stream::iter(level)
                .map(|id| async move {
                    let result = store.list_children(&id, page_size).await;
                    (id, result)
                })
                .buffered(self.max_concurrency)
                .collect()
                .await;

            let mut next = Vec::new();
            for (parent, page) in pages {
                let children = page.map_err(|e| {
                    tracing::warn!(node_id = %parent, depth, error = %e, "listing children failed");
                    e
                })?;
                for child in children {
                    if !seen.insert(child.id.clone()) {
                        continue;
                    }
                    if child.is_folder() && depth + 1 < max_depth {
                        next.push(child.id.clone());
                    }
                    listed.push(ListedNode { node: child, depth });
                }
            }

            level = next;
            depth += 1;
        }

        tracing::debug!(node_id = %start, count = listed.len(), max_depth, "listed scope");
        Ok(listed)
    }
}
