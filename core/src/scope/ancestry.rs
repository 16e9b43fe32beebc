//! Decides whether a node lies inside the sandbox subtree.
//!
//! Ancestry is a set-valued relation: a node may have several parents, so the
//! check is a breadth-first search upward over a DAG rather than a walk along
//! a single parent chain.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::node::NodeId;
use crate::storage::{StorageClient, PARENT_FIELDS};

/// Outcome of an ancestry check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    /// The candidate is the root or reaches it within the hop budget.
    Reached,
    /// No path to the root was found within the hop budget.
    Unreachable,
    /// The store has no node with the candidate id.
    Missing,
}

/// Upward breadth-first ancestry check with a hop budget.
pub struct AncestryVerifier {
    store: Arc<dyn StorageClient>,
    hop_budget: usize,
    max_concurrency: usize,
}

impl AncestryVerifier {
    pub fn new(store: Arc<dyn StorageClient>, hop_budget: usize, max_concurrency: usize) -> Self {
        Self {
            store,
            hop_budget,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Returns true if `candidate` is `root` or reaches it within the hop budget.
    ///
    /// A failed fetch (missing node, permission, transient error) drops that
    /// branch only; the remaining branches are still searched. Running out of
    /// frontier or budget answers false.
    pub async fn is_descendant(&self, candidate: &NodeId, root: &NodeId) -> bool {
        self.check(candidate, root).await == Ancestry::Reached
    }

    /// Like [`AncestryVerifier::is_descendant`], but tells a candidate the
    /// store does not know apart from one that is merely out of scope.
    pub async fn check(&self, candidate: &NodeId, root: &NodeId) -> Ancestry {
        if candidate == root {
            return Ancestry::Reached;
        }

        let mut visited: HashSet<NodeId> = HashSet::from([candidate.clone()]);
        let mut frontier = vec![candidate.clone()];

        for hop in 0..self.hop_budget {
            if frontier.is_empty() {
                tracing::debug!(node_id = %candidate, hops = hop, "ancestry exhausted");
                return Ancestry::Unreachable;
            }

            let store = &self.store;
            let fetched: Vec<_> = stream::iter(frontier)
                .map(|id| async move {
                    let result = store.get_metadata(&id, PARENT_FIELDS).await;
                    (id, result)
                })
                .buffered(self.max_concurrency)
                .collect()
                .await;

            let mut next = Vec::new();
            for (id, result) in fetched {
                let node = match result {
                    Ok(node) => node,
                    Err(e) if hop == 0 && e.is_not_found() => return Ancestry::Missing,
                    Err(e) => {
                        tracing::debug!(node_id = %id, error = %e, "dropping ancestry branch");
                        continue;
                    }
                };
                for parent in node.parents {
                    if &parent == root {
                        return Ancestry::Reached;
                    }
                    if visited.insert(parent.clone()) {
                        next.push(parent);
                    }
                }
            }
            frontier = next;
        }

        tracing::debug!(
            node_id = %candidate,
            hops = self.hop_budget,
            "hop budget exhausted before reaching root"
        );
        Ancestry::Unreachable
    }
}
