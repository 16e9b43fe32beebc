//! Finds or creates the sandbox root folder.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{AmbiguousRootPolicy, ScopeConfig};
use crate::error::{Error, Result};
use crate::node::{NewNode, NodeId};
use crate::storage::StorageClient;

/// Resolves the folder that bounds the sandbox.
///
/// Only top-level folders are candidates, matching where the root is created.
/// A folder inside the sandbox that happens to share the root name is an
/// ordinary node. Every call re-queries the store so the answer tracks remote state. Calls
/// through one resolver are serialised, so it never creates two roots itself;
/// separate processes can still race on first creation.
pub struct RootResolver {
    store: Arc<dyn StorageClient>,
    root_name: String,
    policy: AmbiguousRootPolicy,
    resolving: Mutex<()>,
}

impl RootResolver {
    pub fn new(store: Arc<dyn StorageClient>, config: &ScopeConfig) -> Self {
        Self {
            store,
            root_name: config.root_name.clone(),
            policy: config.ambiguous_root,
            resolving: Mutex::new(()),
        }
    }

    /// Returns the root folder id, creating a top-level folder if none exists.
    pub async fn resolve(&self) -> Result<NodeId> {
        let _guard = self.resolving.lock().await;

        let mut matches = self.store.find_top_level_folders(&self.root_name).await?;
        match matches.len() {
            0 => {
                let created = self
                    .store
                    .create_node(NewNode::folder(&self.root_name, vec![]))
                    .await?;
                tracing::info!(
                    root_id = %created.id,
                    name = %self.root_name,
                    "created sandbox root"
                );
                Ok(created.id)
            }
            1 => Ok(matches.remove(0).id),
            n => match self.policy {
                AmbiguousRootPolicy::First => {
                    tracing::warn!(
                        name = %self.root_name,
                        candidates = n,
                        "several folders share the root name, using the first"
                    );
                    Ok(matches.remove(0).id)
                }
                AmbiguousRootPolicy::Error => Err(Error::AmbiguousRoot {
                    name: self.root_name.clone(),
                    candidates: matches.into_iter().map(|node| node.id).collect(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn resolver(store: Arc<MemoryStore>, config: &ScopeConfig) -> RootResolver {
        RootResolver::new(store, config)
    }

    #[tokio::test]
    async fn resolve_returns_existing_root() {
        let store = Arc::new(
            MemoryStore::builder()
                .folder("r1", "sandbox", &[])
                .folder("other", "elsewhere", &[])
                .build(),
        );
        let resolver = resolver(store.clone(), &ScopeConfig::new("sandbox"));

        let first = resolver.resolve().await.unwrap();
        let second = resolver.resolve().await.unwrap();

        assert_eq!(first, NodeId::from("r1"));
        assert_eq!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn resolve_creates_missing_root_once() {
        let store = Arc::new(MemoryStore::new());
        let resolver = resolver(store.clone(), &ScopeConfig::new("sandbox"));

        let created = resolver.resolve().await.unwrap();
        let again = resolver.resolve().await.unwrap();

        assert_eq!(created, again);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_resolution_creates_one_root() {
        let store = Arc::new(MemoryStore::new());
        let resolver = Arc::new(resolver(store.clone(), &ScopeConfig::new("sandbox")));

        let a = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve().await }
        });
        let b = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve().await }
        });

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn ignores_trashed_and_file_namesakes() {
        let store = Arc::new(
            MemoryStore::builder()
                .folder("old", "sandbox", &[])
                .trashed("old")
                .file("f", "sandbox", "text/plain", &[], "")
                .folder("live", "sandbox", &[])
                .build(),
        );
        let resolver = resolver(store, &ScopeConfig::new("sandbox"));

        assert_eq!(resolver.resolve().await.unwrap(), NodeId::from("live"));
    }

    #[tokio::test]
    async fn nested_namesake_is_not_a_candidate() {
        let store = Arc::new(
            MemoryStore::builder()
                .folder("root", "sandbox", &[])
                .folder("docs", "docs", &["root"])
                .folder("copy", "sandbox", &["docs"])
                .build(),
        );
        let resolver = resolver(store, &ScopeConfig::new("sandbox"));

        assert_eq!(resolver.resolve().await.unwrap(), NodeId::from("root"));
    }

    #[tokio::test]
    async fn ambiguous_root_is_an_error_by_default() {
        let store = Arc::new(
            MemoryStore::builder()
                .folder("a", "sandbox", &[])
                .folder("b", "sandbox", &[])
                .build(),
        );
        let resolver = resolver(store, &ScopeConfig::new("sandbox"));

        match resolver.resolve().await {
            Err(Error::AmbiguousRoot { name, candidates }) => {
                assert_eq!(name, "sandbox");
                assert_eq!(candidates, vec![NodeId::from("a"), NodeId::from("b")]);
            }
            other => panic!("expected AmbiguousRoot, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ambiguous_root_can_take_first() {
        let store = Arc::new(
            MemoryStore::builder()
                .folder("a", "sandbox", &[])
                .folder("b", "sandbox", &[])
                .build(),
        );
        let config = ScopeConfig::new("sandbox").with_ambiguous_root(AmbiguousRootPolicy::First);
        let resolver = resolver(store, &config);

        assert_eq!(resolver.resolve().await.unwrap(), NodeId::from("a"));
    }
}
