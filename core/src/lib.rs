//! Scoped Drive - sandboxed file and folder operations on a remote drive
//!
//! This library confines every operation against a hierarchical store to the
//! subtree below one designated root folder. Nodes may have several parents,
//! so scope membership is decided by a bounded breadth-first search upward
//! through parent links, and listing and search only surface what that check
//! admits.

pub mod config;
pub mod credentials;
pub mod drive;
pub mod error;
pub mod node;
pub mod scope;
pub mod storage;

pub use config::{AmbiguousRootPolicy, ScopeConfig, Validate, ValidationResult};
pub use credentials::{
    authorize, AuthCodeExchanger, CredentialProvider, FileCredentialStore, MemoryCredentialStore,
    TokenSet,
};
pub use drive::ScopedDrive;
pub use error::{Error, Result};
pub use node::{BatchItemReport, ListedNode, NewNode, Node, NodeId, NodeKind, NodePatch};
pub use scope::{Ancestry, AncestryVerifier, RootResolver, ScopedTraversal, SearchEngine};
pub use storage::{MemoryStore, StorageClient};
