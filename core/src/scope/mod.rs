//! Sandbox scope enforcement.
//!
//! [`RootResolver`] finds the folder that bounds the sandbox,
//! [`AncestryVerifier`] decides membership by searching upward through parent
//! links, and [`ScopedTraversal`] and [`SearchEngine`] explore only what the
//! verifier admits.

mod ancestry;
mod root;
mod search;
mod traversal;

pub use ancestry::{Ancestry, AncestryVerifier};
pub use root::RootResolver;
pub use search::{extract_text, SearchEngine};
pub use traversal::ScopedTraversal;
