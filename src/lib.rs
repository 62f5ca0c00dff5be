#![deny(
    missing_docs,
    clippy::missing_safety_doc,
    unsafe_op_in_unsafe_fn,
    deprecated_in_future
)]

//! An adaptive radix tree map from byte-string keys to values.
//!
//! The tree adapts the fan-out representation of every inner node to its
//! population (4, 16, 48 or 256 children) and compresses runs of single-child
//! nodes into per-node key prefixes. The node kind of every child reference
//! is carried in the low bits of the pointer itself, so the descent loop
//! dispatches without touching the child's memory. Nodes are drawn from
//! per-class slab pools.
//!
//! # References
//!
//!  - Leis, V., Kemper, A., & Neumann, T. (2013, April). The adaptive radix
//!    tree: ARTful indexing for main-memory databases. In 2013 IEEE 29th
//!    International Conference on Data Engineering (ICDE) (pp. 38-49). IEEE.
//!    [Link to PDF][ART paper]
//!
//! [ART paper]: https://www-db.in.tum.de/~leis/papers/ART.pdf

mod bytes;
mod map;
mod nodes;
mod pool;
pub(crate) mod rust_nightly_apis;
pub mod tagged_pointer;
#[doc(hidden)]
pub mod tests_common;

pub use bytes::{AsBytes, NoPrefixesBytes, TerminatedString};
pub use map::ArtMap;
pub use nodes::InsertPrefixError;

#[doc(hidden)]
pub use nodes::visitor::{MalformedTreeError, TreeStats};
#[doc(hidden)]
pub use nodes::NodeType;
