//! Utilities for inspecting the trie structure.

mod tree_stats;
mod well_formed;

pub use tree_stats::*;
pub use well_formed::*;
