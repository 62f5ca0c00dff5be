use crate::nodes::{ConcreteNodePtr, InnerNode, OpaqueNodePtr};

/// Per-class node population counts for one tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of 4-entry inner nodes
    pub node4_count: usize,
    /// Number of 16-entry inner nodes
    pub node16_count: usize,
    /// Number of 48-entry inner nodes
    pub node48_count: usize,
    /// Number of 256-entry inner nodes
    pub node256_count: usize,
    /// Number of leaves
    pub leaf_count: usize,
    /// Total number of children across all inner nodes
    pub child_count: usize,
    /// Total number of prefix bytes stored in inner node headers
    pub prefix_byte_count: usize,
}

impl TreeStats {
    /// Total number of inner nodes of any class.
    pub fn inner_node_count(&self) -> usize {
        self.node4_count + self.node16_count + self.node48_count + self.node256_count
    }
}

/// Walk the whole tree and count nodes per class.
///
/// # Safety
///
///  - This function cannot be called concurrently with any mutating
///    operation on `root` or any child node of `root`.
pub(crate) unsafe fn collect_tree_stats<V>(root: OpaqueNodePtr<V>) -> TreeStats {
    fn tally<V, N: InnerNode<Value = V>>(
        stats: &mut TreeStats,
        stack: &mut Vec<OpaqueNodePtr<V>>,
        inner_node: &N,
    ) {
        stats.child_count += inner_node.header().num_children();
        stats.prefix_byte_count += inner_node.header().prefix_len();
        stack.extend(inner_node.iter().map(|(_, child)| child));
    }

    let mut stats = TreeStats::default();
    let mut stack = vec![root];

    while let Some(node) = stack.pop() {
        // SAFETY (all arms): The references are bounded to this iteration
        // and nothing mutates the tree during the walk, per the requirements
        // on this function.
        match node.to_node_ptr() {
            ConcreteNodePtr::LeafNode(_) => stats.leaf_count += 1,
            ConcreteNodePtr::Node4(inner_ptr) => {
                stats.node4_count += 1;
                tally(&mut stats, &mut stack, unsafe { inner_ptr.as_ref() });
            },
            ConcreteNodePtr::Node16(inner_ptr) => {
                stats.node16_count += 1;
                tally(&mut stats, &mut stack, unsafe { inner_ptr.as_ref() });
            },
            ConcreteNodePtr::Node48(inner_ptr) => {
                stats.node48_count += 1;
                tally(&mut stats, &mut stack, unsafe { inner_ptr.as_ref() });
            },
            ConcreteNodePtr::Node256(inner_ptr) => {
                stats.node256_count += 1;
                tally(&mut stats, &mut stack, unsafe { inner_ptr.as_ref() });
            },
        }
    }

    stats
}
