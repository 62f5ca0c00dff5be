use crate::nodes::{
    ConcreteNodePtr, InnerNode, InnerNodeCompressed, NodeType, OpaqueNodePtr,
    RestrictedNodeIndex,
};
use std::{collections::HashSet, error::Error, fmt};

/// An issue with the structure of the tree found by [`check_tree`].
///
/// None of these can arise through the public map API; the checker exists so
/// that tests can verify the structural invariants after every kind of tree
/// transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedTreeError {
    /// The same node was reached through two different paths.
    LoopFound {
        /// The type of the node that was observed twice
        node_type: NodeType,
    },
    /// An inner node is empty or holds more children than its class allows.
    ChildCountOutOfRange {
        /// The type of the offending inner node
        node_type: NodeType,
        /// The recorded number of children
        num_children: usize,
    },
    /// An inner node's recorded child count disagrees with the number of
    /// populated slots.
    WrongChildCount {
        /// The type of the offending inner node
        node_type: NodeType,
        /// The recorded number of children
        num_children: usize,
        /// The number of populated child slots found
        populated: usize,
    },
    /// A compressed node holds the same key byte twice.
    DuplicateKeyFragment {
        /// The type of the offending inner node
        node_type: NodeType,
        /// The repeated key byte
        key_fragment: u8,
    },
    /// A 48-entry node's byte map points at a slot that is out of range or
    /// already claimed by another key byte.
    BadSlotIndex {
        /// The key byte whose mapping is broken
        key_fragment: u8,
        /// The slot index stored for that key byte
        slot_index: usize,
        /// The recorded number of children
        num_children: usize,
    },
    /// The number of leaves in the tree disagrees with the recorded length.
    LeafCountMismatch {
        /// The length recorded by the map
        expected: usize,
        /// The number of leaves found in the tree
        actual: usize,
    },
}

impl fmt::Display for MalformedTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MalformedTreeError::LoopFound { node_type } => {
                write!(f, "found a loop in the tree through a [{node_type:?}] node")
            },
            MalformedTreeError::ChildCountOutOfRange {
                node_type,
                num_children,
            } => {
                write!(
                    f,
                    "found a [{node_type:?}] node with [{num_children}] children, outside the \
                     range [1..={}]",
                    node_type.upper_capacity()
                )
            },
            MalformedTreeError::WrongChildCount {
                node_type,
                num_children,
                populated,
            } => {
                write!(
                    f,
                    "found a [{node_type:?}] node recording [{num_children}] children but \
                     holding [{populated}] populated slots"
                )
            },
            MalformedTreeError::DuplicateKeyFragment {
                node_type,
                key_fragment,
            } => {
                write!(
                    f,
                    "found a [{node_type:?}] node holding the key byte [{key_fragment}] twice"
                )
            },
            MalformedTreeError::BadSlotIndex {
                key_fragment,
                slot_index,
                num_children,
            } => {
                write!(
                    f,
                    "found a 48-entry node mapping key byte [{key_fragment}] to slot \
                     [{slot_index}], which is out of range or repeated for [{num_children}] \
                     children"
                )
            },
            MalformedTreeError::LeafCountMismatch { expected, actual } => {
                write!(
                    f,
                    "the tree holds [{actual}] leaves but the map records a length of \
                     [{expected}]"
                )
            },
        }
    }
}

impl Error for MalformedTreeError {}

/// Walk the whole tree and check the structural invariants of every node.
///
/// Checks that no node is reachable through two paths, that every inner
/// node's recorded child count matches its populated slots and lies within
/// the capacity of its class, and that the 48-entry byte map is consistent.
/// Returns the number of leaves.
///
/// # Safety
///
///  - This function cannot be called concurrently with any mutating
///    operation on `root` or any child node of `root`.
pub(crate) unsafe fn check_tree<V>(
    root: OpaqueNodePtr<V>,
) -> Result<usize, MalformedTreeError> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    let mut leaf_count = 0usize;

    while let Some(node) = stack.pop() {
        if !seen.insert(node.to_untagged_ptr() as usize) {
            return Err(MalformedTreeError::LoopFound {
                node_type: node.node_type(),
            });
        }

        // SAFETY (all arms): The references are bounded to this iteration
        // and nothing mutates the tree during the walk, per the requirements
        // on this function.
        match node.to_node_ptr() {
            ConcreteNodePtr::LeafNode(_) => {
                leaf_count += 1;
            },
            ConcreteNodePtr::Node4(inner_ptr) => {
                let inner_node = unsafe { inner_ptr.as_ref() };
                check_compressed(inner_node, NodeType::Node4)?;
                stack.extend(inner_node.iter().map(|(_, child)| child));
            },
            ConcreteNodePtr::Node16(inner_ptr) => {
                let inner_node = unsafe { inner_ptr.as_ref() };
                check_compressed(inner_node, NodeType::Node16)?;
                stack.extend(inner_node.iter().map(|(_, child)| child));
            },
            ConcreteNodePtr::Node48(inner_ptr) => {
                let inner_node = unsafe { inner_ptr.as_ref() };

                let num_children = inner_node.header.num_children();
                if !(1..=48).contains(&num_children) {
                    return Err(MalformedTreeError::ChildCountOutOfRange {
                        node_type: NodeType::Node48,
                        num_children,
                    });
                }

                let mut claimed_slots = [false; 48];
                let mut populated = 0usize;
                for (key_fragment, index) in inner_node.child_indices.iter().enumerate() {
                    if *index == RestrictedNodeIndex::<48>::EMPTY {
                        continue;
                    }

                    let slot_index = usize::from(*index);
                    if slot_index >= num_children || claimed_slots[slot_index] {
                        return Err(MalformedTreeError::BadSlotIndex {
                            // PANIC SAFETY: enumerating 256 entries stays in
                            // `u8` range.
                            key_fragment: u8::try_from(key_fragment).unwrap(),
                            slot_index,
                            num_children,
                        });
                    }
                    claimed_slots[slot_index] = true;
                    populated += 1;
                }

                if populated != num_children {
                    return Err(MalformedTreeError::WrongChildCount {
                        node_type: NodeType::Node48,
                        num_children,
                        populated,
                    });
                }

                stack.extend(inner_node.iter().map(|(_, child)| child));
            },
            ConcreteNodePtr::Node256(inner_ptr) => {
                let inner_node = unsafe { inner_ptr.as_ref() };

                let num_children = inner_node.header.num_children();
                if !(1..=256).contains(&num_children) {
                    return Err(MalformedTreeError::ChildCountOutOfRange {
                        node_type: NodeType::Node256,
                        num_children,
                    });
                }

                let populated = inner_node
                    .child_pointers
                    .iter()
                    .filter(|child| child.is_some())
                    .count();
                if populated != num_children {
                    return Err(MalformedTreeError::WrongChildCount {
                        node_type: NodeType::Node256,
                        num_children,
                        populated,
                    });
                }

                stack.extend(inner_node.iter().map(|(_, child)| child));
            },
        }
    }

    Ok(leaf_count)
}

fn check_compressed<V, const SIZE: usize>(
    inner_node: &InnerNodeCompressed<V, SIZE>,
    node_type: NodeType,
) -> Result<(), MalformedTreeError> {
    let num_children = inner_node.header.num_children();
    if !(1..=SIZE).contains(&num_children) {
        return Err(MalformedTreeError::ChildCountOutOfRange {
            node_type,
            num_children,
        });
    }

    let (keys, _) = inner_node.initialized_portion();
    for (index, key_fragment) in keys.iter().enumerate() {
        if keys[..index].contains(key_fragment) {
            return Err(MalformedTreeError::DuplicateKeyFragment {
                node_type,
                key_fragment: *key_fragment,
            });
        }
    }

    Ok(())
}
