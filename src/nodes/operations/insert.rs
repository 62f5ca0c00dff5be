use crate::nodes::{
    ConcreteNodePtr, InnerNode, InnerNode4, LeafNode, NodePtr, OpaqueNodePtr, NUM_PREFIX_BYTES,
};
use crate::pool::{NodePools, Pooled};
use allocator_api2::alloc::Allocator;
use std::{error::Error, fmt, ops::ControlFlow};

/// Attempted to insert a key which was a prefix of an existing key in the
/// tree, or which an existing key is a prefix of.
///
/// Key adapters rule this out by making every key end in a byte that occurs
/// nowhere else in the key (or by using fixed-width keys); this error
/// surfaces adapter-contract violations instead of corrupting the tree.
#[derive(Clone, PartialEq, Eq)]
pub struct InsertPrefixError(
    /// The key that was the input to the failed insert
    pub Box<[u8]>,
);

impl fmt::Debug for InsertPrefixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("InsertPrefixError").field(&self.0).finish()
    }
}

impl fmt::Display for InsertPrefixError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "attempted to insert a key [{:?}] which is either a prefix of an existing key or \
             which an existing key is a prefix of",
            self.0
        )
    }
}

impl Error for InsertPrefixError {}

/// The result of a successful tree insert.
#[derive(Debug)]
pub(crate) struct InsertResult<V> {
    /// Pointer to the leaf holding the value for the key, newly created or
    /// already present.
    pub leaf_ptr: NodePtr<LeafNode<V>>,
    /// False iff the key was already present; the stored value is then
    /// unchanged.
    pub inserted: bool,
    /// The tree root after the insert.
    pub new_root: OpaqueNodePtr<V>,
}

/// The results of searching for the point where a new key would be inserted.
pub(crate) struct InsertPoint<V> {
    /// The parent of the node where the insert happens, along with the key
    /// byte selecting that node, or `None` if the insert happens at the root.
    pub parent_ptr_and_child_key_byte: Option<(OpaqueNodePtr<V>, u8)>,
    /// What kind of structural change the insert requires.
    pub insert_kind: InsertKind<V>,
    /// The number of key bytes consumed reaching the insert point.
    pub key_bytes_used: usize,
}

/// The kind of structural change an insert requires.
pub(crate) enum InsertKind<V> {
    /// The key diverged from a node's compressed prefix after
    /// `matched_prefix_size` bytes; the node must be split.
    MismatchPrefix {
        /// Number of prefix bytes that did match
        matched_prefix_size: usize,
        /// The inner node whose prefix diverged from the key
        mismatched_inner_node_ptr: OpaqueNodePtr<V>,
    },
    /// The search ended at an inner node with no child for the next key
    /// byte; the key tail becomes a new chain below that node.
    IntoExisting {
        /// The inner node that receives the new branch
        inner_node_ptr: OpaqueNodePtr<V>,
    },
    /// The full key is already present in the tree.
    Exact {
        /// The leaf already stored under the key
        leaf_node_ptr: NodePtr<LeafNode<V>>,
    },
}

/// Insert the given key and value into the tree, allocating nodes from the
/// given pools.
///
/// If the key is already present the tree is left untouched, the existing
/// leaf is returned with `inserted == false`, and `value` is dropped.
///
/// # Errors
///
/// Returns an [`InsertPrefixError`] if the key is a proper prefix of an
/// existing key or an existing key is a proper prefix of it. The tree is
/// unchanged in that case.
///
/// # Panics
///
/// Panics if `key` is empty.
///
/// # Safety
///
///  - `root` must be the unique pointer to a tree whose nodes were all
///    allocated from `pools`.
///  - This function cannot be called concurrently with any read or write of
///    the tree. It will arbitrarily read and write nodes in it.
pub(crate) unsafe fn insert_unchecked<V, A: Allocator>(
    root: Option<OpaqueNodePtr<V>>,
    key: &[u8],
    value: V,
    pools: &mut NodePools<V, A>,
) -> Result<InsertResult<V>, InsertPrefixError> {
    assert!(!key.is_empty(), "key must not be empty");

    let Some(root) = root else {
        // Empty tree: the root becomes an empty inner node and the whole key
        // becomes a chain below it.
        let root_ptr = pools.allocate(InnerNode4::empty());
        // SAFETY: The fresh root is not referenced from anywhere else.
        let (leaf_ptr, replacement) =
            unsafe { add_leaf_chain(root_ptr.to_opaque(), key, value, pools) };
        debug_assert!(replacement.is_none(), "a fresh root node cannot be full");

        return Ok(InsertResult {
            leaf_ptr,
            inserted: true,
            new_root: root_ptr.to_opaque(),
        });
    };

    // SAFETY: Covered by the safety requirements on this function.
    let InsertPoint {
        parent_ptr_and_child_key_byte,
        insert_kind,
        key_bytes_used,
    } = unsafe { search_for_insert_point(root, key)? };

    match insert_kind {
        InsertKind::Exact { leaf_node_ptr } => {
            // The key is already present. The stored value stays untouched
            // and the new value is dropped.
            Ok(InsertResult {
                leaf_ptr: leaf_node_ptr,
                inserted: false,
                new_root: root,
            })
        },
        InsertKind::IntoExisting { inner_node_ptr } => {
            // SAFETY: Unique tree access per this function's requirements.
            let (leaf_ptr, replacement) =
                unsafe { add_leaf_chain(inner_node_ptr, &key[key_bytes_used..], value, pools) };

            let new_root = match replacement {
                // The node grew into a larger class; rewire whatever pointed
                // at it.
                // SAFETY: The parent was recorded during the descent and is
                // not otherwise accessed right now.
                Some(replacement) => unsafe {
                    rewire_parent(parent_ptr_and_child_key_byte, replacement, root)
                },
                None => root,
            };

            Ok(InsertResult {
                leaf_ptr,
                inserted: true,
                new_root,
            })
        },
        InsertKind::MismatchPrefix {
            matched_prefix_size,
            mismatched_inner_node_ptr,
        } => {
            // Split: a new node takes over the matched part of the prefix
            // and adopts the old node, re-hung under its first divergent
            // prefix byte, next to the new branch.
            //
            // SAFETY: A prefix mismatch can only arise at an inner node, and
            // the header reference is dropped before the node is reachable
            // through the new split node.
            let header = unsafe { mismatched_inner_node_ptr.header_mut_unchecked() };
            let old_prefix = header.read_prefix();
            let divergent_byte = old_prefix[matched_prefix_size];
            let mut split_node = InnerNode4::from_prefix(&old_prefix[..matched_prefix_size]);
            split_node.write_child(divergent_byte, mismatched_inner_node_ptr);
            // Drop the matched bytes plus the one consumed as the selector
            // into the split node.
            header.ltrim_prefix(matched_prefix_size + 1);

            let split_node_ptr = pools.allocate(split_node);

            // The new key differs from the old prefix at this position, so
            // the chain entry takes the child-absent path in the split node.
            // SAFETY: Unique tree access per this function's requirements.
            let (leaf_ptr, replacement) = unsafe {
                add_leaf_chain(
                    split_node_ptr.to_opaque(),
                    &key[key_bytes_used + matched_prefix_size..],
                    value,
                    pools,
                )
            };
            debug_assert!(
                replacement.is_none(),
                "a fresh split node holds two children at most"
            );

            // SAFETY: The parent was recorded during the descent and is not
            // otherwise accessed right now.
            let new_root = unsafe {
                rewire_parent(
                    parent_ptr_and_child_key_byte,
                    split_node_ptr.to_opaque(),
                    root,
                )
            };

            Ok(InsertResult {
                leaf_ptr,
                inserted: true,
                new_root,
            })
        },
    }
}

/// Perform an iterative search for the point where the given key would be
/// inserted, starting from the given root node.
///
/// # Errors
///
/// Returns an [`InsertPrefixError`] if the key is a proper prefix of an
/// existing key or an existing key is a proper prefix of it.
///
/// # Safety
///
///  - This function cannot be called concurrently with any write to the
///    tree. It will arbitrarily read nodes in it.
pub(crate) unsafe fn search_for_insert_point<V>(
    root: OpaqueNodePtr<V>,
    key: &[u8],
) -> Result<InsertPoint<V>, InsertPrefixError> {
    let mut current_parent = None;
    let mut current_node = root;
    let mut current_depth = 0;

    loop {
        // SAFETY (all inner arms): Covered by the safety requirements on the
        // containing function.
        let lookup_result = match current_node.to_node_ptr() {
            ConcreteNodePtr::Node4(inner_ptr) => unsafe {
                test_prefix_identify_insert(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::Node16(inner_ptr) => unsafe {
                test_prefix_identify_insert(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::Node48(inner_ptr) => unsafe {
                test_prefix_identify_insert(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::Node256(inner_ptr) => unsafe {
                test_prefix_identify_insert(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::LeafNode(leaf_node_ptr) => {
                if current_depth == key.len() {
                    return Ok(InsertPoint {
                        parent_ptr_and_child_key_byte: current_parent,
                        insert_kind: InsertKind::Exact { leaf_node_ptr },
                        key_bytes_used: current_depth,
                    });
                }

                // An existing key ended here while the new key still has
                // bytes left: the existing key is a proper prefix of it.
                return Err(InsertPrefixError(key.into()));
            },
        }?;

        match lookup_result {
            ControlFlow::Continue(Some(next_child_node)) => {
                current_parent = Some((current_node, key[current_depth]));
                current_node = next_child_node;
                current_depth += 1;
            },
            ControlFlow::Continue(None) => {
                return Ok(InsertPoint {
                    parent_ptr_and_child_key_byte: current_parent,
                    insert_kind: InsertKind::IntoExisting {
                        inner_node_ptr: current_node,
                    },
                    key_bytes_used: current_depth,
                });
            },
            ControlFlow::Break(matched_prefix_size) => {
                return Ok(InsertPoint {
                    parent_ptr_and_child_key_byte: current_parent,
                    insert_kind: InsertKind::MismatchPrefix {
                        matched_prefix_size,
                        mismatched_inner_node_ptr: current_node,
                    },
                    key_bytes_used: current_depth,
                });
            },
        }
    }
}

/// For the given inner node, match the node prefix against the key, then
/// look up the child slot for the next key byte.
///
/// Returns `Break` with the number of matched bytes if the key diverges
/// inside the prefix, otherwise `Continue` with the child for the next key
/// byte (or `None` if that child is absent).
///
/// # Safety
///
///  - No mutation of the node referenced by `inner_ptr` may happen while
///    this function runs.
unsafe fn test_prefix_identify_insert<V, N>(
    inner_ptr: NodePtr<N>,
    key: &[u8],
    current_depth: &mut usize,
) -> Result<ControlFlow<usize, Option<OpaqueNodePtr<V>>>, InsertPrefixError>
where
    N: InnerNode<Value = V>,
{
    // SAFETY: The reference is bounded to this function and the node is not
    // mutated during it, per the requirements on this function.
    let inner_node = unsafe { inner_ptr.as_ref() };
    let header = inner_node.header();

    let matched_prefix_size = header.match_prefix(&key[*current_depth..]);
    if matched_prefix_size != header.prefix_len() {
        if *current_depth + matched_prefix_size == key.len() {
            // The key ran out inside the prefix: it would be a proper prefix
            // of every key below this node.
            return Err(InsertPrefixError(key.into()));
        }

        return Ok(ControlFlow::Break(matched_prefix_size));
    }

    *current_depth += matched_prefix_size;

    if *current_depth == key.len() {
        // The key ran out exactly at an inner node: it is a proper prefix of
        // every key below this node.
        return Err(InsertPrefixError(key.into()));
    }

    Ok(ControlFlow::Continue(
        inner_node.lookup_child(key[*current_depth]),
    ))
}

/// Attach the key tail under `entry_node_ptr` as a chain: the first tail
/// byte selects the entry into the node, intermediate nodes pack up to
/// [`NUM_PREFIX_BYTES`] key bytes each plus one selector byte, and a leaf
/// terminates the chain.
///
/// Returns the new leaf and, if the entry node had to grow to fit the new
/// child, the replacement node that the caller must install in the entry
/// node's former slot.
///
/// # Safety
///
///  - `entry_node_ptr` must reference an inner node allocated from `pools`
///    with no child for `tail[0]`.
///  - This function cannot be called concurrently with any read or write of
///    the tree containing the entry node.
unsafe fn add_leaf_chain<V, A: Allocator>(
    entry_node_ptr: OpaqueNodePtr<V>,
    tail: &[u8],
    value: V,
    pools: &mut NodePools<V, A>,
) -> (NodePtr<LeafNode<V>>, Option<OpaqueNodePtr<V>>) {
    debug_assert!(!tail.is_empty(), "a key tail always has at least one byte");

    let entry_key_byte = tail[0];
    let mut chain_head: Option<OpaqueNodePtr<V>> = None;
    let mut last_chain_node: Option<NodePtr<InnerNode4<V>>> = None;
    let mut remaining = tail;

    while remaining.len() > 1 {
        // One byte enters the previous level and one selects the child
        // below this node, the rest (up to the prefix capacity) is packed
        // into the node prefix.
        let prefix_len = usize::min(remaining.len() - 2, NUM_PREFIX_BYTES);
        let node_ptr = pools.allocate(InnerNode4::from_prefix(&remaining[1..1 + prefix_len]));

        match last_chain_node {
            // SAFETY: The previous chain node is freshly allocated and not
            // yet reachable from the tree.
            Some(prev) => unsafe { prev.as_mut() }.write_child(remaining[0], node_ptr.to_opaque()),
            None => chain_head = Some(node_ptr.to_opaque()),
        }

        last_chain_node = Some(node_ptr);
        remaining = &remaining[prefix_len + 1..];
    }

    let leaf_ptr = pools.allocate(LeafNode::new(value));
    match last_chain_node {
        // SAFETY: Same as the chain-node write above.
        Some(prev) => unsafe { prev.as_mut() }.write_child(remaining[0], leaf_ptr.to_opaque()),
        None => chain_head = Some(leaf_ptr.to_opaque()),
    }

    // PANIC SAFETY: Every path above sets the chain head.
    let chain_head = chain_head.unwrap();
    // SAFETY: Covered by the safety requirements on this function.
    let replacement =
        unsafe { write_child_with_growth(entry_node_ptr, entry_key_byte, chain_head, pools) };

    (leaf_ptr, replacement)
}

/// Install `child` under `key_byte` in the given inner node, growing the
/// node into the next larger class if it is full.
///
/// Returns the replacement node if the node grew; the old node has then
/// already been returned to its pool and the caller must install the
/// replacement in the former slot.
///
/// # Safety
///
///  - `node_ptr` must reference an inner node allocated from `pools` with no
///    child for `key_byte`.
///  - This function cannot be called concurrently with any read or write of
///    the node.
unsafe fn write_child_with_growth<V, A: Allocator>(
    node_ptr: OpaqueNodePtr<V>,
    key_byte: u8,
    child: OpaqueNodePtr<V>,
    pools: &mut NodePools<V, A>,
) -> Option<OpaqueNodePtr<V>> {
    // SAFETY (all arms): Covered by the safety requirements on the
    // containing function.
    match node_ptr.to_node_ptr() {
        ConcreteNodePtr::Node4(inner_ptr) => unsafe {
            write_child_with_growth_inner(inner_ptr, key_byte, child, pools)
        },
        ConcreteNodePtr::Node16(inner_ptr) => unsafe {
            write_child_with_growth_inner(inner_ptr, key_byte, child, pools)
        },
        ConcreteNodePtr::Node48(inner_ptr) => unsafe {
            write_child_with_growth_inner(inner_ptr, key_byte, child, pools)
        },
        ConcreteNodePtr::Node256(inner_ptr) => unsafe {
            write_child_with_growth_inner(inner_ptr, key_byte, child, pools)
        },
        ConcreteNodePtr::LeafNode(_) => {
            unreachable!("a leaf node cannot be the entry point of a chain")
        },
    }
}

unsafe fn write_child_with_growth_inner<V, N, A>(
    inner_ptr: NodePtr<N>,
    key_byte: u8,
    child: OpaqueNodePtr<V>,
    pools: &mut NodePools<V, A>,
) -> Option<OpaqueNodePtr<V>>
where
    N: InnerNode<Value = V> + Pooled<V>,
    N::GrownNode: Pooled<V>,
    A: Allocator,
{
    // SAFETY: The reference is unique for the duration of this function, per
    // the requirements on `write_child_with_growth`.
    let inner_node = unsafe { inner_ptr.as_mut() };

    if !inner_node.is_full() {
        inner_node.write_child(key_byte, child);
        return None;
    }

    let mut grown = inner_node.grow();
    grown.write_child(key_byte, child);
    let grown_ptr = pools.allocate(grown);

    // Do not touch `inner_node` past this point; the node is gone once it is
    // returned to the pool.
    // SAFETY: The pointer came from these pools and the only remaining
    // reference to the node is the parent slot, which the caller overwrites
    // with the replacement before any further tree access.
    drop(unsafe { pools.deallocate(inner_ptr) });

    Some(grown_ptr.to_opaque())
}

/// Install `new_node` in the slot that previously held the node below
/// `parent` at `key_byte`, or return it as the new root if there is no
/// parent.
///
/// # Safety
///
///  - If present, the parent must be an inner node with an existing child
///    for the key byte, and must not be accessed through any other pointer
///    while this function runs.
unsafe fn rewire_parent<V>(
    parent: Option<(OpaqueNodePtr<V>, u8)>,
    new_node: OpaqueNodePtr<V>,
    root: OpaqueNodePtr<V>,
) -> OpaqueNodePtr<V> {
    match parent {
        Some((parent_ptr, key_byte)) => {
            fn overwrite_inner_child<N: InnerNode>(
                parent_ptr: NodePtr<N>,
                key_byte: u8,
                new_node: OpaqueNodePtr<N::Value>,
            ) {
                // SAFETY: The reference is unique for the duration of this
                // call, per the requirements on `rewire_parent`.
                let parent_node = unsafe { parent_ptr.as_mut() };
                parent_node.overwrite_child(key_byte, new_node);
            }

            match parent_ptr.to_node_ptr() {
                ConcreteNodePtr::Node4(inner_ptr) => {
                    overwrite_inner_child(inner_ptr, key_byte, new_node)
                },
                ConcreteNodePtr::Node16(inner_ptr) => {
                    overwrite_inner_child(inner_ptr, key_byte, new_node)
                },
                ConcreteNodePtr::Node48(inner_ptr) => {
                    overwrite_inner_child(inner_ptr, key_byte, new_node)
                },
                ConcreteNodePtr::Node256(inner_ptr) => {
                    overwrite_inner_child(inner_ptr, key_byte, new_node)
                },
                ConcreteNodePtr::LeafNode(_) => {
                    unreachable!("a leaf node cannot be the parent of another node")
                },
            }

            root
        },
        None => new_node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{deallocate_tree, search_unchecked};
    use crate::pool::NodePools;

    fn expect_value<V: PartialEq + std::fmt::Debug>(
        root: OpaqueNodePtr<V>,
        key: &[u8],
        expected: V,
    ) {
        // SAFETY: The tests never mutate the tree while searching.
        let leaf = unsafe { search_unchecked(root, key) }
            .unwrap_or_else(|| panic!("key {key:?} not found"));
        // SAFETY: Shared access only.
        assert_eq!(unsafe { leaf.as_ref() }.value(), &expected);
    }

    #[test]
    fn insert_into_empty_tree_builds_chain() {
        let mut pools = NodePools::new();

        // SAFETY: Single-threaded, tree only reachable through `root`.
        let result =
            unsafe { insert_unchecked(None, &[1, 2, 3, 4], "1234".to_string(), &mut pools) }
                .unwrap();
        assert!(result.inserted);

        let root = result.new_root;
        expect_value(root, &[1, 2, 3, 4], "1234".to_string());
        // SAFETY: No mutation during the search.
        assert!(unsafe { search_unchecked(root, &[1, 2, 3, 5]) }.is_none());

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }

    #[test]
    fn insert_second_key_splits_prefix() {
        let mut pools = NodePools::new();

        // SAFETY (all): Single-threaded, unique tree access.
        let mut root = unsafe {
            insert_unchecked(None, &[1, 2, 3, 4], "1234".to_string(), &mut pools)
                .unwrap()
                .new_root
        };
        root = unsafe {
            insert_unchecked(Some(root), &[1, 2, 5, 6], "1256".to_string(), &mut pools)
                .unwrap()
                .new_root
        };

        expect_value(root, &[1, 2, 3, 4], "1234".to_string());
        expect_value(root, &[1, 2, 5, 6], "1256".to_string());
        // SAFETY: No mutation during the searches.
        unsafe {
            assert!(search_unchecked(root, &[1, 2, 5, 7]).is_none());
            assert!(search_unchecked(root, &[1, 2, 3, 5]).is_none());
        }

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }

    #[test]
    fn insert_duplicate_key_keeps_original_value() {
        let mut pools = NodePools::new();

        // SAFETY (all): Single-threaded, unique tree access.
        let root = unsafe {
            insert_unchecked(None, &[10, 20], -1, &mut pools)
                .unwrap()
                .new_root
        };
        let second = unsafe { insert_unchecked(Some(root), &[10, 20], 99, &mut pools) }.unwrap();

        assert!(!second.inserted);
        assert_eq!(second.new_root, root);
        // SAFETY: Shared access only.
        assert_eq!(unsafe { second.leaf_ptr.as_ref() }.value(), &-1);
        expect_value(root, &[10, 20], -1);

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }

    #[test]
    fn insert_key_longer_than_prefix_capacity_chains_nodes() {
        let mut pools = NodePools::new();
        let long_key: Vec<u8> = (0..=40).collect();
        let other_key: Vec<u8> = (0..=40).map(|byte| if byte == 40 { 99 } else { byte }).collect();

        // SAFETY (all): Single-threaded, unique tree access.
        let mut root = unsafe {
            insert_unchecked(None, &long_key, 0, &mut pools)
                .unwrap()
                .new_root
        };
        root = unsafe {
            insert_unchecked(Some(root), &other_key, 1, &mut pools)
                .unwrap()
                .new_root
        };

        expect_value(root, &long_key, 0);
        expect_value(root, &other_key, 1);
        // More than one intermediate node is needed for 40 tail bytes.
        assert!(pools.live() > 6);

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }

    #[test]
    fn insert_splits_inside_deep_prefix_then_earlier() {
        let mut pools = NodePools::new();
        // First two keys diverge inside a compressed prefix, the third
        // diverges earlier than the previous split point.
        let keys: [&[u8]; 3] = [
            &[1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 255],
            &[1, 1, 1, 1, 1, 1, 1, 1, 1, 255, 0, 0],
            &[1, 1, 255, 0],
        ];

        let mut root = None;
        for (index, key) in keys.iter().enumerate() {
            // SAFETY: Single-threaded, unique tree access.
            root = Some(
                unsafe { insert_unchecked(root, key, index, &mut pools) }
                    .unwrap()
                    .new_root,
            );
        }

        let root = root.unwrap();
        for (index, key) in keys.iter().enumerate() {
            expect_value(root, key, index);
        }

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }

    #[test]
    fn insert_fails_when_new_key_is_prefix_of_existing() {
        let mut pools = NodePools::new();

        // SAFETY (all): Single-threaded, unique tree access.
        let root = unsafe {
            insert_unchecked(None, &[5, 6, 7, 8, 9, 10], 0, &mut pools)
                .unwrap()
                .new_root
        };
        let result = unsafe { insert_unchecked(Some(root), &[5, 6, 7, 8], 1, &mut pools) };

        assert_eq!(
            result.unwrap_err(),
            InsertPrefixError(Box::from(&[5, 6, 7, 8][..]))
        );
        expect_value(root, &[5, 6, 7, 8, 9, 10], 0);

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }

    #[test]
    fn insert_fails_when_existing_key_is_prefix_of_new() {
        let mut pools = NodePools::new();

        // SAFETY (all): Single-threaded, unique tree access.
        let root = unsafe {
            insert_unchecked(None, &[5, 6, 7, 8], 0, &mut pools)
                .unwrap()
                .new_root
        };
        let result =
            unsafe { insert_unchecked(Some(root), &[5, 6, 7, 8, 9, 10], 1, &mut pools) };

        assert_eq!(
            result.unwrap_err(),
            InsertPrefixError(Box::from(&[5, 6, 7, 8, 9, 10][..]))
        );

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }

    #[test]
    fn insert_grows_node_through_every_class() {
        let mut pools = NodePools::new();

        let mut root = None;
        // All keys share the first three bytes, so a single deep node climbs
        // through N4 -> N16 -> N48 -> N256.
        for byte in 0..=255u8 {
            // SAFETY: Single-threaded, unique tree access.
            root = Some(
                unsafe { insert_unchecked(root, &[0, 0, 0, byte], u32::from(byte), &mut pools) }
                    .unwrap()
                    .new_root,
            );
        }

        let root = root.unwrap();
        for byte in 0..=255u8 {
            expect_value(root, &[0, 0, 0, byte], u32::from(byte));
        }

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
        assert_eq!(pools.live(), 0);
    }
}
