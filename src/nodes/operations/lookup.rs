use crate::nodes::{ConcreteNodePtr, InnerNode, LeafNode, NodePtr, OpaqueNodePtr};

/// Search the given tree for the leaf stored under the given key.
///
/// # Safety
///
///  - This function cannot be called concurrently with any mutating operation
///    on `root` or any child node of `root`. This function will arbitrarily
///    read from any node in the given tree.
pub(crate) unsafe fn search_unchecked<V>(
    root: OpaqueNodePtr<V>,
    key: &[u8],
) -> Option<NodePtr<LeafNode<V>>> {
    debug_assert!(!key.is_empty(), "key must not be empty");

    let mut current_node = root;
    let mut current_depth = 0;

    loop {
        // SAFETY (all inner arms): Covered by the safety requirements on the
        // containing function.
        current_node = match current_node.to_node_ptr() {
            ConcreteNodePtr::Node4(inner_ptr) => unsafe {
                check_prefix_lookup_child(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::Node16(inner_ptr) => unsafe {
                check_prefix_lookup_child(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::Node48(inner_ptr) => unsafe {
                check_prefix_lookup_child(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::Node256(inner_ptr) => unsafe {
                check_prefix_lookup_child(inner_ptr, key, &mut current_depth)
            },
            ConcreteNodePtr::LeafNode(leaf_node_ptr) => {
                // Every byte on the path was matched explicitly, so reaching
                // a leaf with the key exactly used up is a full match. Spare
                // key bytes mean the key is not present.
                return if current_depth == key.len() {
                    Some(leaf_node_ptr)
                } else {
                    None
                };
            },
        }?;
    }
}

/// For the given inner node, match the node prefix against the key at the
/// current depth, then look up the child for the next key byte.
///
/// Returns `None` if the prefix does not match, if the key is exhausted at
/// this node, or if there is no child for the next byte.
///
/// # Safety
///
///  - No mutation of the node referenced by `inner_ptr` may happen while this
///    function runs.
unsafe fn check_prefix_lookup_child<V, N>(
    inner_ptr: NodePtr<N>,
    key: &[u8],
    current_depth: &mut usize,
) -> Option<OpaqueNodePtr<V>>
where
    N: InnerNode<Value = V>,
{
    // SAFETY: The reference is bounded to this function and the node is not
    // mutated during it, per the requirements on this function.
    let inner_node = unsafe { inner_ptr.as_ref() };
    let header = inner_node.header();

    let prefix = header.read_prefix();
    if !prefix.is_empty() {
        let remaining_key = &key[*current_depth..];
        if prefix.len() > remaining_key.len() || &remaining_key[..prefix.len()] != prefix {
            return None;
        }

        *current_depth += prefix.len();
    }

    if *current_depth == key.len() {
        // The key ran out at an inner node. Keys end at leaves (no key is a
        // prefix of another), so this key is not present.
        return None;
    }

    let child = inner_node.lookup_child(key[*current_depth]);
    if child.is_some() {
        *current_depth += 1;
    }

    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{deallocate_tree, insert_unchecked};
    use crate::pool::NodePools;

    fn build_tree<V>(
        pools: &mut NodePools<V>,
        entries: &[(&[u8], V)],
    ) -> OpaqueNodePtr<V>
    where
        V: Clone,
    {
        let mut root = None;
        for (key, value) in entries {
            // SAFETY: The tree is only touched through `root` and `pools` in
            // this single-threaded test.
            let result =
                unsafe { insert_unchecked(root, key, value.clone(), pools).unwrap() };
            root = Some(result.new_root);
        }
        root.unwrap()
    }

    #[test]
    fn search_finds_all_inserted_keys() {
        let mut pools = NodePools::new();
        let entries: &[(&[u8], i32)] = &[
            (&[1, 2, 3, 4], 0),
            (&[1, 2, 5, 6], 1),
            (&[1, 2, 5, 7], 2),
            (&[200, 0, 0, 0], 3),
        ];
        let root = build_tree(&mut pools, entries);

        for (key, value) in entries {
            // SAFETY: No mutation happens during the search.
            let leaf = unsafe { search_unchecked(root, key) }.unwrap();
            // SAFETY: Shared access only.
            assert_eq!(unsafe { leaf.as_ref() }.value(), value);
        }

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
    }

    #[test]
    fn search_misses_return_none() {
        let mut pools = NodePools::new();
        let entries: &[(&[u8], i32)] = &[(&[1, 2, 3, 4], 0), (&[1, 2, 5, 6], 1)];
        let root = build_tree(&mut pools, entries);

        // SAFETY (all): No mutation happens during the searches.
        unsafe {
            // Diverges inside a compressed prefix.
            assert!(search_unchecked(root, &[1, 9, 3, 4]).is_none());
            // Runs out of key bytes at an inner node.
            assert!(search_unchecked(root, &[1, 2]).is_none());
            // Key longer than any stored path.
            assert!(search_unchecked(root, &[1, 2, 3, 4, 5]).is_none());
            // Missing child byte.
            assert!(search_unchecked(root, &[1, 2, 6, 6]).is_none());
            // Diverges at the root.
            assert!(search_unchecked(root, &[9, 9, 9, 9]).is_none());
        }

        // SAFETY: Called once, covering the whole tree.
        unsafe { deallocate_tree(root, &mut pools) };
    }
}
