//! Trie node lookup and manipulation.

use crate::nodes::{ConcreteNodePtr, InnerNode, NodePtr, OpaqueNodePtr};
use crate::pool::{NodePools, Pooled};
use allocator_api2::alloc::Allocator;

mod insert;
pub(crate) use insert::*;
pub use insert::InsertPrefixError;

mod lookup;
pub(crate) use lookup::*;

/// Return the given node and every node below it to the pools.
///
/// Leaf nodes are read out of their pool slots, which drops the values they
/// carry.
///
/// # Safety
///
///  - This function must only be called once for this root node and all its
///    descendants, otherwise a double-free could result.
///  - Every node in the tree must have been allocated from `pools`.
///  - No other operation on the tree may run concurrently.
pub(crate) unsafe fn deallocate_tree<V, A: Allocator>(
    root: OpaqueNodePtr<V>,
    pools: &mut NodePools<V, A>,
) {
    fn deallocate_inner_node<V, N, A>(
        stack: &mut Vec<OpaqueNodePtr<V>>,
        inner_ptr: NodePtr<N>,
        pools: &mut NodePools<V, A>,
    ) where
        N: InnerNode<Value = V> + Pooled<V>,
        A: Allocator,
    {
        {
            // SAFETY: The scope of this reference is bounded to this block
            // and the node is not deallocated until the block ends. No other
            // access can happen per the requirements on `deallocate_tree`.
            let inner_node = unsafe { inner_ptr.as_ref() };
            stack.extend(inner_node.iter().map(|(_, child)| child));
        }

        // SAFETY: The single-call requirement on `deallocate_tree` ensures
        // this node is freed exactly once.
        drop(unsafe { pools.deallocate(inner_ptr) });
    }

    let mut stack = Vec::new();

    stack.push(root);

    while let Some(next_node_ptr) = stack.pop() {
        match next_node_ptr.to_node_ptr() {
            ConcreteNodePtr::Node4(inner_ptr) => {
                deallocate_inner_node(&mut stack, inner_ptr, pools)
            },
            ConcreteNodePtr::Node16(inner_ptr) => {
                deallocate_inner_node(&mut stack, inner_ptr, pools)
            },
            ConcreteNodePtr::Node48(inner_ptr) => {
                deallocate_inner_node(&mut stack, inner_ptr, pools)
            },
            ConcreteNodePtr::Node256(inner_ptr) => {
                deallocate_inner_node(&mut stack, inner_ptr, pools)
            },
            ConcreteNodePtr::LeafNode(leaf_ptr) => {
                // SAFETY: The single-call requirement on `deallocate_tree`
                // ensures this node is freed exactly once.
                drop(unsafe { pools.deallocate(leaf_ptr) });
            },
        }
    }
}
