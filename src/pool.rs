//! Per-node-class slab pools.
//!
//! Every node class has a fixed size, so each class gets its own
//! [`NodePool`]: blocks of contiguous slots carved from the backing
//! allocator, with freed slots threaded onto a block-local free list. Alloc
//! and free are O(1). A block whose population drops to zero is returned to
//! the backing allocator, except that one partially-free block is always
//! retained so that alternating alloc/free traffic does not thrash the
//! allocator.

use crate::nodes::{InnerNode16, InnerNode256, InnerNode4, InnerNode48, LeafNode, Node, NodePtr};
use allocator_api2::alloc::{Allocator, Global};
use std::{
    alloc::{handle_alloc_error, Layout},
    marker::PhantomData,
    mem::MaybeUninit,
    ptr::{self, NonNull},
};

/// Number of slots per block for the small node classes.
const SMALL_NODE_BLOCK_CAPACITY: usize = 1024;
/// Number of slots per block for 48-entry nodes.
const NODE48_BLOCK_CAPACITY: usize = 512;
/// Number of slots per block for 256-entry nodes.
const NODE256_BLOCK_CAPACITY: usize = 256;

/// Header at the start of every block, linking the block into one of the
/// pool's two lists.
#[repr(C)]
struct BlockHeader {
    /// Number of slots currently handed out from this block.
    used: usize,
    /// Head of the block-local list of free slots.
    first_free: Option<NonNull<FreeSlot>>,
    prev: Option<NonNull<BlockHeader>>,
    next: Option<NonNull<BlockHeader>>,
}

/// The view of a slot while it is on the free list: the payload storage is
/// reused to hold the list link.
#[repr(C)]
struct FreeSlot {
    next_free: Option<NonNull<FreeSlot>>,
}

/// The view of a slot while it is handed out.
///
/// The block back-pointer makes every slot at least pointer-sized, so the
/// [`FreeSlot`] link always fits into the slot storage while it is free.
#[repr(C)]
struct Slot<T> {
    /// The live payload. Placed first so that a pointer to the slot is a
    /// pointer to the item.
    item: MaybeUninit<T>,
    /// The block this slot was carved from, written when the slot is handed
    /// out so that `deallocate` can find the owning block in O(1).
    block: MaybeUninit<NonNull<BlockHeader>>,
}

/// A fixed-size object pool for one node class.
///
/// Items never move while live: a pointer returned by [`NodePool::allocate`]
/// stays valid until it is passed to [`NodePool::deallocate`].
pub(crate) struct NodePool<T, A: Allocator = Global> {
    /// Blocks with at least one free slot.
    partial_head: Option<NonNull<BlockHeader>>,
    /// Blocks with every slot handed out.
    full_head: Option<NonNull<BlockHeader>>,
    /// Number of slots per block.
    block_capacity: usize,
    /// Number of live items across all blocks.
    live: usize,
    alloc: A,
    _marker: PhantomData<T>,
}

impl<T, A: Allocator> NodePool<T, A> {
    /// Create an empty pool that carves blocks of `block_capacity` slots out
    /// of the given allocator.
    ///
    /// No memory is allocated until the first [`NodePool::allocate`] call.
    pub(crate) fn with_block_capacity_in(block_capacity: usize, alloc: A) -> Self {
        assert!(block_capacity > 0, "block capacity must be non-zero");

        NodePool {
            partial_head: None,
            full_head: None,
            block_capacity,
            live: 0,
            alloc,
            _marker: PhantomData,
        }
    }

    /// Number of live items in this pool.
    pub(crate) fn live(&self) -> usize {
        self.live
    }

    /// Layout of one block, and the offset of the slot array within it.
    fn block_layout(block_capacity: usize) -> (Layout, usize) {
        let header = Layout::new::<BlockHeader>();
        // PANIC SAFETY: Block capacities are small constants, far below the
        // sizes at which layout arithmetic overflows.
        let slots = Layout::array::<Slot<T>>(block_capacity).unwrap();
        let (layout, offset) = header.extend(slots).unwrap();
        (layout.pad_to_align(), offset)
    }

    /// Move an item into the pool and return a stable pointer to it.
    ///
    /// The returned pointer is aligned to `align_of::<T>()`. Aborts the
    /// process if the backing allocator fails.
    pub(crate) fn allocate(&mut self, item: T) -> NonNull<T> {
        let block_ptr = match self.partial_head {
            Some(block_ptr) => block_ptr,
            None => self.allocate_block(),
        };

        // SAFETY: Blocks on the partial list always have a non-empty free
        // list; block pointers reference live blocks owned by this pool.
        unsafe {
            let block = block_ptr.as_ptr();
            // PANIC SAFETY: Covered by the partial-list invariant above.
            let free = (*block).first_free.unwrap();
            (*block).first_free = (*free.as_ptr()).next_free;

            let slot: NonNull<Slot<T>> = free.cast();
            ptr::addr_of_mut!((*slot.as_ptr()).item).cast::<T>().write(item);
            ptr::addr_of_mut!((*slot.as_ptr()).block)
                .cast::<NonNull<BlockHeader>>()
                .write(block_ptr);

            (*block).used += 1;
            self.live += 1;

            if (*block).first_free.is_none() {
                // The block is exhausted, move it to the full list.
                unlink(&mut self.partial_head, block_ptr);
                push_front(&mut self.full_head, block_ptr);
            }

            // The item is the first field of the `repr(C)` slot.
            slot.cast::<T>()
        }
    }

    /// Return an item to the pool, handing its value back to the caller.
    ///
    /// # Safety
    ///
    ///  - `ptr` must have been returned by [`NodePool::allocate`] on this
    ///    pool and not deallocated since.
    pub(crate) unsafe fn deallocate(&mut self, ptr: NonNull<T>) -> T {
        // SAFETY: By the requirements on this function, `ptr` references the
        // initialized payload of a live slot in one of this pool's blocks.
        unsafe {
            let slot: NonNull<Slot<T>> = ptr.cast();
            let item = ptr.as_ptr().read();
            let block_ptr = (*slot.as_ptr()).block.assume_init();
            let block = block_ptr.as_ptr();

            let was_full = (*block).first_free.is_none();

            let free: NonNull<FreeSlot> = slot.cast();
            free.as_ptr().write(FreeSlot {
                next_free: (*block).first_free,
            });
            (*block).first_free = Some(free);
            (*block).used -= 1;
            self.live -= 1;

            if was_full {
                unlink(&mut self.full_head, block_ptr);
                push_front(&mut self.partial_head, block_ptr);
            }

            // Release a fully empty block, unless it is the only
            // partially-free block left to serve future allocations.
            let is_sole_partial =
                self.partial_head == Some(block_ptr) && (*block).next.is_none();
            if (*block).used == 0 && !is_sole_partial {
                unlink(&mut self.partial_head, block_ptr);
                self.release_block(block_ptr);
            }

            item
        }
    }

    /// Allocate a fresh block, thread all of its slots onto the free list,
    /// and push it onto the partial list.
    fn allocate_block(&mut self) -> NonNull<BlockHeader> {
        let (layout, slots_offset) = Self::block_layout(self.block_capacity);
        let raw = match self.alloc.allocate(layout) {
            Ok(ptr) => ptr.cast::<u8>(),
            Err(_) => handle_alloc_error(layout),
        };

        // SAFETY: The allocation is valid for `layout`, which covers the
        // header and the whole slot array.
        unsafe {
            let block_ptr = raw.cast::<BlockHeader>();
            block_ptr.as_ptr().write(BlockHeader {
                used: 0,
                first_free: None,
                prev: None,
                next: None,
            });

            let slots = raw.as_ptr().add(slots_offset).cast::<Slot<T>>();
            for index in 0..self.block_capacity {
                let free = NonNull::new_unchecked(slots.add(index).cast::<FreeSlot>());
                free.as_ptr().write(FreeSlot {
                    next_free: (*block_ptr.as_ptr()).first_free,
                });
                (*block_ptr.as_ptr()).first_free = Some(free);
            }

            push_front(&mut self.partial_head, block_ptr);
            block_ptr
        }
    }

    /// Return a block's memory to the backing allocator.
    ///
    /// # Safety
    ///
    ///  - The block must have been produced by `allocate_block` on this pool
    ///    and already be unlinked from both block lists.
    unsafe fn release_block(&mut self, block_ptr: NonNull<BlockHeader>) {
        let (layout, _) = Self::block_layout(self.block_capacity);
        // SAFETY: The block was allocated with exactly this layout.
        unsafe { self.alloc.deallocate(block_ptr.cast::<u8>(), layout) };
    }

    #[cfg(test)]
    fn block_count(&self) -> usize {
        fn list_len(mut head: Option<NonNull<BlockHeader>>) -> usize {
            let mut count = 0;
            while let Some(block) = head {
                count += 1;
                // SAFETY: List nodes are live blocks owned by the pool.
                head = unsafe { (*block.as_ptr()).next };
            }
            count
        }

        list_len(self.partial_head) + list_len(self.full_head)
    }
}

impl<T, A: Allocator> Drop for NodePool<T, A> {
    fn drop(&mut self) {
        debug_assert_eq!(
            self.live, 0,
            "pool dropped while items are still live; their values will not be dropped"
        );

        let mut heads = [self.partial_head.take(), self.full_head.take()];
        for head in &mut heads {
            while let Some(block_ptr) = *head {
                // SAFETY: List nodes are live blocks owned by this pool; each
                // is released exactly once since it is unlinked first.
                unsafe {
                    *head = (*block_ptr.as_ptr()).next;
                    self.release_block(block_ptr);
                }
            }
        }
    }
}

/// Unlink a block from the list rooted at `head`.
///
/// # Safety
///
///  - `block_ptr` must be an element of the list rooted at `head`.
unsafe fn unlink(head: &mut Option<NonNull<BlockHeader>>, mut block_ptr: NonNull<BlockHeader>) {
    // SAFETY: All pointers involved reference live blocks of the same pool.
    unsafe {
        let block = block_ptr.as_mut();
        match block.prev {
            Some(mut prev) => prev.as_mut().next = block.next,
            None => *head = block.next,
        }
        if let Some(mut next) = block.next {
            next.as_mut().prev = block.prev;
        }
        block.prev = None;
        block.next = None;
    }
}

/// Push a detached block onto the front of the list rooted at `head`.
///
/// # Safety
///
///  - `block_ptr` must reference a live block that is not currently a member
///    of any list.
unsafe fn push_front(head: &mut Option<NonNull<BlockHeader>>, mut block_ptr: NonNull<BlockHeader>) {
    // SAFETY: All pointers involved reference live blocks of the same pool.
    unsafe {
        let block = block_ptr.as_mut();
        block.prev = None;
        block.next = *head;
        if let Some(mut old_head) = *head {
            old_head.as_mut().prev = Some(block_ptr);
        }
        *head = Some(block_ptr);
    }
}

/// The bundle of per-class pools backing one tree.
pub(crate) struct NodePools<V, A: Allocator = Global> {
    leaf: NodePool<LeafNode<V>, A>,
    node4: NodePool<InnerNode4<V>, A>,
    node16: NodePool<InnerNode16<V>, A>,
    node48: NodePool<InnerNode48<V>, A>,
    node256: NodePool<InnerNode256<V>, A>,
}

impl<V> NodePools<V> {
    /// Create a pool bundle backed by the global allocator.
    pub(crate) fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<V, A: Allocator + Clone> NodePools<V, A> {
    /// Create a pool bundle backed by the given allocator.
    pub(crate) fn new_in(alloc: A) -> Self {
        NodePools {
            leaf: NodePool::with_block_capacity_in(SMALL_NODE_BLOCK_CAPACITY, alloc.clone()),
            node4: NodePool::with_block_capacity_in(SMALL_NODE_BLOCK_CAPACITY, alloc.clone()),
            node16: NodePool::with_block_capacity_in(SMALL_NODE_BLOCK_CAPACITY, alloc.clone()),
            node48: NodePool::with_block_capacity_in(NODE48_BLOCK_CAPACITY, alloc.clone()),
            node256: NodePool::with_block_capacity_in(NODE256_BLOCK_CAPACITY, alloc),
        }
    }
}

impl<V, A: Allocator> NodePools<V, A> {
    /// Move a node into its class pool and return a typed pointer to it.
    pub(crate) fn allocate<N: Pooled<V>>(&mut self, node: N) -> NodePtr<N> {
        let ptr = N::pool_mut(self).allocate(node);
        // SAFETY: The pool returns a valid, aligned, initialized pointer.
        unsafe { NodePtr::new(ptr.as_ptr()) }
    }

    /// Return a node to its class pool, handing its value back.
    ///
    /// # Safety
    ///
    ///  - `ptr` must have been returned by [`NodePools::allocate`] on this
    ///    bundle and not deallocated since.
    ///  - No other pointer to the node may be dereferenced afterwards.
    pub(crate) unsafe fn deallocate<N: Pooled<V>>(&mut self, ptr: NodePtr<N>) -> N {
        // SAFETY: Covered by the requirements on this function.
        unsafe { N::pool_mut(self).deallocate(ptr.to_nonnull()) }
    }

    /// Number of live nodes across all classes.
    pub(crate) fn live(&self) -> usize {
        self.leaf.live()
            + self.node4.live()
            + self.node16.live()
            + self.node48.live()
            + self.node256.live()
    }
}

/// Selects the pool of a node's class out of a [`NodePools`] bundle.
pub(crate) trait Pooled<V>: Node<Value = V> {
    /// Access the pool that allocates this node type.
    fn pool_mut<A: Allocator>(pools: &mut NodePools<V, A>) -> &mut NodePool<Self, A>;
}

macro_rules! impl_pooled {
    ($($node:ident => $field:ident),* $(,)?) => {
        $(
            impl<V> Pooled<V> for $node<V> {
                fn pool_mut<A: Allocator>(pools: &mut NodePools<V, A>) -> &mut NodePool<Self, A> {
                    &mut pools.$field
                }
            }
        )*
    };
}

impl_pooled!(
    LeafNode => leaf,
    InnerNode4 => node4,
    InnerNode16 => node16,
    InnerNode48 => node48,
    InnerNode256 => node256,
);
