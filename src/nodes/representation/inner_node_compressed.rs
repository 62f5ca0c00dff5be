use super::{Header, InnerNode, InnerNode48, Node, NodeType, OpaqueNodePtr, RestrictedNodeIndex};
use crate::rust_nightly_apis::{maybe_uninit_slice_assume_init_ref, maybe_uninit_uninit_array};
use std::{fmt, mem::MaybeUninit};

/// Node type with a compact representation: parallel arrays of key bytes and
/// child pointers, searched linearly.
///
/// Children are stored in insertion order; the key array is not sorted.
#[repr(C, align(16))]
pub struct InnerNodeCompressed<V, const SIZE: usize> {
    /// The common node fields.
    pub header: Header,
    /// The key byte that selects the child stored at the same index in
    /// `child_pointers`.
    ///
    /// Only the first `header.num_children()` values are initialized.
    pub keys: [MaybeUninit<u8>; SIZE],
    /// The children of this node.
    ///
    /// Only the first `header.num_children()` values are initialized.
    pub child_pointers: [MaybeUninit<OpaqueNodePtr<V>>; SIZE],
}

/// Node with capacity for 4 children.
pub type InnerNode4<V> = InnerNodeCompressed<V, 4>;

/// Node with capacity for 16 children.
pub type InnerNode16<V> = InnerNodeCompressed<V, 16>;

impl<V, const SIZE: usize> Copy for InnerNodeCompressed<V, SIZE> {}

impl<V, const SIZE: usize> Clone for InnerNodeCompressed<V, SIZE> {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            keys: self.keys,
            child_pointers: self.child_pointers,
        }
    }
}

impl<V, const SIZE: usize> fmt::Debug for InnerNodeCompressed<V, SIZE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (keys, child_pointers) = self.initialized_portion();
        f.debug_struct("InnerNodeCompressed")
            .field("SIZE", &SIZE)
            .field("header", &self.header)
            .field("keys", &keys)
            .field("child_pointers", &child_pointers)
            .finish()
    }
}

impl<V, const SIZE: usize> InnerNodeCompressed<V, SIZE> {
    /// Create an empty node.
    pub fn empty() -> Self {
        Self::from_header(Header::empty())
    }

    /// Create an empty node whose header holds the given prefix bytes.
    pub fn from_prefix(prefix: &[u8]) -> Self {
        Self::from_header(Header::with_prefix(prefix))
    }

    /// Create an empty node with the given header.
    pub fn from_header(header: Header) -> Self {
        InnerNodeCompressed {
            header,
            keys: maybe_uninit_uninit_array(),
            child_pointers: maybe_uninit_uninit_array(),
        }
    }

    /// Return the initialized portions of the key and child pointer arrays.
    pub fn initialized_portion(&self) -> (&[u8], &[OpaqueNodePtr<V>]) {
        let num_children = self.header.num_children();
        // SAFETY: The array prefixes of length `header.num_children()` are
        // kept initialized by every child-writing operation.
        unsafe {
            (
                maybe_uninit_slice_assume_init_ref(&self.keys[..num_children]),
                maybe_uninit_slice_assume_init_ref(&self.child_pointers[..num_children]),
            )
        }
    }

    fn lookup_child_index(&self, key_fragment: u8) -> Option<usize> {
        let (keys, _) = self.initialized_portion();

        keys.iter().position(|key| *key == key_fragment)
    }

    fn lookup_child_inner(&self, key_fragment: u8) -> Option<OpaqueNodePtr<V>> {
        let child_index = self.lookup_child_index(key_fragment)?;
        let (_, child_pointers) = self.initialized_portion();
        Some(child_pointers[child_index])
    }

    fn write_child_inner(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        let child_index = self.header.num_children();
        assert!(child_index < SIZE, "cannot write a child into a full node");
        debug_assert!(
            self.lookup_child_index(key_fragment).is_none(),
            "key fragment [{key_fragment}] is already present in this node"
        );

        self.keys[child_index].write(key_fragment);
        self.child_pointers[child_index].write(child_pointer);
        self.header.inc_num_children();
    }

    fn overwrite_child_inner(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        // PANIC SAFETY: `overwrite_child` is only called for key bytes that
        // already have a child, per its contract.
        let child_index = self.lookup_child_index(key_fragment).unwrap();
        self.child_pointers[child_index].write(child_pointer);
    }

    fn iter_inner(&self) -> impl Iterator<Item = (u8, OpaqueNodePtr<V>)> + '_ {
        let (keys, child_pointers) = self.initialized_portion();

        keys.iter().copied().zip(child_pointers.iter().copied())
    }
}

impl<V> Node for InnerNode4<V> {
    const TYPE: NodeType = NodeType::Node4;

    type Value = V;
}

impl<V> InnerNode for InnerNode4<V> {
    type GrownNode = InnerNode16<V>;

    fn header(&self) -> &Header {
        &self.header
    }

    fn lookup_child(&self, key_fragment: u8) -> Option<OpaqueNodePtr<V>> {
        self.lookup_child_inner(key_fragment)
    }

    fn write_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        self.write_child_inner(key_fragment, child_pointer)
    }

    fn overwrite_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        self.overwrite_child_inner(key_fragment, child_pointer)
    }

    fn grow(&self) -> Self::GrownNode {
        let mut grown = InnerNode16::from_header(self.header);
        let num_children = self.header.num_children();

        grown.keys[..num_children].copy_from_slice(&self.keys[..num_children]);
        grown.child_pointers[..num_children]
            .copy_from_slice(&self.child_pointers[..num_children]);

        grown
    }

    fn iter(&self) -> impl Iterator<Item = (u8, OpaqueNodePtr<V>)> + '_ {
        self.iter_inner()
    }
}

impl<V> Node for InnerNode16<V> {
    const TYPE: NodeType = NodeType::Node16;

    type Value = V;
}

impl<V> InnerNode for InnerNode16<V> {
    type GrownNode = InnerNode48<V>;

    fn header(&self) -> &Header {
        &self.header
    }

    fn lookup_child(&self, key_fragment: u8) -> Option<OpaqueNodePtr<V>> {
        self.lookup_child_inner(key_fragment)
    }

    fn write_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        self.write_child_inner(key_fragment, child_pointer)
    }

    fn overwrite_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        self.overwrite_child_inner(key_fragment, child_pointer)
    }

    fn grow(&self) -> Self::GrownNode {
        let mut grown = InnerNode48::from_header(self.header);
        let (keys, child_pointers) = self.initialized_portion();

        for (index, key) in keys.iter().copied().enumerate() {
            // PANIC SAFETY: `index` is at most 15 because of the length of
            // the key array, well within the 48-slot index range.
            grown.child_indices[usize::from(key)] =
                RestrictedNodeIndex::try_from(index).unwrap();
        }
        grown.child_pointers[..child_pointers.len()]
            .copy_from_slice(&self.child_pointers[..child_pointers.len()]);

        grown
    }

    fn iter(&self) -> impl Iterator<Item = (u8, OpaqueNodePtr<V>)> + '_ {
        self.iter_inner()
    }
}
