use super::{Header, InnerNode, InnerNode256, Node, NodeType, OpaqueNodePtr};
use crate::rust_nightly_apis::{maybe_uninit_slice_assume_init_ref, maybe_uninit_uninit_array};
use std::{error::Error, fmt, mem::MaybeUninit};

/// A child slot index restricted to the values `0..LIMIT`, with one sentinel
/// value meaning "no child".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RestrictedNodeIndex<const LIMIT: u8>(u8);

impl<const LIMIT: u8> RestrictedNodeIndex<LIMIT> {
    /// The placeholder index value indicating that no child is present.
    pub const EMPTY: Self = RestrictedNodeIndex(LIMIT);
}

impl<const LIMIT: u8> From<RestrictedNodeIndex<LIMIT>> for usize {
    fn from(src: RestrictedNodeIndex<LIMIT>) -> Self {
        usize::from(src.0)
    }
}

impl<const LIMIT: u8> TryFrom<usize> for RestrictedNodeIndex<LIMIT> {
    type Error = TryFromByteError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if value < usize::from(LIMIT) {
            Ok(RestrictedNodeIndex(value as u8))
        } else {
            Err(TryFromByteError(LIMIT, value))
        }
    }
}

/// The error returned when attempting to construct an index outside the
/// accepted range of a [`RestrictedNodeIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryFromByteError(u8, usize);

impl fmt::Display for TryFromByteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Input value [{}] is greater than the allowed maximum [{}] for RestrictedNodeIndex.",
            self.1, self.0
        )
    }
}

impl Error for TryFromByteError {}

/// Node with capacity for 48 children, indexed in two steps: a 256-entry map
/// from key byte to slot index, and a dense array of child slots.
#[repr(C, align(16))]
pub struct InnerNode48<V> {
    /// The common node fields.
    pub header: Header,
    /// An array that maps a key byte (as the index) to an index in the
    /// `child_pointers` array, or [`RestrictedNodeIndex::EMPTY`].
    pub child_indices: [RestrictedNodeIndex<48>; 256],
    /// The children of this node.
    ///
    /// An element is initialized if some entry of `child_indices` points to
    /// it; slots are handed out in increasing order, so the first
    /// `header.num_children()` elements are the initialized ones.
    pub child_pointers: [MaybeUninit<OpaqueNodePtr<V>>; 48],
}

impl<V> Copy for InnerNode48<V> {}

impl<V> Clone for InnerNode48<V> {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            child_indices: self.child_indices,
            child_pointers: self.child_pointers,
        }
    }
}

impl<V> fmt::Debug for InnerNode48<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InnerNode48")
            .field("header", &self.header)
            .field("child_indices", &&self.child_indices[..])
            .field("child_pointers", &self.initialized_child_pointers())
            .finish()
    }
}

impl<V> InnerNode48<V> {
    /// Create an empty node.
    pub fn empty() -> Self {
        Self::from_header(Header::empty())
    }

    /// Create an empty node with the given header.
    pub fn from_header(header: Header) -> Self {
        InnerNode48 {
            header,
            child_indices: [RestrictedNodeIndex::<48>::EMPTY; 256],
            child_pointers: maybe_uninit_uninit_array(),
        }
    }

    /// Return the initialized portion of the child pointer array.
    pub fn initialized_child_pointers(&self) -> &[OpaqueNodePtr<V>] {
        // SAFETY: Slots are assigned sequentially from zero, so the array
        // prefix of length `header.num_children()` is initialized.
        unsafe {
            maybe_uninit_slice_assume_init_ref(&self.child_pointers[..self.header.num_children()])
        }
    }
}

impl<V> Node for InnerNode48<V> {
    const TYPE: NodeType = NodeType::Node48;

    type Value = V;
}

impl<V> InnerNode for InnerNode48<V> {
    type GrownNode = InnerNode256<V>;

    fn header(&self) -> &Header {
        &self.header
    }

    fn lookup_child(&self, key_fragment: u8) -> Option<OpaqueNodePtr<V>> {
        let index = self.child_indices[usize::from(key_fragment)];
        if index == RestrictedNodeIndex::<48>::EMPTY {
            return None;
        }

        Some(self.initialized_child_pointers()[usize::from(index)])
    }

    fn write_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        debug_assert_eq!(
            self.child_indices[usize::from(key_fragment)],
            RestrictedNodeIndex::<48>::EMPTY,
            "key fragment [{key_fragment}] is already present in this node"
        );

        let child_index = self.header.num_children();
        // PANIC SAFETY: This panics exactly when the node is full, per the
        // `write_child` contract.
        self.child_indices[usize::from(key_fragment)] =
            RestrictedNodeIndex::<48>::try_from(child_index)
                .expect("cannot write a child into a full node");
        self.child_pointers[child_index].write(child_pointer);
        self.header.inc_num_children();
    }

    fn overwrite_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        let index = self.child_indices[usize::from(key_fragment)];
        if index == RestrictedNodeIndex::<48>::EMPTY {
            panic!("key fragment [{key_fragment}] has no child in this node");
        }
        self.child_pointers[usize::from(index)] = MaybeUninit::new(child_pointer);
    }

    fn grow(&self) -> Self::GrownNode {
        let mut grown = InnerNode256::from_header(self.header);
        let child_pointers = self.initialized_child_pointers();

        for (key_fragment, index) in self.child_indices.iter().enumerate() {
            if *index == RestrictedNodeIndex::<48>::EMPTY {
                continue;
            }

            grown.child_pointers[key_fragment] = Some(child_pointers[usize::from(*index)]);
        }

        grown
    }

    fn iter(&self) -> impl Iterator<Item = (u8, OpaqueNodePtr<V>)> + '_ {
        let child_pointers = self.initialized_child_pointers();

        self.child_indices
            .iter()
            .enumerate()
            .filter(|(_, index)| **index != RestrictedNodeIndex::<48>::EMPTY)
            .map(move |(key_fragment, index)| {
                (
                    // PANIC SAFETY: The `child_indices` array has 256
                    // entries, so `key_fragment` always fits in a `u8`.
                    u8::try_from(key_fragment).unwrap(),
                    child_pointers[usize::from(*index)],
                )
            })
    }
}
