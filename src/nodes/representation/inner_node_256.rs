use super::{Header, InnerNode, Node, NodeType, OpaqueNodePtr};
use std::fmt;

/// Node with capacity for 256 children, indexed directly by the key byte.
#[repr(C, align(16))]
pub struct InnerNode256<V> {
    /// The common node fields.
    pub header: Header,
    /// An array that directly maps a key byte (as the index) to a child.
    pub child_pointers: [Option<OpaqueNodePtr<V>>; 256],
}

impl<V> Copy for InnerNode256<V> {}

impl<V> Clone for InnerNode256<V> {
    fn clone(&self) -> Self {
        Self {
            header: self.header,
            child_pointers: self.child_pointers,
        }
    }
}

impl<V> fmt::Debug for InnerNode256<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InnerNode256")
            .field("header", &self.header)
            .field("child_pointers", &&self.child_pointers[..])
            .finish()
    }
}

impl<V> InnerNode256<V> {
    /// Create an empty node.
    pub fn empty() -> Self {
        Self::from_header(Header::empty())
    }

    /// Create an empty node with the given header.
    pub fn from_header(header: Header) -> Self {
        InnerNode256 {
            header,
            child_pointers: [None; 256],
        }
    }
}

impl<V> Node for InnerNode256<V> {
    const TYPE: NodeType = NodeType::Node256;

    type Value = V;
}

impl<V> InnerNode for InnerNode256<V> {
    // A full 256-entry node has a child for every possible key byte, so no
    // insert can ever require more capacity.
    type GrownNode = Self;

    fn header(&self) -> &Header {
        &self.header
    }

    fn lookup_child(&self, key_fragment: u8) -> Option<OpaqueNodePtr<V>> {
        self.child_pointers[usize::from(key_fragment)]
    }

    fn write_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        debug_assert!(
            self.child_pointers[usize::from(key_fragment)].is_none(),
            "key fragment [{key_fragment}] is already present in this node"
        );

        self.child_pointers[usize::from(key_fragment)] = Some(child_pointer);
        self.header.inc_num_children();
    }

    fn overwrite_child(&mut self, key_fragment: u8, child_pointer: OpaqueNodePtr<V>) {
        if self.child_pointers[usize::from(key_fragment)].is_none() {
            panic!("key fragment [{key_fragment}] has no child in this node");
        }
        self.child_pointers[usize::from(key_fragment)] = Some(child_pointer);
    }

    fn grow(&self) -> Self::GrownNode {
        unreachable!("a 256-entry node cannot be full for a new key byte")
    }

    fn iter(&self) -> impl Iterator<Item = (u8, OpaqueNodePtr<V>)> + '_ {
        self.child_pointers
            .iter()
            .enumerate()
            .filter_map(|(key_fragment, child_pointer)| {
                child_pointer.map(|child_pointer| {
                    (
                        // PANIC SAFETY: The `child_pointers` array has 256
                        // entries, so `key_fragment` always fits in a `u8`.
                        u8::try_from(key_fragment).unwrap(),
                        child_pointer,
                    )
                })
            })
    }
}
