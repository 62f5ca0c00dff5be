//! The public map type built on top of the raw trie operations.

use crate::bytes::{AsBytes, NoPrefixesBytes};
use crate::nodes::{
    deallocate_tree, insert_unchecked, search_unchecked, InsertPrefixError, OpaqueNodePtr,
};
use crate::nodes::visitor::{check_tree, collect_tree_stats, MalformedTreeError, TreeStats};
use crate::pool::NodePools;
use allocator_api2::alloc::{Allocator, Global};
use std::{fmt, marker::PhantomData};

/// An ordered map from byte-string keys to values, implemented as an
/// adaptive radix tree.
///
/// Keys are typed; the [`AsBytes`] adapter of the key type decides the byte
/// image that the tree indexes. Key bytes are stored in the structure of the
/// tree itself (node prefixes and child positions), not in the leaves, so
/// the map never keeps a copy of the key.
///
/// An insert never overwrites: inserting a key that is already present
/// leaves the stored value untouched and reports the collision instead.
///
/// # Examples
///
/// ```rust
/// use artmap::ArtMap;
///
/// let mut map = ArtMap::<u32, i32>::new();
///
/// let (_, inserted) = map.insert(&0, -1);
/// assert!(inserted);
/// assert_eq!(map.get(&0), Some(&-1));
///
/// let (existing, inserted) = map.insert(&0, 99);
/// assert!(!inserted);
/// assert_eq!(*existing, -1);
/// ```
pub struct ArtMap<K: ?Sized, V, A: Allocator = Global> {
    /// The number of leaves present in the tree.
    num_entries: usize,
    /// A pointer to the tree root, if present.
    root: Option<OpaqueNodePtr<V>>,
    /// The per-node-class pools that back the tree.
    pools: NodePools<V, A>,
    _key: PhantomData<fn(&K)>,
}

impl<K: ?Sized, V> ArtMap<K, V> {
    /// Create a new, empty map backed by the global allocator.
    ///
    /// No memory is allocated until the first insert.
    pub fn new() -> Self {
        ArtMap {
            num_entries: 0,
            root: None,
            pools: NodePools::new(),
            _key: PhantomData,
        }
    }
}

impl<K: ?Sized, V, A: Allocator + Clone> ArtMap<K, V, A> {
    /// Create a new, empty map whose nodes will be allocated from the given
    /// allocator.
    ///
    /// No memory is allocated until the first insert.
    pub fn new_in(alloc: A) -> Self {
        ArtMap {
            num_entries: 0,
            root: None,
            pools: NodePools::new_in(alloc),
            _key: PhantomData,
        }
    }
}

impl<K: ?Sized, V, A: Allocator> ArtMap<K, V, A> {
    /// The number of entries in the map.
    pub fn len(&self) -> usize {
        self.num_entries
    }

    /// Return `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Insert the given value under the given key.
    ///
    /// Returns a reference to the stored value and a flag that is `true` iff
    /// the value was newly inserted. If the key was already present, the
    /// previously stored value is returned unchanged and `value` is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the key adapter produces an empty byte image.
    pub fn insert(&mut self, key: &K, value: V) -> (&mut V, bool)
    where
        K: NoPrefixesBytes,
    {
        match self.try_insert(key, value) {
            Ok(result) => result,
            Err(_) => unreachable!(
                "a NoPrefixesBytes key type cannot produce a key that prefixes another"
            ),
        }
    }

    /// Insert the given value under the given key, for key types without the
    /// [`NoPrefixesBytes`] guarantee.
    ///
    /// Behaves like [`ArtMap::insert`] on success.
    ///
    /// # Errors
    ///
    /// Returns an [`InsertPrefixError`] if the byte image of the key is a
    /// proper prefix of an existing key, or an existing key is a proper
    /// prefix of it. The map is unchanged and `value` is dropped.
    ///
    /// # Panics
    ///
    /// Panics if the key adapter produces an empty byte image.
    pub fn try_insert(&mut self, key: &K, value: V) -> Result<(&mut V, bool), InsertPrefixError>
    where
        K: AsBytes,
    {
        let key_bytes = key.as_bytes();
        assert!(!key_bytes.is_empty(), "key must not be empty");

        // SAFETY: The mutable borrow of `self` guarantees exclusive access
        // to the tree, and all nodes were allocated from `self.pools`.
        let result = unsafe { insert_unchecked(self.root, key_bytes, value, &mut self.pools)? };

        self.root = Some(result.new_root);
        if result.inserted {
            self.num_entries += 1;
        }

        // SAFETY: The leaf stays valid until the next mutation of the map,
        // and the returned borrow keeps `self` exclusively borrowed for
        // exactly that long.
        let leaf = unsafe { result.leaf_ptr.as_mut() };
        Ok((leaf.value_mut(), result.inserted))
    }

    /// Return a reference to the value stored under the given key, if
    /// present.
    ///
    /// # Panics
    ///
    /// Panics if the key adapter produces an empty byte image.
    pub fn get(&self, key: &K) -> Option<&V>
    where
        K: AsBytes,
    {
        let key_bytes = key.as_bytes();
        assert!(!key_bytes.is_empty(), "key must not be empty");

        let root = self.root?;
        // SAFETY: The shared borrow of `self` rules out concurrent mutation
        // of the tree.
        let leaf = unsafe { search_unchecked(root, key_bytes)? };
        // SAFETY: The leaf stays valid until the next mutation of the map,
        // and the returned borrow keeps `self` borrowed for that long.
        Some(unsafe { leaf.as_ref() }.value())
    }

    /// Return a mutable reference to the value stored under the given key,
    /// if present.
    ///
    /// # Panics
    ///
    /// Panics if the key adapter produces an empty byte image.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V>
    where
        K: AsBytes,
    {
        let key_bytes = key.as_bytes();
        assert!(!key_bytes.is_empty(), "key must not be empty");

        let root = self.root?;
        // SAFETY: The mutable borrow of `self` guarantees exclusive access.
        let leaf = unsafe { search_unchecked(root, key_bytes)? };
        // SAFETY: Same argument as in `ArtMap::get`, with exclusivity from
        // the mutable borrow.
        Some(unsafe { leaf.as_mut() }.value_mut())
    }

    /// Return `true` if the map holds a value under the given key.
    pub fn contains_key(&self, key: &K) -> bool
    where
        K: AsBytes,
    {
        self.get(key).is_some()
    }

    /// Return a mutable reference to the value stored under the given key,
    /// inserting a default value first if the key is absent.
    pub fn get_or_insert_default(&mut self, key: &K) -> &mut V
    where
        K: NoPrefixesBytes,
        V: Default,
    {
        self.insert(key, V::default()).0
    }

    /// Remove every entry from the map, returning all nodes to the pools and
    /// dropping all stored values.
    pub fn clear(&mut self) {
        if let Some(root) = self.root.take() {
            // SAFETY: The mutable borrow of `self` guarantees exclusive
            // access; taking `root` out first means the tree is torn down
            // exactly once.
            unsafe { deallocate_tree(root, &mut self.pools) };
        }
        self.num_entries = 0;
    }

    /// Walk the tree and verify its structural invariants.
    ///
    /// This is an internal testing aid and not part of the stable API.
    #[doc(hidden)]
    pub fn check_well_formed(&self) -> Result<(), MalformedTreeError> {
        let leaf_count = match self.root {
            // SAFETY: The shared borrow of `self` rules out concurrent
            // mutation of the tree.
            Some(root) => unsafe { check_tree(root)? },
            None => 0,
        };

        if leaf_count != self.num_entries {
            return Err(MalformedTreeError::LeafCountMismatch {
                expected: self.num_entries,
                actual: leaf_count,
            });
        }

        Ok(())
    }

    /// Walk the tree and count nodes per class.
    ///
    /// This is an internal testing aid and not part of the stable API.
    #[doc(hidden)]
    pub fn tree_stats(&self) -> TreeStats {
        match self.root {
            // SAFETY: The shared borrow of `self` rules out concurrent
            // mutation of the tree.
            Some(root) => unsafe { collect_tree_stats(root) },
            None => TreeStats::default(),
        }
    }
}

impl<K: ?Sized, V, A: Allocator> Drop for ArtMap<K, V, A> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: ?Sized, V> Default for ArtMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized, V, A: Allocator> fmt::Debug for ArtMap<K, V, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArtMap").field("len", &self.num_entries).finish()
    }
}

// SAFETY: The raw node pointers inside the map are owned exclusively by it;
// sending the map moves the whole tree along with the pools that back it.
unsafe impl<K: ?Sized, V: Send, A: Allocator + Send> Send for ArtMap<K, V, A> {}

// SAFETY: Shared references to the map only permit lookups, which do not
// mutate any node, so sharing across threads is no more capable than `&V`
// access.
unsafe impl<K: ?Sized, V: Sync, A: Allocator + Sync> Sync for ArtMap<K, V, A> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::TerminatedString;
    use crate::tests_common::{
        generated_dictionary, keys_counting_from_high_byte, keys_counting_from_low_byte,
    };
    use std::ffi::CString;

    #[cfg(not(miri))]
    const STRESS_KEY_COUNT: u32 = 2 * 256 * 256;
    #[cfg(miri)]
    const STRESS_KEY_COUNT: u32 = 2 * 256;

    #[test]
    fn new_map_is_empty() {
        let map = ArtMap::<u32, i32>::new();
        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        assert_eq!(map.get(&0), None);
        map.check_well_formed().unwrap();
    }

    #[test]
    fn insert_one_pair_and_find_it() {
        let mut map = ArtMap::<u32, i32>::new();

        let (value, inserted) = map.insert(&0, -1);
        assert!(inserted);
        assert_eq!(*value, -1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&0), Some(&-1));
        map.check_well_formed().unwrap();
    }

    #[test]
    fn insert_with_existing_key_returns_existing_value() {
        let mut map = ArtMap::<u32, i32>::new();

        map.insert(&0, -1);
        let (value, inserted) = map.insert(&0, 99);

        assert!(!inserted);
        assert_eq!(*value, -1);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&0), Some(&-1));
        map.check_well_formed().unwrap();
    }

    #[test]
    fn insert_two_pairs_splits_root_chain() {
        let mut map = ArtMap::<u32, i32>::new();

        map.insert(&0, -1);
        // Differs from zero in the second key byte, inside the compressed
        // prefix of the chain below the root.
        let second_key = u32::from_ne_bytes([0, 0x0F, 0, 0]);
        let (value, inserted) = map.insert(&second_key, 0);

        assert!(inserted);
        assert_eq!(*value, 0);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&0), Some(&-1));
        assert_eq!(map.get(&second_key), Some(&0));
        map.check_well_formed().unwrap();
    }

    #[test]
    fn insert_three_pairs_fans_out_the_split_node() {
        let mut map = ArtMap::<u32, i32>::new();

        let second_key = u32::from_ne_bytes([0, 0x0F, 0, 0]);
        let third_key = u32::from_ne_bytes([0, 0x01, 0, 0]);
        map.insert(&0, 0);
        map.insert(&second_key, 1);
        let (value, inserted) = map.insert(&third_key, 3);

        assert!(inserted);
        assert_eq!(*value, 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&0), Some(&0));
        assert_eq!(map.get(&second_key), Some(&1));
        assert_eq!(map.get(&third_key), Some(&3));
        map.check_well_formed().unwrap();
    }

    #[test]
    fn insert_growth_stress_low_byte_counting() {
        // Counting from the low byte grows the nodes furthest from the root
        // through every class.
        let keys = keys_counting_from_low_byte(STRESS_KEY_COUNT).collect::<Vec<_>>();
        let mut map = ArtMap::<[u8; 4], u32>::new();

        for (index, key) in keys.iter().enumerate() {
            let (_, inserted) = map.insert(key, index as u32);
            assert!(inserted);
            assert_eq!(map.len(), index + 1);
        }

        for (index, key) in keys.iter().enumerate() {
            assert_eq!(map.get(key), Some(&(index as u32)));
        }
        map.check_well_formed().unwrap();
    }

    #[test]
    fn insert_growth_stress_high_byte_counting() {
        // Counting from the high byte grows the nodes near the root instead.
        let keys = keys_counting_from_high_byte(STRESS_KEY_COUNT).collect::<Vec<_>>();
        let mut map = ArtMap::<[u8; 4], u32>::new();

        for (index, key) in keys.iter().enumerate() {
            let (_, inserted) = map.insert(key, index as u32);
            assert!(inserted);
            assert_eq!(map.len(), index + 1);
        }

        for (index, key) in keys.iter().enumerate() {
            assert_eq!(map.get(key), Some(&(index as u32)));
        }
        map.check_well_formed().unwrap();
    }

    #[test]
    fn string_keys_with_empty_string() {
        let mut map = ArtMap::<TerminatedString, i32>::new();

        map.insert(&TerminatedString::new(""), -1);
        map.insert(&TerminatedString::new("a"), 1);
        map.insert(&TerminatedString::new("b"), 3);

        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&TerminatedString::new("")), Some(&-1));
        assert_eq!(map.get(&TerminatedString::new("a")), Some(&1));
        assert_eq!(map.get(&TerminatedString::new("b")), Some(&3));
        assert_eq!(map.get(&TerminatedString::new("c")), None);
        assert!(map.contains_key(&TerminatedString::new("a")));
        assert!(!map.contains_key(&TerminatedString::new("ab")));
        map.check_well_formed().unwrap();
    }

    #[test]
    fn c_string_keys_share_prefixes() {
        let mut map = ArtMap::<CString, usize>::new();
        let words = ["romane", "romanus", "romulus", "rubens", "ruber", "rubicon"];

        for (line_number, word) in words.iter().enumerate() {
            let key = CString::new(*word).unwrap();
            let (_, inserted) = map.insert(&key, line_number);
            assert!(inserted);
        }

        assert_eq!(map.len(), words.len());
        for (line_number, word) in words.iter().enumerate() {
            let key = CString::new(*word).unwrap();
            assert_eq!(map.get(&key), Some(&line_number));
        }
        assert_eq!(map.get(&CString::new("roman").unwrap()), None);
        map.check_well_formed().unwrap();
    }

    #[test]
    fn dictionary_stress() {
        let words = generated_dictionary();
        let mut map = ArtMap::<TerminatedString, usize>::new();

        for (line_number, word) in words.iter().enumerate() {
            let key = TerminatedString::new(word);
            let (_, inserted) = map.insert(&key, line_number);
            assert!(inserted, "word [{word}] generated twice");
        }

        assert_eq!(map.len(), words.len());
        for (line_number, word) in words.iter().enumerate() {
            assert_eq!(map.get(&TerminatedString::new(word)), Some(&line_number));
        }
        map.check_well_formed().unwrap();
    }

    #[test]
    fn clear_empties_the_map() {
        let mut map = ArtMap::<u16, u16>::new();

        for key in 0..500u16 {
            map.insert(&key, key);
        }
        assert_eq!(map.len(), 500);

        map.clear();

        assert_eq!(map.len(), 0);
        assert!(map.is_empty());
        for key in 0..500u16 {
            assert_eq!(map.get(&key), None);
        }
        map.check_well_formed().unwrap();

        // The map stays usable after a clear.
        map.insert(&7, 7);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&7), Some(&7));
        map.check_well_formed().unwrap();
    }

    #[test]
    fn get_mut_updates_the_stored_value() {
        let mut map = ArtMap::<u64, String>::new();

        map.insert(&42, "first".to_string());
        *map.get_mut(&42).unwrap() = "second".to_string();

        assert_eq!(map.get(&42).map(String::as_str), Some("second"));
        assert_eq!(map.get_mut(&41), None);
    }

    #[test]
    fn get_or_insert_default_behaves_like_index_operator() {
        let mut map = ArtMap::<u32, i64>::new();

        // Absent key: inserts the default value.
        assert_eq!(*map.get_or_insert_default(&3), 0);
        assert_eq!(map.len(), 1);

        *map.get_or_insert_default(&3) += 10;
        // Present key: the stored value is untouched by the default.
        assert_eq!(*map.get_or_insert_default(&3), 10);
        assert_eq!(map.len(), 1);
        map.check_well_formed().unwrap();
    }

    #[test]
    fn try_insert_reports_prefix_conflicts() {
        let mut map = ArtMap::<[u8], u32>::new();

        map.try_insert(&[1, 2, 3, 4][..], 0).unwrap();

        let error = map.try_insert(&[1, 2][..], 1).unwrap_err();
        assert_eq!(error, InsertPrefixError(Box::from(&[1, 2][..])));
        let error = map.try_insert(&[1, 2, 3, 4, 5][..], 2).unwrap_err();
        assert_eq!(error, InsertPrefixError(Box::from(&[1, 2, 3, 4, 5][..])));

        // The failed inserts left the map untouched.
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&[1, 2, 3, 4][..]), Some(&0));
        map.check_well_formed().unwrap();
    }

    #[test]
    #[should_panic = "key must not be empty"]
    fn empty_key_is_rejected() {
        let mut map = ArtMap::<[u8], u32>::new();
        let _result = map.try_insert(&[][..], 0);
    }

    #[test]
    fn values_are_dropped_on_clear() {
        use std::rc::Rc;

        let witness = Rc::new(());
        let mut map = ArtMap::<u32, Rc<()>>::new();
        for key in 0..10u32 {
            map.insert(&key, Rc::clone(&witness));
        }
        assert_eq!(Rc::strong_count(&witness), 11);

        map.clear();
        assert_eq!(Rc::strong_count(&witness), 1);
    }

    #[test]
    fn values_are_dropped_on_map_drop() {
        use std::rc::Rc;

        let witness = Rc::new(());
        {
            let mut map = ArtMap::<u32, Rc<()>>::new();
            for key in 0..10u32 {
                map.insert(&key, Rc::clone(&witness));
            }
            assert_eq!(Rc::strong_count(&witness), 11);
        }
        assert_eq!(Rc::strong_count(&witness), 1);
    }

    #[test]
    fn rejected_duplicate_value_is_dropped() {
        use std::rc::Rc;

        let witness = Rc::new(());
        let mut map = ArtMap::<u32, Rc<()>>::new();

        map.insert(&1, Rc::clone(&witness));
        let (_, inserted) = map.insert(&1, Rc::clone(&witness));

        assert!(!inserted);
        // Only the stored clone is alive; the rejected one was dropped.
        assert_eq!(Rc::strong_count(&witness), 2);
    }

    #[test]
    fn insertion_order_does_not_change_the_outcome() {
        let keys = keys_counting_from_low_byte(64).collect::<Vec<_>>();

        let mut forward = ArtMap::<[u8; 4], usize>::new();
        for (index, key) in keys.iter().enumerate() {
            forward.insert(key, index);
        }

        let mut backward = ArtMap::<[u8; 4], usize>::new();
        for (index, key) in keys.iter().enumerate().rev() {
            backward.insert(key, index);
        }

        assert_eq!(forward.len(), backward.len());
        for (index, key) in keys.iter().enumerate() {
            assert_eq!(forward.get(key), Some(&index));
            assert_eq!(backward.get(key), Some(&index));
        }
        forward.check_well_formed().unwrap();
        backward.check_well_formed().unwrap();
    }
}
