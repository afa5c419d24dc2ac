//! Multi-way balanced search tree.
//!
//! `BTree` is the ordered structure behind numeric field indexes. It is a
//! classic B-tree of configurable order: every node holds at most
//! `order - 1` keys and every non-root node at least `order / 2 - 1`.
//! Insertion splits full nodes on the way down; deletion borrows from or
//! merges with a sibling on the way down, so neither operation ever has to
//! walk back up.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut tree = BTree::with_order(4);
//! for k in [5, 1, 9, 3] {
//!     tree.put(k, k * 10);
//! }
//! tree.walk(2..=6, |k, v| println!("{k} -> {v}"));
//! assert_eq!(tree.count(..), 4);
//! ```

use std::mem;
use std::ops::{Bound, RangeBounds};

/// Order used when none is configured.
pub const DEFAULT_ORDER: usize = 32;

/// Smallest accepted order.
pub const MIN_ORDER: usize = 4;

struct Node<K, V> {
    keys: Vec<K>,
    values: Vec<V>,
    children: Vec<Node<K, V>>,
}

impl<K: Ord, V> Node<K, V> {
    fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Splits the full child at `i`, lifting its median into this node.
    fn split_child(&mut self, i: usize, t: usize) {
        let child = &mut self.children[i];
        let mut right_keys = child.keys.split_off(t - 1);
        let mut right_values = child.values.split_off(t - 1);
        let median_key = right_keys.remove(0);
        let median_value = right_values.remove(0);
        let right_children = if child.is_leaf() {
            Vec::new()
        } else {
            child.children.split_off(t)
        };

        self.keys.insert(i, median_key);
        self.values.insert(i, median_value);
        self.children.insert(
            i + 1,
            Node {
                keys: right_keys,
                values: right_values,
                children: right_children,
            },
        );
    }

    /// Inserts into a node known to have room. Returns the replaced value
    /// when the key was already present.
    fn insert_non_full(&mut self, key: K, value: V, t: usize) -> Option<V> {
        let mut i = match self.keys.binary_search(&key) {
            Ok(i) => return Some(mem::replace(&mut self.values[i], value)),
            Err(i) => i,
        };

        if self.is_leaf() {
            self.keys.insert(i, key);
            self.values.insert(i, value);
            return None;
        }

        if self.children[i].keys.len() == 2 * t - 1 {
            self.split_child(i, t);
            match key.cmp(&self.keys[i]) {
                std::cmp::Ordering::Equal => {
                    return Some(mem::replace(&mut self.values[i], value));
                }
                std::cmp::Ordering::Greater => i += 1,
                std::cmp::Ordering::Less => {}
            }
        }
        self.children[i].insert_non_full(key, value, t)
    }

    fn remove(&mut self, key: &K, t: usize) -> Option<V> {
        match self.keys.binary_search(key) {
            Ok(i) if self.is_leaf() => {
                self.keys.remove(i);
                Some(self.values.remove(i))
            }
            Ok(i) => {
                if self.children[i].keys.len() >= t {
                    if let Some((k, v)) = self.children[i].pop_max(t) {
                        self.keys[i] = k;
                        return Some(mem::replace(&mut self.values[i], v));
                    }
                }
                if self.children[i + 1].keys.len() >= t {
                    if let Some((k, v)) = self.children[i + 1].pop_min(t) {
                        self.keys[i] = k;
                        return Some(mem::replace(&mut self.values[i], v));
                    }
                }
                self.merge(i);
                self.children[i].remove(key, t)
            }
            Err(_) if self.is_leaf() => None,
            Err(i) => {
                let i = self.fill_child(i, t);
                self.children[i].remove(key, t)
            }
        }
    }

    fn pop_max(&mut self, t: usize) -> Option<(K, V)> {
        if self.is_leaf() {
            return self.keys.pop().zip(self.values.pop());
        }
        let last = self.children.len() - 1;
        let i = self.fill_child(last, t);
        self.children[i].pop_max(t)
    }

    fn pop_min(&mut self, t: usize) -> Option<(K, V)> {
        if self.is_leaf() {
            if self.keys.is_empty() {
                return None;
            }
            return Some((self.keys.remove(0), self.values.remove(0)));
        }
        let i = self.fill_child(0, t);
        self.children[i].pop_min(t)
    }

    /// Makes sure child `i` holds at least `t` keys before descending into
    /// it. Returns the index of the child that now covers the same range.
    fn fill_child(&mut self, i: usize, t: usize) -> usize {
        if self.children[i].keys.len() >= t {
            return i;
        }
        if i > 0 && self.children[i - 1].keys.len() >= t {
            self.borrow_from_prev(i);
            return i;
        }
        if i + 1 < self.children.len() && self.children[i + 1].keys.len() >= t {
            self.borrow_from_next(i);
            return i;
        }
        if i + 1 < self.children.len() {
            self.merge(i);
            i
        } else {
            self.merge(i - 1);
            i - 1
        }
    }

    fn borrow_from_prev(&mut self, i: usize) {
        let (before, rest) = self.children.split_at_mut(i);
        let left = &mut before[i - 1];
        let child = &mut rest[0];
        let (Some(k), Some(v)) = (left.keys.pop(), left.values.pop()) else {
            return;
        };

        let sep_key = mem::replace(&mut self.keys[i - 1], k);
        let sep_value = mem::replace(&mut self.values[i - 1], v);
        child.keys.insert(0, sep_key);
        child.values.insert(0, sep_value);
        if let Some(grandchild) = left.children.pop() {
            child.children.insert(0, grandchild);
        }
    }

    fn borrow_from_next(&mut self, i: usize) {
        let (upto, rest) = self.children.split_at_mut(i + 1);
        let child = &mut upto[i];
        let right = &mut rest[0];
        if right.keys.is_empty() {
            return;
        }

        let k = right.keys.remove(0);
        let v = right.values.remove(0);
        let sep_key = mem::replace(&mut self.keys[i], k);
        let sep_value = mem::replace(&mut self.values[i], v);
        child.keys.push(sep_key);
        child.values.push(sep_value);
        if !right.is_leaf() {
            child.children.push(right.children.remove(0));
        }
    }

    /// Folds child `i + 1` and separator `i` into child `i`.
    fn merge(&mut self, i: usize) {
        let right = self.children.remove(i + 1);
        let sep_key = self.keys.remove(i);
        let sep_value = self.values.remove(i);

        let left = &mut self.children[i];
        left.keys.push(sep_key);
        left.values.push(sep_value);
        left.keys.extend(right.keys);
        left.values.extend(right.values);
        left.children.extend(right.children);
    }

    /// In-order walk. Returns `false` once a key past the range is seen.
    fn walk_asc<R, F>(&self, range: &R, visit: &mut F) -> bool
    where
        R: RangeBounds<K>,
        F: FnMut(&K, &V),
    {
        let start = match range.start_bound() {
            Bound::Included(s) => self.keys.partition_point(|k| k < s),
            Bound::Excluded(s) => self.keys.partition_point(|k| k <= s),
            Bound::Unbounded => 0,
        };

        for i in start..self.keys.len() {
            if !self.is_leaf() && !self.children[i].walk_asc(range, visit) {
                return false;
            }
            let key = &self.keys[i];
            let past_end = match range.end_bound() {
                Bound::Included(e) => key > e,
                Bound::Excluded(e) => key >= e,
                Bound::Unbounded => false,
            };
            if past_end {
                return false;
            }
            visit(key, &self.values[i]);
        }

        if self.is_leaf() {
            true
        } else {
            self.children[self.keys.len()].walk_asc(range, visit)
        }
    }

    /// Reverse in-order walk. Returns `false` once a key before the range
    /// is seen.
    fn walk_desc<R, F>(&self, range: &R, visit: &mut F) -> bool
    where
        R: RangeBounds<K>,
        F: FnMut(&K, &V),
    {
        let end = match range.end_bound() {
            Bound::Included(e) => self.keys.partition_point(|k| k <= e),
            Bound::Excluded(e) => self.keys.partition_point(|k| k < e),
            Bound::Unbounded => self.keys.len(),
        };

        if !self.is_leaf() && !self.children[end].walk_desc(range, visit) {
            return false;
        }
        for i in (0..end).rev() {
            let key = &self.keys[i];
            let before_start = match range.start_bound() {
                Bound::Included(s) => key < s,
                Bound::Excluded(s) => key <= s,
                Bound::Unbounded => false,
            };
            if before_start {
                return false;
            }
            visit(key, &self.values[i]);
            if !self.is_leaf() && !self.children[i].walk_desc(range, visit) {
                return false;
            }
        }
        true
    }
}

/// Ordered map backed by a B-tree.
///
/// Keys are unique; `put` on an existing key replaces its value in place.
pub struct BTree<K, V> {
    root: Node<K, V>,
    /// Minimum degree: nodes hold between `t - 1` and `2t - 1` keys.
    t: usize,
    len: usize,
}

impl<K: Ord, V> BTree<K, V> {
    /// Creates an empty tree of [`DEFAULT_ORDER`].
    pub fn new() -> Self {
        Self::with_order(DEFAULT_ORDER)
    }

    /// Creates an empty tree of the given order (maximum children per
    /// node). Orders below [`MIN_ORDER`] are raised to it; odd orders are
    /// rounded down.
    pub fn with_order(order: usize) -> Self {
        Self {
            root: Node::new(),
            t: order.max(MIN_ORDER) / 2,
            len: 0,
        }
    }

    /// Maximum children per node.
    pub fn order(&self) -> usize {
        self.t * 2
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree has no keys.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of levels, zero when empty.
    pub fn height(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let mut height = 1;
        let mut node = &self.root;
        while let Some(child) = node.children.first() {
            node = child;
            height += 1;
        }
        height
    }

    /// Inserts or replaces. Returns the previous value for `key`.
    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        if self.root.keys.len() == 2 * self.t - 1 {
            let old_root = mem::replace(&mut self.root, Node::new());
            self.root.children.push(old_root);
            self.root.split_child(0, self.t);
        }
        let replaced = self.root.insert_non_full(key, value, self.t);
        if replaced.is_none() {
            self.len += 1;
        }
        replaced
    }

    /// Looks up a key.
    pub fn get(&self, key: &K) -> Option<&V> {
        let mut node = &self.root;
        loop {
            match node.keys.binary_search(key) {
                Ok(i) => return Some(&node.values[i]),
                Err(_) if node.is_leaf() => return None,
                Err(i) => node = &node.children[i],
            }
        }
    }

    /// Looks up a key for modification.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let mut node = &mut self.root;
        loop {
            match node.keys.binary_search(key) {
                Ok(i) => return Some(&mut node.values[i]),
                Err(_) if node.is_leaf() => return None,
                Err(i) => node = &mut node.children[i],
            }
        }
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Removes a key, returning its value. Absent keys are a no-op.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        let removed = self.root.remove(key, self.t);
        if self.root.keys.is_empty() {
            if let Some(child) = self.root.children.pop() {
                self.root = child;
            }
        }
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Visits every entry in `range` in ascending key order.
    pub fn walk<R, F>(&self, range: R, mut visit: F)
    where
        R: RangeBounds<K>,
        F: FnMut(&K, &V),
    {
        if !self.is_empty() {
            self.root.walk_asc(&range, &mut visit);
        }
    }

    /// Visits every entry in `range` in descending key order.
    pub fn walk_desc<R, F>(&self, range: R, mut visit: F)
    where
        R: RangeBounds<K>,
        F: FnMut(&K, &V),
    {
        if !self.is_empty() {
            self.root.walk_desc(&range, &mut visit);
        }
    }

    /// Number of keys in `range`.
    pub fn count<R: RangeBounds<K>>(&self, range: R) -> usize {
        let mut n = 0;
        self.walk(range, |_, _| n += 1);
        n
    }

    /// Smallest key.
    pub fn min_key(&self) -> Option<&K> {
        let mut node = &self.root;
        while let Some(child) = node.children.first() {
            node = child;
        }
        node.keys.first()
    }

    /// Largest key.
    pub fn max_key(&self) -> Option<&K> {
        let mut node = &self.root;
        while let Some(child) = node.children.last() {
            node = child;
        }
        node.keys.last()
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.root = Node::new();
        self.len = 0;
    }
}

impl<K: Ord, V> Default for BTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> std::fmt::Debug for BTree<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BTree")
            .field("order", &self.order())
            .field("len", &self.len)
            .field("height", &self.height())
            .finish()
    }
}
