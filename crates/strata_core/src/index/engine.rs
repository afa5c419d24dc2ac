//! Per-field secondary indexes used by a store.
//!
//! A store keeps one [`FieldIndex`] per indexed field. Numeric fields get an
//! ordered index backed by [`BTree`] so they can answer range queries;
//! everything else gets a [`HashIndex`].
//!
//! Null values are never indexed. An ordered index also skips values that
//! are not numbers (possible when a field allows invalid values).

use crate::error::{CoreError, CoreResult};
use crate::ids::RecordId;
use crate::index::{BTree, HashIndex};
use crate::value::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::ops::{Bound, RangeBounds};

/// Type of index backing a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Hash index for equality lookups.
    Hash,
    /// BTree index for ordered traversal and range queries.
    BTree,
}

/// Totally ordered `f64` used as an ordered-index key.
#[derive(Debug, Clone, Copy)]
pub struct NumberKey(pub f64);

impl NumberKey {
    /// Key for `x`, with `-0.0` folded into `0.0`.
    pub fn new(x: f64) -> Self {
        Self(if x == 0.0 { 0.0 } else { x })
    }
}

impl PartialEq for NumberKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for NumberKey {}

impl PartialOrd for NumberKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NumberKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

fn key_bounds<R: RangeBounds<f64>>(range: &R) -> (Bound<NumberKey>, Bound<NumberKey>) {
    (
        range.start_bound().map(|x| NumberKey::new(*x)),
        range.end_bound().map(|x| NumberKey::new(*x)),
    )
}

/// Ordered index from numeric keys to records.
#[derive(Debug)]
pub struct OrderedIndex {
    tree: BTree<NumberKey, Vec<RecordId>>,
    owners: HashMap<RecordId, NumberKey>,
}

impl OrderedIndex {
    /// Creates an empty index whose tree has the given order.
    pub fn new(order: usize) -> Self {
        Self {
            tree: BTree::with_order(order),
            owners: HashMap::new(),
        }
    }

    /// Files `record` under `key`, moving it if it lives elsewhere.
    pub fn add(&mut self, key: f64, record: RecordId) {
        let key = NumberKey::new(key);
        if let Some(current) = self.owners.get(&record).copied() {
            if current == key {
                return;
            }
            self.detach(&record, current);
        }
        match self.tree.get_mut(&key) {
            Some(records) => records.push(record.clone()),
            None => {
                self.tree.put(key, vec![record.clone()]);
            }
        }
        self.owners.insert(record, key);
    }

    /// Removes `record` from whichever key holds it.
    pub fn remove(&mut self, record: &RecordId) -> bool {
        match self.owners.get(record).copied() {
            Some(key) => {
                self.detach(record, key);
                true
            }
            None => false,
        }
    }

    fn detach(&mut self, record: &RecordId, key: NumberKey) {
        let emptied = match self.tree.get_mut(&key) {
            Some(records) => {
                records.retain(|r| r != record);
                records.is_empty()
            }
            None => false,
        };
        if emptied {
            self.tree.delete(&key);
        }
        self.owners.remove(record);
    }

    /// Records filed under exactly `key`.
    pub fn records_for(&self, key: f64) -> &[RecordId] {
        self.tree
            .get(&NumberKey::new(key))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Records whose key falls in `range`, in ascending key order.
    pub fn range<R: RangeBounds<f64>>(&self, range: R) -> Vec<RecordId> {
        let bounds = key_bounds(&range);
        let mut out = Vec::new();
        self.tree
            .walk(bounds, |_, records| out.extend(records.iter().cloned()));
        out
    }

    /// Records whose key falls in `range`, in descending key order.
    pub fn range_desc<R: RangeBounds<f64>>(&self, range: R) -> Vec<RecordId> {
        let bounds = key_bounds(&range);
        let mut out = Vec::new();
        self.tree
            .walk_desc(bounds, |_, records| out.extend(records.iter().cloned()));
        out
    }

    /// Number of distinct keys in `range`.
    pub fn count_keys<R: RangeBounds<f64>>(&self, range: R) -> usize {
        let bounds = key_bounds(&range);
        self.tree.count(bounds)
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no record is indexed.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.tree.clear();
        self.owners.clear();
    }
}

/// Secondary index over one field of a store's records.
#[derive(Debug)]
pub enum FieldIndex {
    /// Equality index.
    Hash(HashIndex<Value, RecordId>),
    /// Ordered numeric index.
    Ordered(OrderedIndex),
}

impl FieldIndex {
    /// Creates an empty index of the given kind.
    pub fn new(kind: IndexKind, btree_order: usize) -> Self {
        match kind {
            IndexKind::Hash => Self::Hash(HashIndex::new()),
            IndexKind::BTree => Self::Ordered(OrderedIndex::new(btree_order)),
        }
    }

    /// Kind of this index.
    pub fn kind(&self) -> IndexKind {
        match self {
            Self::Hash(_) => IndexKind::Hash,
            Self::Ordered(_) => IndexKind::BTree,
        }
    }

    /// Files `record` under `key`. Unindexable keys remove the record.
    pub fn insert(&mut self, key: &Value, record: RecordId) {
        match self {
            Self::Hash(index) if !key.is_null() => index.add(key.clone(), record),
            Self::Ordered(index) => match key.as_f64() {
                Some(x) => index.add(x, record),
                None => {
                    index.remove(&record);
                }
            },
            Self::Hash(index) => {
                index.remove(&record, None);
            }
        }
    }

    /// Moves `record` from `old` to `new`.
    pub fn update(&mut self, record: &RecordId, old: &Value, new: &Value) {
        match self {
            Self::Hash(index) if !new.is_null() => index.update(record, old, new.clone()),
            _ => self.insert(new, record.clone()),
        }
    }

    /// Removes `record` from the index.
    pub fn remove(&mut self, record: &RecordId) {
        match self {
            Self::Hash(index) => {
                index.remove(record, None);
            }
            Self::Ordered(index) => {
                index.remove(record);
            }
        }
    }

    /// Records filed under `key`.
    pub fn lookup(&self, key: &Value) -> &[RecordId] {
        match self {
            Self::Hash(index) => index.records_for(key),
            Self::Ordered(index) => key
                .as_f64()
                .map(|x| index.records_for(x))
                .unwrap_or_default(),
        }
    }

    /// Records whose key falls in `range`, ascending.
    ///
    /// Only ordered indexes answer range queries.
    pub fn range<R: RangeBounds<f64>>(&self, field: &str, range: R) -> CoreResult<Vec<RecordId>> {
        match self {
            Self::Ordered(index) => Ok(index.range(range)),
            Self::Hash(_) => Err(CoreError::invalid_config(format!(
                "field '{field}' has a hash index; range queries need a numeric field"
            ))),
        }
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        match self {
            Self::Hash(index) => index.len(),
            Self::Ordered(index) => index.len(),
        }
    }

    /// Whether no record is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        match self {
            Self::Hash(index) => index.reset(),
            Self::Ordered(index) => index.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(s: &str) -> RecordId {
        RecordId::from_string(s)
    }

    #[test]
    fn number_key_orders_totally() {
        let mut keys = vec![NumberKey(3.5), NumberKey(-1.0), NumberKey(f64::NAN), NumberKey(0.0)];
        keys.sort();
        assert_eq!(keys[0].0, -1.0);
        assert!(keys[3].0.is_nan());
    }

    #[test]
    fn ordered_index_range() {
        let mut index = OrderedIndex::new(4);
        for (age, id) in [(30.0, "a"), (18.0, "b"), (45.0, "c"), (30.0, "d"), (60.0, "e")] {
            index.add(age, rid(id));
        }

        assert_eq!(index.range(20.0..=45.0), vec![rid("a"), rid("d"), rid("c")]);
        assert_eq!(index.range_desc(20.0..=45.0), vec![rid("c"), rid("a"), rid("d")]);
        assert_eq!(index.count_keys(..), 4);
        assert_eq!(index.records_for(30.0), &[rid("a"), rid("d")]);
    }

    #[test]
    fn negative_zero_shares_the_zero_key() {
        let mut index = OrderedIndex::new(4);
        index.add(-0.0, rid("a"));
        index.add(0.0, rid("b"));

        assert_eq!(index.count_keys(..), 1);
        assert_eq!(index.records_for(0.0), &[rid("a"), rid("b")]);
        assert_eq!(index.records_for(-0.0), &[rid("a"), rid("b")]);
        assert_eq!(index.range(-0.0..=-0.0).len(), 2);
    }

    #[test]
    fn ordered_index_moves_and_drops_empty_keys() {
        let mut index = OrderedIndex::new(4);
        index.add(1.0, rid("a"));
        index.add(2.0, rid("a"));

        assert!(index.records_for(1.0).is_empty());
        assert_eq!(index.count_keys(..), 1);
        assert!(index.remove(&rid("a")));
        assert!(index.is_empty());
        assert!(!index.remove(&rid("a")));
    }

    #[test]
    fn field_index_skips_nulls() {
        let mut index = FieldIndex::new(IndexKind::Hash, 4);
        index.insert(&Value::from("Ada"), rid("a"));
        index.insert(&Value::Null, rid("b"));
        assert_eq!(index.len(), 1);

        index.update(&rid("a"), &Value::from("Ada"), &Value::Null);
        assert!(index.is_empty());
    }

    #[test]
    fn field_index_ordered_lookup() {
        let mut index = FieldIndex::new(IndexKind::BTree, 4);
        index.insert(&Value::from(7), rid("a"));
        index.insert(&Value::from(7.0), rid("b"));
        index.insert(&Value::from("seven"), rid("c"));

        assert_eq!(index.kind(), IndexKind::BTree);
        assert_eq!(index.lookup(&Value::from(7)), &[rid("a"), rid("b")]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.range("n", 0.0..10.0).unwrap().len(), 2);
    }

    #[test]
    fn hash_index_rejects_range() {
        let index = FieldIndex::new(IndexKind::Hash, 4);
        assert!(matches!(
            index.range("name", 0.0..1.0),
            Err(CoreError::InvalidConfig { .. })
        ));
    }
}
