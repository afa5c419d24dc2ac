//! Hash index implementation.

use std::collections::HashMap;
use std::hash::Hash;

/// Hash-based multi-value index from discrete keys to record identifiers.
///
/// Each record lives under exactly one key at a time. Adding a record under
/// a new key moves it; adding it again under its current key does nothing.
/// Keys are reported in the order they were first seen, and a key whose
/// last record leaves is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let mut index: HashIndex<&str, u32> = HashIndex::new();
/// index.add("blue", 1);
/// index.add("red", 2);
/// index.update(&1, &"blue", "red");
/// assert_eq!(index.records_for(&"red"), &[2, 1]);
/// ```
#[derive(Debug, Clone)]
pub struct HashIndex<K, R> {
    /// Keys in first-seen order.
    keys: Vec<K>,
    /// Key to records mapping, records in insertion order.
    entries: HashMap<K, Vec<R>>,
    /// Record to the key it currently lives under.
    owners: HashMap<R, K>,
}

impl<K, R> HashIndex<K, R>
where
    K: Eq + Hash + Clone,
    R: Eq + Hash + Clone,
{
    /// Creates an empty index.
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            entries: HashMap::new(),
            owners: HashMap::new(),
        }
    }

    /// Files `record` under `key`, moving it if it lives elsewhere.
    pub fn add(&mut self, key: K, record: R) {
        if let Some(current) = self.owners.get(&record) {
            if *current == key {
                return;
            }
            let current = current.clone();
            self.detach(&record, &current);
        }

        if !self.entries.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.entries.entry(key.clone()).or_default().push(record.clone());
        self.owners.insert(record, key);
    }

    /// Moves `record` from `old_key` to `new_key`.
    ///
    /// If the record is not under `old_key`, it is moved from wherever it
    /// is. An untracked record is simply added.
    pub fn update(&mut self, record: &R, old_key: &K, new_key: K) {
        self.remove(record, Some(old_key));
        self.add(new_key, record.clone());
    }

    /// Removes `record`. With a key, only removes it from that key.
    ///
    /// Returns `true` if the record was removed.
    pub fn remove(&mut self, record: &R, key: Option<&K>) -> bool {
        let Some(current) = self.owners.get(record) else {
            return false;
        };
        if key.is_some_and(|k| k != current) {
            return false;
        }
        let current = current.clone();
        self.detach(record, &current);
        true
    }

    fn detach(&mut self, record: &R, key: &K) {
        if let Some(records) = self.entries.get_mut(key) {
            records.retain(|r| r != record);
            if records.is_empty() {
                self.entries.remove(key);
                self.keys.retain(|k| k != key);
            }
        }
        self.owners.remove(record);
    }

    /// Records filed under `key`, in insertion order.
    pub fn records_for(&self, key: &K) -> &[R] {
        self.entries
            .get(key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Key `record` currently lives under.
    pub fn key_of(&self, record: &R) -> Option<&K> {
        self.owners.get(record)
    }

    /// Distinct keys, in first-seen order.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// Whether any record lives under `key`.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of indexed records.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no record is indexed.
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Removes every key and record.
    pub fn reset(&mut self) {
        self.keys.clear();
        self.entries.clear();
        self.owners.clear();
    }
}

impl<K, R> Default for HashIndex<K, R>
where
    K: Eq + Hash + Clone,
    R: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
