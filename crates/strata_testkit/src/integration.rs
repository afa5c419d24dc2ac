//! Store consistency harness.
//!
//! Applies [`StoreOp`]s to a person store and checks after each step that
//! every index agrees with a full scan of the live records.

use crate::fixtures::{person_data, person_store};
use crate::generators::StoreOp;
use strata_core::{CoreResult, RecordId, Store, Value};

/// A person store plus consistency checks.
pub struct StoreHarness {
    /// The store under test.
    pub store: Store,
    /// Operations applied so far.
    applied: usize,
}

impl StoreHarness {
    /// Creates a harness around an empty person store.
    pub fn new() -> Self {
        Self {
            store: person_store(false),
            applied: 0,
        }
    }

    fn live_id(&self, n: usize) -> Option<RecordId> {
        let size = self.store.size();
        if size == 0 {
            return None;
        }
        self.store
            .iter()
            .nth(n % size)
            .map(|e| e.record_id().clone())
    }

    /// Applies one operation. Validation failures are expected outcomes
    /// and are returned rather than treated as harness errors.
    pub fn apply(&mut self, op: &StoreOp) -> CoreResult<()> {
        self.applied += 1;
        match op {
            StoreOp::Add(first, last, val) => {
                self.store.add_data(person_data(first, last, *val))?;
            }
            StoreOp::Remove(n) => {
                if let Some(id) = self.live_id(*n) {
                    self.store.remove(&id);
                }
            }
            StoreOp::SetVal(n, val) => {
                if let Some(id) = self.live_id(*n) {
                    self.store.set(&id, "val", *val)?;
                }
            }
            StoreOp::SetLastname(n, last) => {
                if let Some(id) = self.live_id(*n) {
                    self.store.set(&id, "lastname", last.as_str())?;
                }
            }
            StoreOp::Undo(n) => {
                if let Some(id) = self.live_id(*n) {
                    self.store.undo(&id, 1)?;
                }
            }
            StoreOp::Compact => self.store.compact(),
        }
        Ok(())
    }

    /// Asserts that indexes, counts, and positions agree with the records.
    pub fn verify(&self) {
        let live: Vec<_> = self.store.iter().collect();
        assert_eq!(live.len(), self.store.size(), "size disagrees with live records");
        assert!(self.store.len() >= self.store.size(), "fewer slots than records");

        for entity in &live {
            let id = entity.record_id();
            let position = self
                .store
                .index_of(id)
                .expect("live record has a position");
            let at = self
                .store
                .get_record(position)
                .expect("position addresses a record");
            assert_eq!(at.record_id(), id, "position points at another record");

            for field in ["val", "lastname"] {
                let value = entity.get(field).unwrap_or(Value::Null);
                if value.is_null() {
                    continue;
                }
                let hits = self
                    .store
                    .get_index_records(field, value.clone())
                    .expect("field is indexed");
                assert!(
                    hits.iter().any(|e| e.record_id() == id),
                    "index on {field} misses {id} at {value}"
                );
                assert!(
                    hits.iter().all(|e| e.get(field) == Some(value.clone())),
                    "index on {field} returns records with another value"
                );
            }
        }
    }

    /// Number of operations applied.
    pub fn applied(&self) -> usize {
        self.applied
    }
}

impl Default for StoreHarness {
    fn default() -> Self {
        Self::new()
    }
}
