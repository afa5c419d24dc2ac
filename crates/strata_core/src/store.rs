//! Ordered, indexed collections of entities.
//!
//! A [`Store`] keeps its records in a manifest of slots. Removing a record
//! leaves a tombstone so positions of the other records do not move;
//! [`Store::compact`] drops the tombstones. `len` counts slots, `size`
//! counts live records.
//!
//! Indexed fields are kept current by routing every write through the
//! store ([`Store::set`], [`Store::undo`], [`Store::redo`]): the entity
//! applies the change quietly, the store updates its indexes, and only then
//! are the entity's and the store's events emitted.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut people = StoreConfig::new().model(person).index("val").build()?;
//! let id = people.add_data(data)?;
//! people.set(&id, "val", 12)?;
//! let teens = people.index_range("val", 13.0..=19.0)?;
//! ```

use crate::config::StoreConfig;
use crate::entity::{Entity, FieldSpec, Model};
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventEmitter};
use crate::field::FieldChange;
use crate::ids::RecordId;
use crate::index::{FieldIndex, IndexKind, DEFAULT_ORDER};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::RangeBounds;
use tracing::{debug, trace};

/// Addresses a record by manifest position or by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordRef {
    /// Manifest slot.
    Position(usize),
    /// Record identifier.
    Id(RecordId),
}

impl From<usize> for RecordRef {
    fn from(position: usize) -> Self {
        RecordRef::Position(position)
    }
}

impl From<RecordId> for RecordRef {
    fn from(id: RecordId) -> Self {
        RecordRef::Id(id)
    }
}

impl From<&RecordId> for RecordRef {
    fn from(id: &RecordId) -> Self {
        RecordRef::Id(id.clone())
    }
}

impl From<&Entity> for RecordRef {
    fn from(entity: &Entity) -> Self {
        RecordRef::Id(entity.record_id().clone())
    }
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Position(position) => write!(f, "#{position}"),
            RecordRef::Id(id) => write!(f, "{id}"),
        }
    }
}

/// Events emitted by a store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// A record was added.
    RecordCreate(RecordId),
    /// A record was removed.
    RecordDelete(RecordId),
    /// A record's field changed through the store.
    RecordUpdate {
        /// Changed record.
        record: RecordId,
        /// The change.
        change: FieldChange,
    },
    /// An index was created for the named field.
    IndexCreate(String),
    /// Tombstones were dropped.
    Compact,
    /// Every record was removed.
    Clear,
}

impl Event for StoreEvent {
    fn name(&self) -> &str {
        match self {
            StoreEvent::RecordCreate(_) => "record.create",
            StoreEvent::RecordDelete(_) => "record.delete",
            StoreEvent::RecordUpdate { .. } => "record.update",
            StoreEvent::IndexCreate(_) => "index.create",
            StoreEvent::Compact => "compact",
            StoreEvent::Clear => "clear",
        }
    }
}

/// An ordered, indexed collection of entities of one model.
#[derive(Debug)]
pub struct Store {
    model: Model,
    manifest: Vec<Option<Entity>>,
    positions: HashMap<RecordId, usize>,
    active: usize,
    indexes: BTreeMap<String, FieldIndex>,
    btree_order: usize,
    cycle: bool,
    events: EventEmitter<StoreEvent>,
}

impl Store {
    /// Creates an empty, unindexed store.
    pub fn new(model: Model) -> Self {
        Self {
            model,
            manifest: Vec::new(),
            positions: HashMap::new(),
            active: 0,
            indexes: BTreeMap::new(),
            btree_order: DEFAULT_ORDER,
            cycle: false,
            events: EventEmitter::new(),
        }
    }

    /// Creates a store from `config`.
    pub fn with_config(mut config: StoreConfig) -> CoreResult<Self> {
        let model = config.take_model()?;
        let mut store = Self::new(model);
        store.btree_order = config.btree_order;
        store.cycle = config.cycle;
        for field in &config.index {
            store.create_index(field)?;
        }
        Ok(store)
    }

    /// Adds a record and returns its identifier.
    pub fn add(&mut self, entity: Entity) -> CoreResult<RecordId> {
        self.check_new(&entity)?;
        Ok(self.insert(entity))
    }

    /// Adds records in order. Nothing is added if any record is rejected.
    pub fn add_all<I>(&mut self, entities: I) -> CoreResult<Vec<RecordId>>
    where
        I: IntoIterator<Item = Entity>,
    {
        let entities: Vec<Entity> = entities.into_iter().collect();
        let mut batch = HashSet::new();
        for entity in &entities {
            self.check_new(entity)?;
            if !batch.insert(entity.record_id()) {
                return Err(CoreError::DuplicateRecord {
                    id: entity.record_id().to_string(),
                });
            }
        }
        Ok(entities.into_iter().map(|e| self.insert(e)).collect())
    }

    /// Creates a record from `data` and adds it.
    pub fn add_data(&mut self, data: BTreeMap<String, Value>) -> CoreResult<RecordId> {
        let entity = self.model.create_with(data)?;
        self.add(entity)
    }

    fn check_new(&self, entity: &Entity) -> CoreResult<()> {
        if !entity.model().same_as(&self.model) {
            return Err(CoreError::ModelMismatch {
                expected: self.model.name().to_string(),
                actual: entity.name().to_string(),
            });
        }
        if self.positions.contains_key(entity.record_id()) {
            return Err(CoreError::DuplicateRecord {
                id: entity.record_id().to_string(),
            });
        }
        Ok(())
    }

    fn insert(&mut self, entity: Entity) -> RecordId {
        let id = entity.record_id().clone();
        for (field, index) in &mut self.indexes {
            if let Some(value) = entity.get(field) {
                index.insert(&value, id.clone());
            }
        }

        let position = self.manifest.len();
        self.manifest.push(Some(entity));
        self.positions.insert(id.clone(), position);
        self.active += 1;

        debug!(record = %id, position, "added record");
        self.events.emit(StoreEvent::RecordCreate(id.clone()));
        id
    }

    /// Removes a record, leaving a tombstone in its slot.
    ///
    /// Returns `None` when the reference does not address a live record.
    pub fn remove(&mut self, reference: impl Into<RecordRef>) -> Option<Entity> {
        let position = self.resolve(&reference.into())?;
        let entity = self.manifest.get_mut(position)?.take()?;
        let id = entity.record_id().clone();

        self.positions.remove(&id);
        self.active -= 1;
        for index in self.indexes.values_mut() {
            index.remove(&id);
        }

        debug!(record = %id, position, "removed record");
        self.events.emit(StoreEvent::RecordDelete(id));
        Some(entity)
    }

    /// Removes several records, skipping references that miss.
    pub fn remove_many<I, R>(&mut self, references: I) -> Vec<Entity>
    where
        I: IntoIterator<Item = R>,
        R: Into<RecordRef>,
    {
        let references: Vec<RecordRef> = references.into_iter().map(Into::into).collect();
        references
            .into_iter()
            .filter_map(|reference| self.remove(reference))
            .collect()
    }

    fn resolve(&self, reference: &RecordRef) -> Option<usize> {
        match reference {
            RecordRef::Position(position) => self
                .manifest
                .get(*position)
                .and_then(Option::as_ref)
                .map(|_| *position),
            RecordRef::Id(id) => self.positions.get(id).copied(),
        }
    }

    fn resolve_or_err(&self, reference: RecordRef) -> CoreResult<usize> {
        self.resolve(&reference)
            .ok_or_else(|| CoreError::record_not_found(&reference))
    }

    /// Live record at a manifest position or with an identifier.
    pub fn get_record(&self, reference: impl Into<RecordRef>) -> Option<&Entity> {
        let position = self.resolve(&reference.into())?;
        self.manifest.get(position).and_then(Option::as_ref)
    }

    /// Whether the record is a live member of this store.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.positions.contains_key(id)
    }

    /// Manifest position of a live record.
    pub fn index_of(&self, id: &RecordId) -> Option<usize> {
        self.positions.get(id).copied()
    }

    /// First live record.
    pub fn first(&self) -> Option<&Entity> {
        self.iter().next()
    }

    /// Last live record.
    pub fn last(&self) -> Option<&Entity> {
        self.manifest.iter().rev().find_map(Option::as_ref)
    }

    /// Live records in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.manifest.iter().filter_map(Option::as_ref)
    }

    /// Calls `visit` with the position and record of every live record.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(usize, &Entity),
    {
        for (position, slot) in self.manifest.iter().enumerate() {
            if let Some(entity) = slot {
                visit(position, entity);
            }
        }
    }

    /// Live records in manifest order.
    pub fn records(&self) -> Vec<&Entity> {
        self.iter().collect()
    }

    /// Number of manifest slots, tombstones included.
    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    /// Number of live records.
    pub fn size(&self) -> usize {
        self.active
    }

    /// Whether the store has no live records.
    pub fn is_empty(&self) -> bool {
        self.active == 0
    }

    /// Drops tombstones. Surviving records keep their relative order.
    pub fn compact(&mut self) {
        let before = self.manifest.len();
        self.manifest.retain(Option::is_some);
        self.positions = self
            .manifest
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.as_ref().map(|e| (e.record_id().clone(), position)))
            .collect();

        debug!(dropped = before - self.manifest.len(), "compacted store");
        self.events.emit(StoreEvent::Compact);
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.manifest.clear();
        self.positions.clear();
        self.active = 0;
        for index in self.indexes.values_mut() {
            index.clear();
        }
        self.events.emit(StoreEvent::Clear);
    }

    /// Creates an index on a data field and fills it from live records.
    ///
    /// Number and integer fields get an ordered B-tree index; every other
    /// type gets a hash index.
    pub fn create_index(&mut self, field: &str) -> CoreResult<()> {
        if self.indexes.contains_key(field) {
            return Err(CoreError::duplicate_index(field));
        }
        let kind = match self.model.field(field) {
            None => return Err(CoreError::field_not_found(field)),
            Some(FieldSpec::Data(def)) if def.resolved_type().is_numeric() => IndexKind::BTree,
            Some(FieldSpec::Data(_)) => IndexKind::Hash,
            Some(_) => {
                return Err(CoreError::invalid_config(format!(
                    "field '{field}' is not a data field and cannot be indexed"
                )))
            }
        };

        let mut index = FieldIndex::new(kind, self.btree_order);
        for entity in self.manifest.iter().flatten() {
            if let Some(value) = entity.get(field) {
                index.insert(&value, entity.record_id().clone());
            }
        }
        self.indexes.insert(field.to_string(), index);

        debug!(field, ?kind, "created index");
        self.events.emit(StoreEvent::IndexCreate(field.to_string()));
        Ok(())
    }

    /// Index on the named field.
    pub fn index(&self, field: &str) -> Option<&FieldIndex> {
        self.indexes.get(field)
    }

    /// Names of indexed fields.
    pub fn indexed_fields(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    /// Records whose indexed `field` equals `key`.
    pub fn get_index_records(&self, field: &str, key: impl Into<Value>) -> CoreResult<Vec<&Entity>> {
        let index = self
            .indexes
            .get(field)
            .ok_or_else(|| CoreError::index_not_found(field))?;
        Ok(self.entities(index.lookup(&key.into())))
    }

    /// Records whose numeric indexed `field` falls in `range`, ascending.
    pub fn index_range<R>(&self, field: &str, range: R) -> CoreResult<Vec<&Entity>>
    where
        R: RangeBounds<f64>,
    {
        let index = self
            .indexes
            .get(field)
            .ok_or_else(|| CoreError::index_not_found(field))?;
        let ids = index.range(field, range)?;
        Ok(self.entities(&ids))
    }

    /// Records whose `field` equals `value`.
    ///
    /// Uses the field's index when there is one; otherwise scans. Numbers
    /// compare by value, so `5` finds `5.0`.
    pub fn find(&self, field: &str, value: impl Into<Value>) -> CoreResult<Vec<&Entity>> {
        if self.model.field(field).is_none() {
            return Err(CoreError::field_not_found(field));
        }
        let value = value.into();
        if let Some(index) = self.indexes.get(field) {
            if !value.is_null() {
                return Ok(self.entities(index.lookup(&value)));
            }
        }
        trace!(field, "scanning store");
        Ok(self
            .iter()
            .filter(|e| e.get(field).is_some_and(|v| same_value(&v, &value)))
            .collect())
    }

    fn entities(&self, ids: &[RecordId]) -> Vec<&Entity> {
        ids.iter()
            .filter_map(|id| self.get_record(id))
            .collect()
    }

    /// Assigns a field of a record, keeping indexes current.
    pub fn set(
        &mut self,
        reference: impl Into<RecordRef>,
        field: &str,
        value: impl Into<Value>,
    ) -> CoreResult<Option<FieldChange>> {
        let position = self.resolve_or_err(reference.into())?;
        let Some(entity) = self.manifest.get_mut(position).and_then(Option::as_mut) else {
            return Err(CoreError::record_not_found(RecordRef::Position(position)));
        };

        let Some(change) = entity.apply(field, value.into())? else {
            return Ok(None);
        };
        let id = entity.record_id().clone();
        reindex(&mut self.indexes, &id, &change);
        entity.announce(&change);
        self.events.emit(StoreEvent::RecordUpdate {
            record: id,
            change: change.clone(),
        });
        Ok(Some(change))
    }

    /// Undoes `n` changes of a record, keeping indexes current.
    pub fn undo(&mut self, reference: impl Into<RecordRef>, n: usize) -> CoreResult<Vec<FieldChange>> {
        self.step(reference.into(), None, n, false)
    }

    /// Redoes `n` changes of a record, keeping indexes current.
    pub fn redo(&mut self, reference: impl Into<RecordRef>, n: usize) -> CoreResult<Vec<FieldChange>> {
        self.step(reference.into(), None, n, true)
    }

    /// Steps one audited field of a record back `n` entries in its own
    /// history, keeping indexes current.
    pub fn undo_field(
        &mut self,
        reference: impl Into<RecordRef>,
        field: &str,
        n: usize,
    ) -> CoreResult<Option<FieldChange>> {
        Ok(self.step(reference.into(), Some(field), n, false)?.pop())
    }

    /// Steps one audited field of a record forward `n` entries in its own
    /// history, keeping indexes current.
    pub fn redo_field(
        &mut self,
        reference: impl Into<RecordRef>,
        field: &str,
        n: usize,
    ) -> CoreResult<Option<FieldChange>> {
        Ok(self.step(reference.into(), Some(field), n, true)?.pop())
    }

    fn step(
        &mut self,
        reference: RecordRef,
        field: Option<&str>,
        n: usize,
        forward: bool,
    ) -> CoreResult<Vec<FieldChange>> {
        let position = self.resolve_or_err(reference)?;
        let Some(entity) = self.manifest.get_mut(position).and_then(Option::as_mut) else {
            return Err(CoreError::record_not_found(RecordRef::Position(position)));
        };

        let changes = match field {
            Some(name) => entity.step_field(name, n, forward)?.into_iter().collect(),
            None if forward => entity.replay(n),
            None => entity.rewind(n),
        };
        let id = entity.record_id().clone();
        for change in &changes {
            reindex(&mut self.indexes, &id, change);
        }
        entity.announce_history(forward, &changes);
        for change in &changes {
            self.events.emit(StoreEvent::RecordUpdate {
                record: id.clone(),
                change: change.clone(),
            });
        }
        Ok(changes)
    }

    /// Live record `n` steps after `from`, following the store's cycling
    /// setting.
    pub fn next(&self, from: impl Into<RecordRef>, n: usize) -> Option<&Entity> {
        self.neighbor(from, offset(n, true), self.cycle)
    }

    /// Live record `n` steps before `from`, following the store's cycling
    /// setting.
    pub fn previous(&self, from: impl Into<RecordRef>, n: usize) -> Option<&Entity> {
        self.neighbor(from, offset(n, false), self.cycle)
    }

    /// Live record `offset` steps from `from` in manifest order, skipping
    /// tombstones.
    ///
    /// Without cycling, walking past either end yields `None`. With
    /// cycling the walk wraps modulo the number of live records.
    pub fn neighbor(&self, from: impl Into<RecordRef>, offset: i64, cycle: bool) -> Option<&Entity> {
        let start = self.resolve(&from.into())?;
        let live: Vec<usize> = self
            .manifest
            .iter()
            .enumerate()
            .filter_map(|(position, slot)| slot.as_ref().map(|_| position))
            .collect();
        let current = i64::try_from(live.iter().position(|p| *p == start)?).ok()?;
        let count = i64::try_from(live.len()).ok()?;

        let target = current.checked_add(offset)?;
        let target = if cycle {
            target.rem_euclid(count)
        } else if (0..count).contains(&target) {
            target
        } else {
            return None;
        };
        let position = live[usize::try_from(target).ok()?];
        self.manifest.get(position).and_then(Option::as_ref)
    }

    /// Whether neighbor navigation wraps around.
    pub fn is_cycling(&self) -> bool {
        self.cycle
    }

    /// Sets whether neighbor navigation wraps around.
    pub fn set_cycle(&mut self, value: bool) {
        self.cycle = value;
    }

    /// Model of the stored records.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Event emitter for this store.
    pub fn events(&self) -> &EventEmitter<StoreEvent> {
        &self.events
    }
}

fn reindex(indexes: &mut BTreeMap<String, FieldIndex>, id: &RecordId, change: &FieldChange) {
    if let Some(index) = indexes.get_mut(&change.field) {
        index.update(id, &change.old, &change.new);
    }
}

fn offset(n: usize, forward: bool) -> i64 {
    let n = i64::try_from(n).unwrap_or(i64::MAX);
    if forward {
        n
    } else {
        -n
    }
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => x == y,
        _ => a == b,
    }
}
