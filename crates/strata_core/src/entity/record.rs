//! Entity instances.
//!
//! An [`Entity`] owns one [`Field`] per name and routes every read and
//! write through it. Writes go through the field's validation pipeline;
//! accepted changes are recorded in the entity changelog (when the model
//! audits), invalidate dependent virtual fields, and are announced as
//! `field.update`.
//!
//! Mutation is split into a quiet step and an announcing step so a store
//! can update its indexes in between. Listeners therefore never observe a
//! change before every index reflects it.

use crate::entity::{FieldSpec, Model};
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventEmitter};
use crate::field::{DataField, Field, FieldChange, FieldEvent, FieldKind, RelationshipField, Scope};
use crate::ids::RecordId;
use crate::log::TransactionLog;
use crate::value::Value;
use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;
use tracing::{debug, trace};

/// Events emitted by an entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityEvent {
    /// A field value changed.
    FieldUpdate(FieldChange),
    /// A field value changed and failed validation.
    FieldInvalid(FieldChange),
    /// A field was added.
    FieldCreate(String),
    /// A field was removed.
    FieldRemove(String),
    /// A field was hidden.
    FieldHidden(String),
    /// A field was unhidden.
    FieldUnhidden(String),
    /// A virtual field dropped its cached value.
    CacheClear(String),
    /// Changes reverted by an undo, newest first.
    Undo(Vec<FieldChange>),
    /// Changes replayed by a redo, oldest first.
    Redo(Vec<FieldChange>),
    /// A nested entity or store of a relationship field emitted `event`.
    RelationshipUpdate {
        /// Relationship field name.
        field: String,
        /// Name of the nested event.
        event: String,
    },
    /// Application-defined event.
    Custom(String),
}

impl Event for EntityEvent {
    fn name(&self) -> &str {
        match self {
            EntityEvent::FieldUpdate(_) => "field.update",
            EntityEvent::FieldInvalid(_) => "field.invalid",
            EntityEvent::FieldCreate(_) => "field.create",
            EntityEvent::FieldRemove(_) => "field.remove",
            EntityEvent::FieldHidden(_) => "field.hidden",
            EntityEvent::FieldUnhidden(_) => "field.unhidden",
            EntityEvent::CacheClear(_) => "field.cache.clear",
            EntityEvent::Undo(_) => "undo",
            EntityEvent::Redo(_) => "redo",
            EntityEvent::RelationshipUpdate { .. } => "relationship.update",
            EntityEvent::Custom(name) => name,
        }
    }
}

/// One record of a [`Model`].
#[derive(Debug)]
pub struct Entity {
    model: Model,
    record_id: RecordId,
    fields: Vec<Field>,
    changelog: Option<TransactionLog<FieldChange>>,
    cleared: Vec<String>,
    events: EventEmitter<EntityEvent>,
}

impl Entity {
    pub(crate) fn new(model: Model) -> CoreResult<Self> {
        let record_id = RecordId::generate(model.ids().as_ref());
        let changelog = model.is_audited().then(|| new_changelog(&model));
        let mut entity = Self {
            model: model.clone(),
            record_id,
            fields: Vec::with_capacity(model.fields().len()),
            changelog,
            cleared: Vec::new(),
            events: EventEmitter::new(),
        };

        for spec in model.fields() {
            let field = entity.build_field(spec.clone())?;
            entity.fields.push(field);
        }

        if model.is_autoid() {
            let id = Value::from(entity.record_id.as_str());
            if let Some(Field::Data(field)) = entity.field_mut(model.id_field()) {
                field.restore(id);
            }
        }
        Ok(entity)
    }

    fn build_field(&self, spec: FieldSpec) -> CoreResult<Field> {
        Ok(match spec {
            FieldSpec::Data(def) => Field::Data(def.build()?),
            FieldSpec::Virtual(def) => Field::Virtual(def.build()),
            FieldSpec::Relationship(def) => {
                let mut field = def.build()?;
                field.forward_to(self.events.downgrade());
                Field::Relationship(field)
            }
        })
    }

    /// Starts recording a changelog if the model does not already.
    pub fn enable_audit(&mut self) {
        if self.changelog.is_none() {
            self.changelog = Some(new_changelog(&self.model));
        }
    }

    /// Current value of the named field.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.field(name).map(|f| self.read(f))
    }

    fn read(&self, field: &Field) -> Value {
        match field {
            Field::Data(f) => f.value().clone(),
            Field::Virtual(f) => {
                self.settle_nested();
                f.value_in(self)
            }
            Field::Relationship(f) => f.value(),
        }
    }

    /// Invalidates virtual fields that read a relationship whose nested
    /// object changed since the last check.
    fn settle_nested(&self) {
        for field in &self.fields {
            let Field::Relationship(related) = field else {
                continue;
            };
            if !related.take_nested_change() {
                continue;
            }
            for dependent in self.fields.iter().filter_map(Field::as_virtual) {
                if dependent.depends_on(related.name()) && dependent.invalidate() {
                    self.events
                        .emit(EntityEvent::CacheClear(dependent.name().to_string()));
                }
            }
        }
    }

    /// Assigns a value to the named field.
    ///
    /// Returns the change, or `None` when nothing changed. Virtual fields
    /// ignore assignment. Relationship fields load a map (single) or an
    /// array of maps (multiple) into their nested object; their change
    /// carries the nested snapshot before and after the load and is not
    /// recorded in the changelog.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> CoreResult<Option<FieldChange>> {
        let change = self.apply(name, value.into())?;
        if let Some(change) = &change {
            self.announce(change);
        }
        Ok(change)
    }

    /// Assignment without any event emission.
    pub(crate) fn apply(&mut self, name: &str, value: Value) -> CoreResult<Option<FieldChange>> {
        let field = self
            .field_mut(name)
            .ok_or_else(|| CoreError::field_not_found(name))?;
        let recorded = matches!(field, Field::Data(_));
        let change = match field {
            Field::Data(f) => f.assign(value)?,
            Field::Virtual(f) => {
                f.set(value);
                None
            }
            Field::Relationship(f) => {
                let old = f.value();
                f.load(value)?;
                f.take_nested_change();
                let new = f.value();
                (old != new).then(|| FieldChange {
                    field: f.name().to_string(),
                    old,
                    new,
                })
            }
        };
        let Some(change) = change else {
            return Ok(None);
        };

        if let (true, Some(log)) = (recorded, &mut self.changelog) {
            log.commit(change.clone());
        }
        self.invalidate_dependents(&change.field);
        Ok(Some(change))
    }

    /// Emits the events for a change made by [`apply`](Self::apply).
    pub(crate) fn announce(&mut self, change: &FieldChange) {
        let valid = self
            .field(&change.field)
            .and_then(Field::as_data)
            .map_or(true, DataField::is_valid);

        if let Some(field) = self.field(&change.field) {
            if !valid {
                field.events().emit(FieldEvent::Invalid(change.clone()));
            }
            field.events().emit(FieldEvent::Update(change.clone()));
        }
        if !valid {
            self.events.emit(EntityEvent::FieldInvalid(change.clone()));
        }
        self.events.emit(EntityEvent::FieldUpdate(change.clone()));
        self.announce_cleared();
    }

    fn announce_cleared(&mut self) {
        for name in mem::take(&mut self.cleared) {
            self.events.emit(EntityEvent::CacheClear(name));
        }
    }

    fn invalidate_dependents(&mut self, name: &str) {
        for field in &self.fields {
            if let Field::Virtual(v) = field {
                if v.depends_on(name) && v.invalidate() {
                    self.cleared.push(v.name().to_string());
                }
            }
        }
    }

    /// Adds a field at runtime.
    pub fn add_field(&mut self, spec: impl Into<FieldSpec>) -> CoreResult<()> {
        let spec = spec.into();
        if self.has_field(spec.name()) {
            return Err(CoreError::duplicate_field(spec.name()));
        }
        if let FieldSpec::Virtual(def) = &spec {
            if let Some(missing) = def.dependencies.iter().find(|d| !self.has_field(d)) {
                return Err(CoreError::invalid_config(format!(
                    "virtual field '{}' depends on unknown field '{missing}'",
                    def.name
                )));
            }
        }

        let name = spec.name().to_string();
        let field = self.build_field(spec)?;
        self.fields.push(field);
        debug!(record = %self.record_id, field = %name, "added field");
        self.events.emit(EntityEvent::FieldCreate(name));
        Ok(())
    }

    /// Removes a field at runtime, returning it.
    pub fn remove_field(&mut self, name: &str) -> Option<Field> {
        let position = self.fields.iter().position(|f| f.name() == name)?;
        let field = self.fields.remove(position);
        debug!(record = %self.record_id, field = %name, "removed field");
        self.invalidate_dependents(name);
        self.events.emit(EntityEvent::FieldRemove(name.to_string()));
        self.announce_cleared();
        Some(field)
    }

    /// Hides the named field. Returns `false` if it was already hidden.
    pub fn hide(&mut self, name: &str) -> CoreResult<bool> {
        let field = self
            .field_mut(name)
            .ok_or_else(|| CoreError::field_not_found(name))?;
        let changed = field.hide();
        if changed {
            self.events.emit(EntityEvent::FieldHidden(name.to_string()));
        }
        Ok(changed)
    }

    /// Unhides the named field. Returns `false` if it was already visible.
    pub fn unhide(&mut self, name: &str) -> CoreResult<bool> {
        let field = self
            .field_mut(name)
            .ok_or_else(|| CoreError::field_not_found(name))?;
        let changed = field.unhide();
        if changed {
            self.events.emit(EntityEvent::FieldUnhidden(name.to_string()));
        }
        Ok(changed)
    }

    /// Visible data and relationship values, keyed through the field map.
    pub fn data(&self) -> BTreeMap<String, Value> {
        self.view(false)
    }

    /// [`data`](Self::data) plus visible virtual fields.
    pub fn representation(&self) -> BTreeMap<String, Value> {
        self.view(true)
    }

    fn view(&self, with_virtual: bool) -> BTreeMap<String, Value> {
        self.fields
            .iter()
            .filter(|f| !f.is_hidden())
            .filter(|f| with_virtual || f.kind() != FieldKind::Virtual)
            .map(|f| (self.model.map_key(f.name()).to_string(), self.read(f)))
            .collect()
    }

    /// [`representation`](Self::representation) as JSON.
    pub fn to_json(&self) -> CoreResult<serde_json::Value> {
        Ok(serde_json::to_value(Value::Map(self.representation()))?)
    }

    /// Assigns every entry of `data`, keyed through the inverse field map.
    ///
    /// Unknown keys are skipped. Stops at the first rejected value; values
    /// assigned before it stay assigned.
    pub fn load(&mut self, data: BTreeMap<String, Value>) -> CoreResult<Vec<FieldChange>> {
        let mut changes = Vec::new();
        for (key, value) in data {
            let name = self.model.unmap_key(&key).to_string();
            if !self.has_field(&name) {
                trace!(key = %key, "skipped unknown key");
                continue;
            }
            if let Some(change) = self.set(&name, value)? {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    /// Reverts the last `n` recorded changes, across fields.
    ///
    /// A no-op without a changelog or at the start of history. Values are
    /// restored without validation.
    pub fn undo(&mut self, n: usize) -> Vec<FieldChange> {
        let changes = self.rewind(n);
        self.announce_history(false, &changes);
        changes
    }

    /// Replays the next `n` undone changes.
    pub fn redo(&mut self, n: usize) -> Vec<FieldChange> {
        let changes = self.replay(n);
        self.announce_history(true, &changes);
        changes
    }

    /// Steps the named field back `n` entries in its own history.
    ///
    /// Only data fields defined with `audit` keep one; for other fields
    /// this is a no-op. An entity changelog records the restored value as
    /// a new change.
    pub fn undo_field(&mut self, name: &str, n: usize) -> CoreResult<Option<FieldChange>> {
        let change = self.step_field(name, n, false)?;
        self.announce_history(false, change.as_slice());
        Ok(change)
    }

    /// Steps the named field forward `n` entries in its own history.
    pub fn redo_field(&mut self, name: &str, n: usize) -> CoreResult<Option<FieldChange>> {
        let change = self.step_field(name, n, true)?;
        self.announce_history(true, change.as_slice());
        Ok(change)
    }

    /// Field history step without event emission.
    pub(crate) fn step_field(
        &mut self,
        name: &str,
        n: usize,
        forward: bool,
    ) -> CoreResult<Option<FieldChange>> {
        let field = self
            .field_mut(name)
            .ok_or_else(|| CoreError::field_not_found(name))?;
        let Field::Data(field) = field else {
            return Ok(None);
        };
        let change = if forward {
            field.step_forward(n)
        } else {
            field.step_back(n)
        };
        let Some(change) = change else {
            return Ok(None);
        };

        if let Some(log) = &mut self.changelog {
            log.commit(change.clone());
        }
        self.invalidate_dependents(&change.field);
        Ok(Some(change))
    }

    /// Undo without event emission.
    pub(crate) fn rewind(&mut self, n: usize) -> Vec<FieldChange> {
        let Some(log) = self.changelog.as_mut() else {
            return Vec::new();
        };
        let Some(from) = log.cursor_index() else {
            return Vec::new();
        };
        if !log.rollback(n) {
            return Vec::new();
        }
        let to = log.cursor_index().unwrap_or(from);
        let targets: Vec<FieldChange> = ((to + 1)..=from)
            .rev()
            .filter_map(|i| log.get(i))
            .map(|commit| commit.value.reversed())
            .collect();
        self.restore_all(targets, false)
    }

    /// Redo without event emission.
    pub(crate) fn replay(&mut self, n: usize) -> Vec<FieldChange> {
        let Some(log) = self.changelog.as_mut() else {
            return Vec::new();
        };
        let Some(from) = log.cursor_index() else {
            return Vec::new();
        };
        if !log.advance(n) {
            return Vec::new();
        }
        let to = log.cursor_index().unwrap_or(from);
        let targets: Vec<FieldChange> = ((from + 1)..=to)
            .filter_map(|i| log.get(i))
            .map(|commit| commit.value.clone())
            .collect();
        self.restore_all(targets, true)
    }

    fn restore_all(&mut self, targets: Vec<FieldChange>, forward: bool) -> Vec<FieldChange> {
        let mut changes = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(Field::Data(field)) = self.field_mut(&target.field) else {
                continue;
            };
            if let Some(change) = field.restore_in_step(target.new, forward) {
                self.invalidate_dependents(&change.field);
                changes.push(change);
            }
        }
        changes
    }

    /// Emits `undo` (or `redo` when `forward`) on each touched field, then
    /// once on the entity.
    pub(crate) fn announce_history(&mut self, forward: bool, changes: &[FieldChange]) {
        if changes.is_empty() {
            return;
        }
        for change in changes {
            if let Some(field) = self.field(&change.field) {
                field.events().emit(if forward {
                    FieldEvent::Redo(change.clone())
                } else {
                    FieldEvent::Undo(change.clone())
                });
            }
        }
        let changes = changes.to_vec();
        self.events.emit(if forward {
            EntityEvent::Redo(changes)
        } else {
            EntityEvent::Undo(changes)
        });
        self.announce_cleared();
    }

    /// Value of the identifier field.
    pub fn id(&self) -> Value {
        self.get(self.model.id_field()).unwrap_or_default()
    }

    /// Assigns the identifier field.
    pub fn set_id(&mut self, value: impl Into<Value>) -> CoreResult<Option<FieldChange>> {
        let name = self.model.id_field().to_string();
        self.set(&name, value)
    }

    /// Identifier of this record, unique across stores.
    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// Model this entity was created from.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Model name.
    pub fn name(&self) -> &str {
        self.model.name()
    }

    /// Whether no data field has been assigned yet.
    pub fn is_new(&self) -> bool {
        self.data_fields().all(DataField::is_new)
    }

    /// Whether any data field has been reassigned.
    pub fn is_modified(&self) -> bool {
        self.data_fields().any(DataField::is_modified)
    }

    /// Whether every data field holds a valid value.
    pub fn is_valid(&self) -> bool {
        self.data_fields().all(DataField::is_valid)
    }

    /// Names of data fields holding invalid values.
    pub fn invalid_fields(&self) -> Vec<&str> {
        self.data_fields()
            .filter(|f| !f.is_valid())
            .map(DataField::name)
            .collect()
    }

    fn data_fields(&self) -> impl Iterator<Item = &DataField> {
        self.fields.iter().filter_map(Field::as_data)
    }

    /// Field names, in declaration order.
    pub fn known_field_names(&self) -> Vec<&str> {
        self.fields.iter().map(Field::name).collect()
    }

    /// Whether a field with this name exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// The named field.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.iter_mut().find(|f| f.name() == name)
    }

    /// The named relationship field.
    pub fn relationship(&self, name: &str) -> Option<&RelationshipField> {
        self.field(name).and_then(Field::as_relationship)
    }

    /// The named relationship field, mutable.
    pub fn relationship_mut(&mut self, name: &str) -> Option<&mut RelationshipField> {
        match self.field_mut(name)? {
            Field::Relationship(field) => Some(field),
            _ => None,
        }
    }

    /// Changelog, when auditing.
    pub fn changelog(&self) -> Option<&TransactionLog<FieldChange>> {
        self.changelog.as_ref()
    }

    /// Number of changelog entries.
    pub fn changelog_len(&self) -> usize {
        self.changelog.as_ref().map_or(0, TransactionLog::len)
    }

    /// Event emitter for this entity.
    pub fn events(&self) -> &EventEmitter<EntityEvent> {
        &self.events
    }
}

impl Scope for Entity {
    fn get(&self, name: &str) -> Option<Value> {
        Entity::get(self, name)
    }
}

fn new_changelog(model: &Model) -> TransactionLog<FieldChange> {
    let log = match model.max_history() {
        Some(max) => TransactionLog::with_max_entries(max),
        None => TransactionLog::new(),
    };
    log.with_id_generator(Arc::clone(model.ids()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ModelDefinition;
    use crate::field::{FieldDefinition, Join, RelationshipDefinition, VirtualDefinition};
    use crate::ids::SequentialIds;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn meta() -> ModelDefinition {
        ModelDefinition::new("metamodel")
            .id_field("testid")
            .id_generator(Arc::new(SequentialIds::new("rec")))
            .field(FieldDefinition::new("firstname"))
            .field(FieldDefinition::new("lastname"))
            .field(
                FieldDefinition::new("val")
                    .min(10.0)
                    .max(20.0)
                    .default_value(15),
            )
            .field(FieldDefinition::new("testid"))
            .virtual_field(
                VirtualDefinition::new("virtual", |scope| {
                    let val = scope.get("val").unwrap_or_default();
                    Value::from(format!("test {val}"))
                })
                .depends_on(["val"]),
            )
    }

    fn recorder(entity: &Entity, name: &str) -> Arc<Mutex<Vec<EntityEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        entity
            .events()
            .on(name, move |e: &EntityEvent| sink.lock().push(e.clone()));
        seen
    }

    #[test]
    fn creates_record_from_model() {
        let model = meta().build().unwrap();
        let p = model.create().unwrap();

        assert_eq!(p.name(), "metamodel");
        assert_eq!(p.record_id().as_str(), "rec-1");
        for name in ["firstname", "lastname", "val", "testid", "virtual"] {
            assert!(p.has_field(name), "missing {name}");
        }
        assert!(!p.has_field("not_a_field"));

        let firstname = p.field("firstname").and_then(Field::as_data).unwrap();
        assert_eq!(firstname.field_type(), crate::field::FieldType::String);
        let val = p.field("val").and_then(Field::as_data).unwrap();
        assert_eq!(val.field_type(), crate::field::FieldType::Number);

        assert_eq!(p.get("virtual"), Some(Value::from("test 15")));
        assert!(p.is_new());
        assert!(p.is_valid());
    }

    #[test]
    fn update_event_carries_change() {
        let mut p = meta().build().unwrap().create().unwrap();
        let seen = recorder(&p, "field.update");

        p.set("firstname", "Corey").unwrap();

        let events = seen.lock();
        assert_eq!(events.len(), 1);
        let EntityEvent::FieldUpdate(change) = &events[0] else {
            panic!("unexpected event {:?}", events[0]);
        };
        assert_eq!(change.field, "firstname");
        assert!(change.old.is_null());
        assert_eq!(change.new, Value::from("Corey"));
    }

    #[test]
    fn rejected_value_is_not_announced() {
        let mut p = meta().build().unwrap().create().unwrap();
        let seen = recorder(&p, "field.update");

        let err = p.set("val", 25).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
        assert_eq!(p.get("val"), Some(Value::from(15)));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn unknown_field_is_an_error() {
        let mut p = meta().build().unwrap().create().unwrap();
        assert!(matches!(
            p.set("nope", 1),
            Err(CoreError::FieldNotFound { .. })
        ));
        assert_eq!(p.get("nope"), None);
    }

    #[test]
    fn allowed_invalid_value_is_flagged() {
        let model = ModelDefinition::new("m")
            .field(FieldDefinition::new("n").max(10.0).allow_invalid(true))
            .build()
            .unwrap();
        let mut e = model.create().unwrap();
        let invalid = recorder(&e, "field.invalid");

        e.set("n", 50).unwrap();
        assert!(!e.is_valid());
        assert_eq!(e.invalid_fields(), vec!["n"]);
        assert_eq!(invalid.lock().len(), 1);
    }

    #[test]
    fn field_lifecycle() {
        let mut p = meta().build().unwrap().create().unwrap();
        let created = recorder(&p, "field.create");
        let removed = recorder(&p, "field.remove");

        p.add_field(FieldDefinition::new("middle")).unwrap();
        assert!(p.has_field("middle"));
        assert_eq!(
            created.lock().as_slice(),
            &[EntityEvent::FieldCreate("middle".into())]
        );

        let err = p.add_field(FieldDefinition::new("middle")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateField { .. }));

        let field = p.remove_field("middle").unwrap();
        assert_eq!(field.name(), "middle");
        assert!(!p.has_field("middle"));
        assert_eq!(
            removed.lock().as_slice(),
            &[EntityEvent::FieldRemove("middle".into())]
        );
        assert!(p.remove_field("middle").is_none());
    }

    #[test]
    fn serialized_views() {
        let model = meta().map_field("firstname", "gn").build().unwrap();
        let mut p = model.create().unwrap();
        p.set("firstname", "Corey").unwrap();
        p.hide("lastname").unwrap();

        let data = p.data();
        assert_eq!(data.get("gn"), Some(&Value::from("Corey")));
        assert!(!data.contains_key("firstname"));
        assert!(!data.contains_key("lastname"));
        assert!(!data.contains_key("virtual"));

        let repr = p.representation();
        assert_eq!(repr.get("virtual"), Some(&Value::from("test 15")));

        let json = p.to_json().unwrap();
        assert_eq!(json["gn"], serde_json::json!("Corey"));
        assert_eq!(json["val"], serde_json::json!(15));
    }

    #[test]
    fn load_uses_inverse_fieldmap() {
        let model = meta().map_field("firstname", "gn").build().unwrap();
        let mut data = BTreeMap::new();
        data.insert("gn".to_string(), Value::from("Ada"));
        data.insert("lastname".to_string(), Value::from("Lovelace"));
        data.insert("ignored".to_string(), Value::from(1));
        let p = model.create_with(data).unwrap();

        assert_eq!(p.get("firstname"), Some(Value::from("Ada")));
        assert_eq!(p.get("lastname"), Some(Value::from("Lovelace")));
        assert!(!p.is_new());
    }

    #[test]
    fn autoid_sets_identifier() {
        let model = meta().autoid(true).build().unwrap();
        let p = model.create().unwrap();
        assert_eq!(p.id(), Value::from(p.record_id().as_str()));
        assert!(p.is_new());
    }

    #[test]
    fn changelog_across_fields() {
        let mut m = meta().audit(true).build().unwrap().create().unwrap();
        let names = |m: &Entity| (m.get("firstname").unwrap(), m.get("lastname").unwrap());

        m.set("firstname", "John").unwrap();
        m.set("lastname", "Doe").unwrap();
        m.set("val", 17).unwrap();
        m.set_id("12345").unwrap();
        m.set("firstname", "Jill").unwrap();
        m.set("lastname", "Rey").unwrap();

        m.undo(1);
        assert_eq!(names(&m), (Value::from("Jill"), Value::from("Doe")));

        m.undo(1);
        assert_eq!(names(&m), (Value::from("John"), Value::from("Doe")));

        m.redo(2);
        assert_eq!(names(&m), (Value::from("Jill"), Value::from("Rey")));

        m.undo(2);
        m.set("firstname", "Billy").unwrap();
        m.set("lastname", "Bob").unwrap();
        m.undo(2);
        assert_eq!(names(&m), (Value::from("John"), Value::from("Doe")));

        m.redo(10);
        assert_eq!(names(&m), (Value::from("Billy"), Value::from("Bob")));
        assert_eq!(m.get("val"), Some(Value::from(17)));
        assert_eq!(m.id(), Value::from("12345"));
    }

    #[test]
    fn undo_emits_reverted_changes() {
        let mut m = meta().audit(true).build().unwrap().create().unwrap();
        let seen = recorder(&m, "undo");
        m.set("firstname", "a").unwrap();
        m.set("firstname", "b").unwrap();

        let reverted = m.undo(1);
        assert_eq!(reverted.len(), 1);
        assert_eq!(reverted[0].new, Value::from("a"));
        assert_eq!(seen.lock().len(), 1);

        assert!(m.undo(5).is_empty());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn undo_without_audit_is_noop() {
        let mut m = meta().build().unwrap().create().unwrap();
        m.set("firstname", "a").unwrap();
        assert!(m.undo(1).is_empty());
        assert_eq!(m.changelog_len(), 0);
        assert_eq!(m.get("firstname"), Some(Value::from("a")));
    }

    #[test]
    fn virtual_cache_cleared_by_dependency() {
        let mut model = meta().build().unwrap().create().unwrap();
        let virtual_field = model.field("virtual").and_then(Field::as_virtual).unwrap();
        assert!(virtual_field.is_caching());
        assert!(virtual_field.cached_value().is_none());

        assert_eq!(model.get("virtual"), Some(Value::from("test 15")));
        let virtual_field = model.field("virtual").and_then(Field::as_virtual).unwrap();
        assert_eq!(virtual_field.cached_value(), Some(Value::from("test 15")));

        let ended = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ended);
        model.events().funnel_once(
            &["field.cache.clear", "done"],
            EntityEvent::Custom("end.test".into()),
        );
        model
            .events()
            .once("end.test", move |_| flag.store(true, Ordering::SeqCst));

        model.set("firstname", "unrelated").unwrap();
        let virtual_field = model.field("virtual").and_then(Field::as_virtual).unwrap();
        assert_eq!(virtual_field.cached_value(), Some(Value::from("test 15")));

        model.set("val", 11).unwrap();
        assert_eq!(model.get("virtual"), Some(Value::from("test 11")));
        let virtual_field = model.field("virtual").and_then(Field::as_virtual).unwrap();
        assert_eq!(virtual_field.cached_value(), Some(Value::from("test 11")));

        assert!(!ended.load(Ordering::SeqCst));
        model.events().emit(EntityEvent::Custom("done".into()));
        assert!(ended.load(Ordering::SeqCst));
    }

    #[test]
    fn single_relationship_history() {
        let person = meta().build().unwrap();
        let mut field = RelationshipDefinition::new("test", Join::One(person))
            .audit(true)
            .build()
            .unwrap();
        let names = |f: &RelationshipField| {
            let e = f.entity().unwrap();
            (e.get("firstname").unwrap(), e.get("lastname").unwrap())
        };

        let nested = field.entity_mut().unwrap();
        nested.set("firstname", "John").unwrap();
        nested.set("lastname", "Doe").unwrap();
        nested.set("firstname", "Jill").unwrap();

        field.undo(1);
        assert_eq!(names(&field), (Value::from("John"), Value::from("Doe")));

        field.redo(1);
        assert_eq!(names(&field), (Value::from("Jill"), Value::from("Doe")));

        field.undo(2);
        assert_eq!(names(&field), (Value::from("John"), Value::Null));

        field.redo(2);
        assert_eq!(names(&field), (Value::from("Jill"), Value::from("Doe")));

        assert_eq!(field.entity().unwrap().changelog_len(), 3);
    }

    #[test]
    fn nested_events_bubble_to_parent() {
        let person = meta().build().unwrap();
        let model = ModelDefinition::new("team")
            .field(FieldDefinition::new("title"))
            .relationship(RelationshipDefinition::new("lead", Join::One(person)))
            .build()
            .unwrap();
        let mut team = model.create().unwrap();
        let seen = recorder(&team, "relationship.update");

        let lead = team.relationship_mut("lead").unwrap();
        lead.entity_mut().unwrap().set("firstname", "Ada").unwrap();

        let events = seen.lock();
        assert!(events.contains(&EntityEvent::RelationshipUpdate {
            field: "lead".into(),
            event: "field.update".into(),
        }));
        drop(events);

        let data = team.data();
        let lead = data.get("lead").and_then(Value::as_map).unwrap();
        assert_eq!(lead.get("firstname"), Some(&Value::from("Ada")));
    }

    #[test]
    fn relationship_loads_from_map() {
        let person = meta().build().unwrap();
        let model = ModelDefinition::new("team")
            .relationship(RelationshipDefinition::new("lead", Join::One(person.clone())))
            .relationship(RelationshipDefinition::new("members", Join::Many(person)))
            .build()
            .unwrap();
        let mut team = model.create().unwrap();

        let mut lead = BTreeMap::new();
        lead.insert("firstname".to_string(), Value::from("Grace"));
        team.set("lead", Value::Map(lead.clone())).unwrap();
        team.set("members", Value::Array(vec![Value::Map(lead)])).unwrap();

        let nested = team.relationship("lead").and_then(RelationshipField::entity).unwrap();
        assert_eq!(nested.get("firstname"), Some(Value::from("Grace")));
        let members = team.relationship("members").and_then(RelationshipField::store).unwrap();
        assert_eq!(members.size(), 1);

        assert!(matches!(
            team.set("lead", 5),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn audited_field_undo_inside_entity() {
        let model = ModelDefinition::new("m")
            .field(FieldDefinition::new("name").audit(true))
            .build()
            .unwrap();
        let mut e = model.create().unwrap();
        let undone = recorder(&e, "undo");
        e.set("name", "a").unwrap();
        e.set("name", "b").unwrap();

        assert!(e.undo(1).is_empty());
        let change = e.undo_field("name", 1).unwrap().unwrap();
        assert_eq!(change.new, Value::from("a"));
        assert_eq!(e.get("name"), Some(Value::from("a")));
        assert_eq!(undone.lock().len(), 1);

        e.redo_field("name", 1).unwrap();
        assert_eq!(e.get("name"), Some(Value::from("b")));
        assert!(matches!(
            e.undo_field("missing", 1),
            Err(CoreError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn entity_history_moves_field_history() {
        let model = ModelDefinition::new("m")
            .field(FieldDefinition::new("name").audit(true))
            .field(FieldDefinition::new("other"))
            .audit(true)
            .build()
            .unwrap();
        let mut e = model.create().unwrap();
        for v in ["a", "b", "c"] {
            e.set("name", v).unwrap();
        }
        e.set("other", "x").unwrap();

        e.undo(2);
        assert_eq!(e.get("name"), Some(Value::from("b")));
        let field_log = e.field("name").and_then(Field::as_data).unwrap().audit_log().unwrap();
        assert_eq!(field_log.current_value(), Some(&Value::from("b")));

        e.redo_field("name", 1).unwrap();
        assert_eq!(e.get("name"), Some(Value::from("c")));
        e.undo(1);
        assert_eq!(e.get("name"), Some(Value::from("b")));
        e.undo_field("name", 1).unwrap();
        assert_eq!(e.get("name"), Some(Value::from("a")));
    }

    fn team_with_summary() -> Entity {
        let person = meta().build().unwrap();
        ModelDefinition::new("team")
            .relationship(RelationshipDefinition::new("lead", Join::One(person)))
            .virtual_field(
                VirtualDefinition::new("lead_name", |scope| {
                    scope
                        .get("lead")
                        .and_then(|lead| lead.as_map().and_then(|m| m.get("firstname").cloned()))
                        .unwrap_or_default()
                })
                .depends_on(["lead"]),
            )
            .build()
            .unwrap()
            .create()
            .unwrap()
    }

    #[test]
    fn loading_a_relationship_is_a_change() {
        let mut team = team_with_summary();
        let updates = recorder(&team, "field.update");
        assert_eq!(team.get("lead_name"), Some(Value::Null));

        let mut lead = BTreeMap::new();
        lead.insert("firstname".to_string(), Value::from("Jill"));
        let change = team.set("lead", Value::Map(lead.clone())).unwrap().unwrap();
        assert_eq!(change.field, "lead");
        assert_ne!(change.old, change.new);
        assert_eq!(team.get("lead_name"), Some(Value::from("Jill")));
        assert_eq!(updates.lock().len(), 1);

        assert!(team.set("lead", Value::Map(lead)).unwrap().is_none());
        assert_eq!(updates.lock().len(), 1);
    }

    #[test]
    fn nested_writes_refresh_dependents() {
        let mut team = team_with_summary();
        assert_eq!(team.get("lead_name"), Some(Value::Null));
        let cleared = recorder(&team, "field.cache.clear");

        let lead = team.relationship_mut("lead").and_then(RelationshipField::entity_mut).unwrap();
        lead.set("firstname", "Ada").unwrap();

        assert_eq!(team.get("lead_name"), Some(Value::from("Ada")));
        assert_eq!(
            cleared.lock().as_slice(),
            &[EntityEvent::CacheClear("lead_name".into())]
        );
    }
}

