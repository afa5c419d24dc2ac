use crate::entity::{Entity, EntityEvent};
use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventEmitter, ListenerId, WeakEmitter, ANY_EVENT};
use crate::field::definition::check_name;
use crate::field::{FieldChange, FieldEvent, Join, RelationshipDefinition};
use crate::store::Store;
use crate::value::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Nested value of a relationship field.
#[derive(Debug)]
pub enum Related {
    /// A single nested entity.
    One(Box<Entity>),
    /// A nested collection.
    Many(Box<Store>),
}

/// A field holding a nested entity or store.
///
/// The nested object is owned by the field. Its events reach the parent
/// entity as `relationship.update` through a weak handle, so the nested
/// object never keeps its parent alive.
#[derive(Debug)]
pub struct RelationshipField {
    name: String,
    hidden: bool,
    audit: bool,
    join: Join,
    related: Related,
    forwarder: Option<ListenerId>,
    nested_changed: Arc<AtomicBool>,
    events: EventEmitter<FieldEvent>,
}

impl RelationshipField {
    pub(crate) fn from_definition(def: RelationshipDefinition) -> CoreResult<Self> {
        check_name(&def.name)?;
        let related = match &def.join {
            Join::One(model) => {
                let mut entity = model.create()?;
                if def.audit {
                    entity.enable_audit();
                }
                Related::One(Box::new(entity))
            }
            Join::Many(model) => Related::Many(Box::new(Store::new(model.clone()))),
        };
        Ok(Self {
            name: def.name,
            hidden: def.hidden,
            audit: def.audit,
            join: def.join,
            related,
            forwarder: None,
            nested_changed: Arc::new(AtomicBool::new(false)),
            events: EventEmitter::new(),
        })
    }

    /// Routes every nested event to `parent` as a relationship update and
    /// marks the nested object as changed.
    pub(crate) fn forward_to(&mut self, parent: WeakEmitter<EntityEvent>) {
        let field = self.name.clone();
        let changed = Arc::clone(&self.nested_changed);
        let id = match &self.related {
            Related::One(entity) => entity.events().on(ANY_EVENT, move |e: &EntityEvent| {
                changed.store(true, Ordering::Release);
                parent.emit(EntityEvent::RelationshipUpdate {
                    field: field.clone(),
                    event: e.name().to_string(),
                });
            }),
            Related::Many(store) => store.events().on(ANY_EVENT, move |e| {
                changed.store(true, Ordering::Release);
                parent.emit(EntityEvent::RelationshipUpdate {
                    field: field.clone(),
                    event: e.name().to_string(),
                });
            }),
        };
        self.forwarder = Some(id);
    }

    /// Whether the nested object emitted anything since the last call.
    pub(crate) fn take_nested_change(&self) -> bool {
        self.nested_changed.swap(false, Ordering::AcqRel)
    }

    /// Snapshot of the nested data: a map for one entity, an array of maps
    /// for a store.
    pub fn value(&self) -> Value {
        match &self.related {
            Related::One(entity) => Value::Map(entity.data()),
            Related::Many(store) => {
                Value::Array(store.iter().map(|e| Value::Map(e.data())).collect())
            }
        }
    }

    /// Loads nested data: a map into the entity, or an array of maps as
    /// new records of the store.
    pub fn load(&mut self, value: Value) -> CoreResult<Vec<FieldChange>> {
        match (&mut self.related, value) {
            (_, Value::Null) => Ok(Vec::new()),
            (Related::One(entity), Value::Map(map)) => entity.load(map),
            (Related::Many(store), Value::Array(items)) => {
                for item in items {
                    match item {
                        Value::Map(map) => {
                            store.add_data(map)?;
                        }
                        other => {
                            return Err(CoreError::type_mismatch(
                                &self.name,
                                "object",
                                other.type_name(),
                            ))
                        }
                    }
                }
                Ok(Vec::new())
            }
            (Related::One(_), other) => Err(CoreError::type_mismatch(
                &self.name,
                "object",
                other.type_name(),
            )),
            (Related::Many(_), other) => Err(CoreError::type_mismatch(
                &self.name,
                "array",
                other.type_name(),
            )),
        }
    }

    /// Undoes `n` changes of the nested entity. A no-op for stores.
    pub fn undo(&mut self, n: usize) -> Vec<FieldChange> {
        match &mut self.related {
            Related::One(entity) => entity.undo(n),
            Related::Many(_) => Vec::new(),
        }
    }

    /// Redoes `n` changes of the nested entity. A no-op for stores.
    pub fn redo(&mut self, n: usize) -> Vec<FieldChange> {
        match &mut self.related {
            Related::One(entity) => entity.redo(n),
            Related::Many(_) => Vec::new(),
        }
    }

    /// Nested object.
    pub fn related(&self) -> &Related {
        &self.related
    }

    /// Nested object, mutable.
    pub fn related_mut(&mut self) -> &mut Related {
        &mut self.related
    }

    /// Nested entity, for single relationships.
    pub fn entity(&self) -> Option<&Entity> {
        match &self.related {
            Related::One(entity) => Some(entity),
            Related::Many(_) => None,
        }
    }

    /// Nested entity, mutable.
    pub fn entity_mut(&mut self) -> Option<&mut Entity> {
        match &mut self.related {
            Related::One(entity) => Some(entity),
            Related::Many(_) => None,
        }
    }

    /// Nested store, for multiple relationships.
    pub fn store(&self) -> Option<&Store> {
        match &self.related {
            Related::Many(store) => Some(store),
            Related::One(_) => None,
        }
    }

    /// Nested store, mutable.
    pub fn store_mut(&mut self) -> Option<&mut Store> {
        match &mut self.related {
            Related::Many(store) => Some(store),
            Related::One(_) => None,
        }
    }

    /// Join this field was built from.
    pub fn join(&self) -> &Join {
        &self.join
    }

    /// Whether the nested entity keeps a changelog because of this field.
    pub fn is_audited(&self) -> bool {
        self.audit
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the field is excluded from serialized views.
    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Hides the field.
    pub fn hide(&mut self) -> bool {
        if self.hidden {
            return false;
        }
        self.hidden = true;
        self.events.emit(FieldEvent::Hidden);
        true
    }

    /// Unhides the field.
    pub fn unhide(&mut self) -> bool {
        if !self.hidden {
            return false;
        }
        self.hidden = false;
        self.events.emit(FieldEvent::Unhidden);
        true
    }

    /// Event emitter for this field.
    pub fn events(&self) -> &EventEmitter<FieldEvent> {
        &self.events
    }
}

impl Drop for RelationshipField {
    fn drop(&mut self) {
        let Some(id) = self.forwarder.take() else {
            return;
        };
        match &self.related {
            Related::One(entity) => {
                entity.events().off(id);
            }
            Related::Many(store) => {
                store.events().off(id);
            }
        }
    }
}
