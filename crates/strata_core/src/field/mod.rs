//! Named, typed value slots.
//!
//! A [`Field`] is one of three kinds:
//!
//! - [`DataField`]: stores a value, validates it against its rules, and
//!   optionally keeps an undo/redo history
//! - [`VirtualField`]: computes its value from sibling fields and caches it
//! - [`RelationshipField`]: holds a nested entity or store
//!
//! All kinds share naming, visibility, and an event emitter; the entity
//! dispatches on the kind for reads and writes.

mod data;
mod definition;
mod relationship;
mod virtual_field;

pub use data::DataField;
pub(crate) use definition::check_name;
pub use definition::{FieldDefinition, Join, RelationshipDefinition, VirtualDefinition};
pub use relationship::{Related, RelationshipField};
pub use virtual_field::{Compute, Scope, VirtualField};

use crate::events::{Event, EventEmitter};
use crate::value::Value;
use std::fmt;

/// Declared shape of a data field's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldType {
    /// Accepts any value.
    Any,
    /// UTF-8 text.
    #[default]
    String,
    /// Integer or float.
    Number,
    /// Integer only.
    Integer,
    /// Boolean.
    Boolean,
    /// List of values.
    Array,
    /// String-keyed map.
    Object,
}

impl FieldType {
    /// Whether `value` has this shape. Null matches every type.
    pub fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) | (FieldType::Any, _) => true,
            (FieldType::String, Value::Text(_)) => true,
            (FieldType::Number, Value::Integer(_) | Value::Float(_)) => true,
            (FieldType::Integer, Value::Integer(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::Array, Value::Array(_)) => true,
            (FieldType::Object, Value::Map(_)) => true,
            _ => false,
        }
    }

    /// Whether an index on this type should be ordered.
    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Number | FieldType::Integer)
    }

    /// Best-effort conversion of `value` to this type.
    ///
    /// Values that cannot be converted are returned unchanged and left for
    /// validation to reject.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (FieldType::Number, Value::Text(s)) => parse_number(&s).unwrap_or(Value::Text(s)),
            (FieldType::Integer, Value::Text(s)) => match s.trim().parse::<i64>() {
                Ok(n) => Value::Integer(n),
                Err(_) => Value::Text(s),
            },
            #[allow(clippy::cast_possible_truncation)]
            (FieldType::Integer, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Value::Integer(f as i64)
            }
            (FieldType::Boolean, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Value::Bool(true),
                "false" | "0" | "no" => Value::Bool(false),
                _ => Value::Text(s),
            },
            (FieldType::Boolean, Value::Integer(n)) if n == 0 || n == 1 => Value::Bool(n == 1),
            (FieldType::String, v @ (Value::Integer(_) | Value::Float(_) | Value::Bool(_))) => {
                Value::Text(v.to_string())
            }
            (_, v) => v,
        }
    }

    /// Infers a type from a sample value.
    pub fn of(value: &Value) -> Option<FieldType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(FieldType::Boolean),
            Value::Integer(_) | Value::Float(_) => Some(FieldType::Number),
            Value::Text(_) => Some(FieldType::String),
            Value::Array(_) => Some(FieldType::Array),
            Value::Map(_) => Some(FieldType::Object),
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(n) = s.parse::<i64>() {
        return Some(Value::Integer(n));
    }
    s.parse::<f64>().ok().map(Value::Float)
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Any => "any",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        };
        f.write_str(name)
    }
}

/// Kind of field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Stored, validated value.
    Data,
    /// Computed value.
    Virtual,
    /// Nested entity or store.
    Relationship,
}

/// A value change on a named field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    /// Field name.
    pub field: String,
    /// Value before the change.
    pub old: Value,
    /// Value after the change.
    pub new: Value,
}

impl FieldChange {
    /// The same change pointing the other way.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            field: self.field.clone(),
            old: self.new.clone(),
            new: self.old.clone(),
        }
    }
}

/// Events emitted by a standalone field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldEvent {
    /// The value changed.
    Update(FieldChange),
    /// The value changed and failed validation.
    Invalid(FieldChange),
    /// History was rolled back.
    Undo(FieldChange),
    /// History was advanced.
    Redo(FieldChange),
    /// The field was hidden.
    Hidden,
    /// The field was unhidden.
    Unhidden,
    /// A virtual field dropped its cached value.
    CacheClear,
}

impl Event for FieldEvent {
    fn name(&self) -> &str {
        match self {
            FieldEvent::Update(_) => "update",
            FieldEvent::Invalid(_) => "invalid",
            FieldEvent::Undo(_) => "undo",
            FieldEvent::Redo(_) => "redo",
            FieldEvent::Hidden => "hidden",
            FieldEvent::Unhidden => "unhidden",
            FieldEvent::CacheClear => "cache.clear",
        }
    }
}

/// A named value slot of any kind.
#[derive(Debug)]
pub enum Field {
    /// Stored value.
    Data(DataField),
    /// Computed value.
    Virtual(VirtualField),
    /// Nested entity or store.
    Relationship(RelationshipField),
}

impl Field {
    /// Field name.
    pub fn name(&self) -> &str {
        match self {
            Field::Data(f) => f.name(),
            Field::Virtual(f) => f.name(),
            Field::Relationship(f) => f.name(),
        }
    }

    /// Kind of field.
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::Data(_) => FieldKind::Data,
            Field::Virtual(_) => FieldKind::Virtual,
            Field::Relationship(_) => FieldKind::Relationship,
        }
    }

    /// Whether the field is excluded from serialized views.
    pub fn is_hidden(&self) -> bool {
        match self {
            Field::Data(f) => f.is_hidden(),
            Field::Virtual(f) => f.is_hidden(),
            Field::Relationship(f) => f.is_hidden(),
        }
    }

    /// Hides the field. Returns `false` if it was already hidden.
    pub fn hide(&mut self) -> bool {
        match self {
            Field::Data(f) => f.hide(),
            Field::Virtual(f) => f.hide(),
            Field::Relationship(f) => f.hide(),
        }
    }

    /// Unhides the field. Returns `false` if it was already visible.
    pub fn unhide(&mut self) -> bool {
        match self {
            Field::Data(f) => f.unhide(),
            Field::Virtual(f) => f.unhide(),
            Field::Relationship(f) => f.unhide(),
        }
    }

    /// Event emitter for this field.
    pub fn events(&self) -> &EventEmitter<FieldEvent> {
        match self {
            Field::Data(f) => f.events(),
            Field::Virtual(f) => f.events(),
            Field::Relationship(f) => f.events(),
        }
    }

    /// The data field inside, if this is one.
    pub fn as_data(&self) -> Option<&DataField> {
        match self {
            Field::Data(f) => Some(f),
            _ => None,
        }
    }

    /// The virtual field inside, if this is one.
    pub fn as_virtual(&self) -> Option<&VirtualField> {
        match self {
            Field::Virtual(f) => Some(f),
            _ => None,
        }
    }

    /// The relationship field inside, if this is one.
    pub fn as_relationship(&self) -> Option<&RelationshipField> {
        match self {
            Field::Relationship(f) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_matches_every_type() {
        for ty in [
            FieldType::Any,
            FieldType::String,
            FieldType::Number,
            FieldType::Boolean,
        ] {
            assert!(ty.matches(&Value::Null));
        }
        assert!(!FieldType::String.matches(&Value::from(1)));
        assert!(FieldType::Number.matches(&Value::from(1.5)));
        assert!(!FieldType::Integer.matches(&Value::from(1.5)));
    }

    #[test]
    fn coercion() {
        assert_eq!(FieldType::Number.coerce(Value::from("-3")), Value::Integer(-3));
        assert_eq!(FieldType::Number.coerce(Value::from("2.5")), Value::Float(2.5));
        assert_eq!(FieldType::Number.coerce(Value::from("abc")), Value::from("abc"));
        assert_eq!(FieldType::Integer.coerce(Value::Float(4.0)), Value::Integer(4));
        assert_eq!(FieldType::Boolean.coerce(Value::from("TRUE")), Value::Bool(true));
        assert_eq!(FieldType::String.coerce(Value::from(7)), Value::from("7"));
    }

    #[test]
    fn inference() {
        assert_eq!(FieldType::of(&Value::from(15)), Some(FieldType::Number));
        assert_eq!(FieldType::of(&Value::Null), None);
    }

    #[test]
    fn reversed_change() {
        let change = FieldChange {
            field: "a".into(),
            old: Value::from(1),
            new: Value::from(2),
        };
        let back = change.reversed();
        assert_eq!(back.old, Value::from(2));
        assert_eq!(back.new, Value::from(1));
    }
}
