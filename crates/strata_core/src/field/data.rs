use crate::error::{CoreError, CoreResult};
use crate::events::EventEmitter;
use crate::field::definition::check_name;
use crate::field::{FieldChange, FieldDefinition, FieldEvent, FieldType};
use crate::log::TransactionLog;
use crate::rule::Rule;
use crate::value::Value;
use std::mem;

/// A stored, validated value.
///
/// Assignment runs through a fixed pipeline: optional autocorrection to the
/// declared type, the required check, then every rule in order. A failing
/// value is rejected with [`CoreError::ValidationFailed`] and the previous
/// value is kept, unless the field allows invalid values, in which case it
/// is stored and [`is_valid`](Self::is_valid) turns `false`.
///
/// With auditing on, every accepted value is committed to a
/// [`TransactionLog`]; [`undo`](Self::undo) and [`redo`](Self::redo) move
/// through it without running validation again.
#[derive(Debug)]
pub struct DataField {
    name: String,
    field_type: FieldType,
    required: bool,
    hidden: bool,
    identifier: bool,
    allow_invalid: bool,
    autocorrect: bool,
    default: Value,
    value: Value,
    rules: Vec<Rule>,
    valid: bool,
    is_new: bool,
    modified: bool,
    log: Option<TransactionLog<Value>>,
    events: EventEmitter<FieldEvent>,
}

impl DataField {
    pub(crate) fn from_definition(def: FieldDefinition) -> CoreResult<Self> {
        check_name(&def.name)?;
        let rules = def.compile_rules()?;
        let field_type = def.resolved_type();
        let default = def.default.clone().unwrap_or_default();

        let log = def.audit.then(|| {
            let mut log = match def.max_history {
                Some(max) => TransactionLog::with_max_entries(max),
                None => TransactionLog::new(),
            };
            if !default.is_null() {
                log.commit(default.clone());
            }
            log
        });

        let mut field = Self {
            name: def.name,
            field_type,
            required: def.required,
            hidden: def.hidden,
            identifier: def.identifier,
            allow_invalid: def.allow_invalid,
            autocorrect: def.autocorrect,
            value: default.clone(),
            default,
            rules,
            valid: true,
            is_new: true,
            modified: false,
            log,
            events: EventEmitter::new(),
        };
        field.valid = field.check(&field.value).is_none();
        Ok(field)
    }

    /// Runs the required check and every rule. Returns why `value` fails,
    /// or `None` if it passes.
    pub fn check(&self, value: &Value) -> Option<String> {
        if value.is_null() {
            return self.required.then(|| "value is required".to_string());
        }
        self.rules
            .iter()
            .find(|rule| !rule.test(value))
            .map(|rule| format!("rule '{}' rejected {}", rule.name(), value))
    }

    /// Assigns a value.
    ///
    /// Returns the change, or `None` when the value equals the current one.
    pub fn set(&mut self, value: impl Into<Value>) -> CoreResult<Option<FieldChange>> {
        let change = self.assign(value.into())?;
        if let Some(change) = &change {
            if !self.valid {
                self.events.emit(FieldEvent::Invalid(change.clone()));
            }
            self.events.emit(FieldEvent::Update(change.clone()));
        }
        Ok(change)
    }

    /// Assignment pipeline without event emission.
    pub(crate) fn assign(&mut self, value: Value) -> CoreResult<Option<FieldChange>> {
        let value = if self.autocorrect {
            self.field_type.coerce(value)
        } else {
            value
        };
        if value == self.value {
            return Ok(None);
        }

        let failure = self.check(&value);
        if let Some(reason) = &failure {
            if !self.allow_invalid {
                return Err(CoreError::validation_failed(&self.name, reason.as_str()));
            }
        }

        let old = mem::replace(&mut self.value, value);
        self.valid = failure.is_none();
        if self.is_new {
            self.is_new = false;
        } else {
            self.modified = true;
        }
        if let Some(log) = &mut self.log {
            log.commit(self.value.clone());
        }

        Ok(Some(FieldChange {
            field: self.name.clone(),
            old,
            new: self.value.clone(),
        }))
    }

    /// Replaces the value from history: no validation, no commit.
    pub(crate) fn restore(&mut self, value: Value) -> Option<FieldChange> {
        if value == self.value {
            return None;
        }
        let old = mem::replace(&mut self.value, value);
        self.valid = self.check(&self.value).is_none();
        Some(FieldChange {
            field: self.name.clone(),
            old,
            new: self.value.clone(),
        })
    }

    /// Steps back `n` entries in the field's history.
    ///
    /// A no-op without auditing or at the start of history.
    pub fn undo(&mut self, n: usize) -> Option<FieldChange> {
        let change = self.step_back(n)?;
        self.events.emit(FieldEvent::Undo(change.clone()));
        Some(change)
    }

    /// Steps forward `n` entries in the field's history.
    ///
    /// A no-op without auditing or at the end of history.
    pub fn redo(&mut self, n: usize) -> Option<FieldChange> {
        let change = self.step_forward(n)?;
        self.events.emit(FieldEvent::Redo(change.clone()));
        Some(change)
    }

    pub(crate) fn step_back(&mut self, n: usize) -> Option<FieldChange> {
        let log = self.log.as_mut()?;
        if !log.rollback(n) {
            return None;
        }
        let target = log.current_value().cloned().unwrap_or_default();
        self.restore(target)
    }

    pub(crate) fn step_forward(&mut self, n: usize) -> Option<FieldChange> {
        let log = self.log.as_mut()?;
        if !log.advance(n) {
            return None;
        }
        let target = log.current_value().cloned().unwrap_or_default();
        self.restore(target)
    }

    /// Restores a value picked by an entity-wide undo or redo and moves the
    /// field's own history to match.
    ///
    /// The cursor steps one entry when the neighbouring entry holds the
    /// restored value. Otherwise the value is committed as a new entry.
    pub(crate) fn restore_in_step(&mut self, value: Value, forward: bool) -> Option<FieldChange> {
        let change = self.restore(value)?;
        let Some(log) = &mut self.log else {
            return Some(change);
        };
        let neighbor = match log.cursor_index() {
            Some(i) if forward => Some(i + 1),
            Some(i) => i.checked_sub(1),
            None => None,
        };
        let in_step = neighbor
            .and_then(|i| log.get(i))
            .is_some_and(|commit| commit.value == self.value);
        let moved = match (in_step, forward) {
            (true, true) => log.advance(1),
            (true, false) => log.rollback(1),
            (false, _) => false,
        };
        if !moved {
            log.commit(self.value.clone());
        }
        Some(change)
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Initial value.
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Declared type.
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Validation rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Whether the current value passed validation.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether no value has been assigned yet.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Whether the first assigned value has since been replaced.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Whether null is rejected.
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Changes whether null is rejected. Does not revalidate.
    pub fn set_required(&mut self, value: bool) {
        self.required = value;
    }

    /// Whether this field identifies the record.
    pub fn is_identifier(&self) -> bool {
        self.identifier
    }

    /// Whether invalid values are stored instead of rejected.
    pub fn allows_invalid(&self) -> bool {
        self.allow_invalid
    }

    /// Stores invalid values from now on, flagging them.
    pub fn allow_invalid(&mut self) {
        self.allow_invalid = true;
    }

    /// Rejects invalid values from now on.
    pub fn disallow_invalid(&mut self) {
        self.allow_invalid = false;
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

    /// History, when auditing.
    pub fn audit_log(&self) -> Option<&TransactionLog<Value>> {
        self.log.as_ref()
    }

    /// Event emitter for this field.
    pub fn events(&self) -> &EventEmitter<FieldEvent> {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Range;
    use parking_lot::Mutex;
    use regex::Regex;
    use std::sync::Arc;

    #[test]
    fn string_field_defaults() {
        let field = FieldDefinition::new("testfield").build().unwrap();
        assert_eq!(field.field_type(), FieldType::String);
        assert!(!field.is_required());
        assert!(field.value().is_null());
        assert!(!field.is_hidden());
        assert!(!field.is_identifier());
        assert_eq!(field.name(), "testfield");
        assert!(field.is_new());
    }

    #[test]
    fn modified_after_second_value() {
        let mut field = FieldDefinition::new("testfield").build().unwrap();
        field.set_required(true);
        assert!(field.is_required());

        field.set("test value").unwrap();
        assert_eq!(field.value(), &Value::from("test value"));
        assert!(!field.is_modified());
        assert!(!field.is_new());

        let err = field.set(1).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
        assert_eq!(field.value(), &Value::from("test value"));

        field.set("changed").unwrap();
        assert!(field.is_modified());
    }

    #[test]
    fn same_value_is_not_a_change() {
        let mut field = FieldDefinition::new("f").build().unwrap();
        field.set("x").unwrap();
        assert!(field.set("x").unwrap().is_none());
        assert!(!field.is_modified());
    }

    #[test]
    fn required_rejects_null() {
        let mut field = FieldDefinition::new("f").required(true).build().unwrap();
        field.set("x").unwrap();
        assert!(field.set(Value::Null).is_err());
        assert_eq!(field.value(), &Value::from("x"));
    }

    #[test]
    fn hide_and_unhide_emit() {
        let mut field = FieldDefinition::new("f").build().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        field
            .events()
            .on(crate::events::ANY_EVENT, move |e| sink.lock().push(e.clone()));

        assert!(field.hide());
        assert!(!field.hide());
        assert!(field.is_hidden());
        assert!(field.unhide());
        assert!(!field.is_hidden());

        assert_eq!(*seen.lock(), vec![FieldEvent::Hidden, FieldEvent::Unhidden]);
    }

    #[test]
    fn update_event_carries_change() {
        let mut field = FieldDefinition::new("f").build().unwrap();
        field.set("before").unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        field.events().once("update", move |e| *sink.lock() = Some(e.clone()));

        field.set("different").unwrap();

        let expected = FieldChange {
            field: "f".into(),
            old: Value::from("before"),
            new: Value::from("different"),
        };
        assert_eq!(*seen.lock(), Some(FieldEvent::Update(expected)));
        assert!(field.is_modified());
    }

    #[test]
    fn custom_rule() {
        let mut field = FieldDefinition::new("testingField")
            .rule(Rule::custom(|v| v.as_text() == Some("ok")))
            .allow_invalid(true)
            .build()
            .unwrap();

        field.set("ok").unwrap();
        assert!(field.is_valid());
        field.set("not ok").unwrap();
        assert!(!field.is_valid());
    }

    #[test]
    fn custom_rule_set() {
        let starts_with_o = Regex::new("^o.*").unwrap();
        let mut field = FieldDefinition::new("testField")
            .rule(Rule::custom(move |v| v.as_text().is_some_and(|s| starts_with_o.is_match(s))))
            .rule(Rule::custom(|v| {
                matches!(v.as_text(), Some("ok") | Some("ok already!"))
            }))
            .allow_invalid(true)
            .build()
            .unwrap();

        field.set("ok").unwrap();
        assert!(field.is_valid());
        field.set("ok already!").unwrap();
        assert!(field.is_valid());
        field.set("not ok").unwrap();
        assert!(!field.is_valid());
        field.set("okie dokie").unwrap();
        assert!(!field.is_valid());
    }

    #[test]
    fn invalid_values_are_flagged_when_allowed() {
        let mut field = FieldDefinition::new("testfield")
            .pattern(Regex::new("^X.*").unwrap())
            .allow_invalid(true)
            .build()
            .unwrap();
        assert_eq!(field.rules().len(), 2);

        field.set("X-test").unwrap();
        assert!(field.is_valid());
        field.set("problemX").unwrap();
        assert!(!field.is_valid());
        assert_eq!(field.value(), &Value::from("problemX"));
    }

    #[test]
    fn toggling_invalid_policy() {
        let mut field = FieldDefinition::new("e")
            .enumeration(["a", "b"])
            .build()
            .unwrap();
        assert!(field.set("x").is_err());

        field.allow_invalid();
        field.set("x").unwrap();
        assert!(!field.is_valid());

        field.disallow_invalid();
        assert!(field.set("y").is_err());
        field.set("b").unwrap();
        assert!(field.is_valid());
    }

    #[test]
    fn number_field_with_ranges_and_autocorrect() {
        let mut field = FieldDefinition::new("testfieldnumber")
            .field_type(FieldType::Number)
            .range(Range::at_most(-50.0))
            .range(Range::between(-10.0, -5.0).unwrap())
            .range(Range::between(10.0, 20.0).unwrap())
            .range("25->50".parse().unwrap())
            .range("100->null".parse().unwrap())
            .autocorrect(true)
            .allow_invalid(true)
            .build()
            .unwrap();
        assert_eq!(field.field_type(), FieldType::Number);
        assert!(field.is_new());

        field.set(0).unwrap();
        assert!(!field.is_valid());
        field.set(150).unwrap();
        assert!(field.is_valid());
        field.set("-3").unwrap();
        assert_eq!(field.value(), &Value::Integer(-3));
        assert!(!field.is_valid());
    }

    #[test]
    fn bounds_are_inclusive() {
        let mut field = FieldDefinition::new("n")
            .min(1.0)
            .max(10.0)
            .allow_invalid(true)
            .build()
            .unwrap();

        field.set(15).unwrap();
        assert!(!field.is_valid());
        field.set(0).unwrap();
        assert!(!field.is_valid());
        field.set(5).unwrap();
        assert!(field.is_valid());
        field.set(1).unwrap();
        assert!(field.is_valid());
        field.set(10).unwrap();
        assert!(field.is_valid());
    }

    #[test]
    fn rejected_value_keeps_prior() {
        let mut field = FieldDefinition::new("n").min(10.0).build().unwrap();
        field.set(12).unwrap();
        let err = field.set(5).unwrap_err();
        assert!(err.to_string().contains("bounds"));
        assert_eq!(field.value(), &Value::from(12));
        assert!(field.is_valid());
    }

    #[test]
    fn audited_undo_redo() {
        let mut field = FieldDefinition::new("test").audit(true).build().unwrap();
        for v in ["a", "b", "c", "d", "e"] {
            field.set(v).unwrap();
        }

        field.undo(1);
        assert_eq!(field.value(), &Value::from("d"));
        field.redo(1);
        assert_eq!(field.value(), &Value::from("e"));
        field.undo(3);
        assert_eq!(field.value(), &Value::from("b"));
        field.redo(3);
        assert_eq!(field.value(), &Value::from("e"));

        field.undo(2);
        field.set("f").unwrap();
        let log = field.audit_log().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log.current_value(), Some(&Value::from("f")));

        field.undo(1);
        assert_eq!(field.value(), &Value::from("c"));
        field.redo(10);
        assert_eq!(field.value(), &Value::from("f"));
    }

    #[test]
    fn undo_without_audit_is_noop() {
        let mut field = FieldDefinition::new("f").build().unwrap();
        field.set("a").unwrap();
        field.set("b").unwrap();
        assert!(field.undo(1).is_none());
        assert_eq!(field.value(), &Value::from("b"));
    }

    #[test]
    fn audited_default_is_first_entry() {
        let mut field = FieldDefinition::new("n")
            .default_value(15)
            .audit(true)
            .build()
            .unwrap();
        assert!(field.is_new());
        field.set(17).unwrap();
        let change = field.undo(1).unwrap();
        assert_eq!(change.new, Value::from(15));
        assert!(field.undo(1).is_none());
    }

    #[test]
    fn restored_values_keep_field_history_in_step() {
        let mut field = FieldDefinition::new("f").audit(true).build().unwrap();
        for v in ["a", "b", "c"] {
            field.set(v).unwrap();
        }

        field.restore_in_step(Value::from("b"), false).unwrap();
        assert_eq!(field.audit_log().unwrap().cursor_index(), Some(1));
        field.restore_in_step(Value::from("c"), true).unwrap();
        assert_eq!(field.audit_log().unwrap().cursor_index(), Some(2));

        field.restore_in_step(Value::from("a"), false).unwrap();
        let log = field.audit_log().unwrap();
        assert_eq!(log.len(), 4);
        assert_eq!(log.current_value(), Some(&Value::from("a")));
        assert!(field.redo(1).is_none());

        field.undo(1);
        assert_eq!(field.value(), &Value::from("c"));
    }
}
