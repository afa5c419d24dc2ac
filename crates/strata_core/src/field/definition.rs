//! Field configuration builders.

use crate::entity::Model;
use crate::error::{CoreError, CoreResult};
use crate::field::{Compute, DataField, FieldType, RelationshipField, VirtualField};
use crate::rule::{Range, RangeRule, Rule};
use crate::value::Value;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Configuration for a data field.
///
/// The field's type is taken from [`field_type`](Self::field_type) when
/// set. Otherwise it is inferred from the default value, then from numeric
/// bounds (any of `min`, `max`, `range` implies a number), and finally
/// falls back to [`FieldType::String`].
#[derive(Debug, Clone, Default)]
pub struct FieldDefinition {
    /// Field name.
    pub name: String,
    /// Declared type.
    pub field_type: Option<FieldType>,
    /// Whether null is rejected.
    pub required: bool,
    /// Whether the field is excluded from serialized views.
    pub hidden: bool,
    /// Whether this field identifies the record.
    pub identifier: bool,
    /// Initial value.
    pub default: Option<Value>,
    /// Inclusive lower bound.
    pub min: Option<f64>,
    /// Inclusive upper bound.
    pub max: Option<f64>,
    /// Accepted numeric ranges.
    pub ranges: Vec<Range>,
    /// Accepted values.
    pub enumeration: Option<Vec<Value>>,
    /// Pattern text values must match.
    pub pattern: Option<Regex>,
    /// Custom rules, evaluated in order.
    pub rules: Vec<Rule>,
    /// Whether to keep an undo/redo history.
    pub audit: bool,
    /// Whether invalid values are stored (flagged) instead of rejected.
    pub allow_invalid: bool,
    /// Whether input is converted to the declared type before validation.
    pub autocorrect: bool,
    /// History capacity when auditing.
    pub max_history: Option<usize>,
}

impl FieldDefinition {
    /// Creates a definition with default options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the declared type.
    #[must_use]
    pub fn field_type(mut self, field_type: FieldType) -> Self {
        self.field_type = Some(field_type);
        self
    }

    /// Sets whether null is rejected.
    #[must_use]
    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    /// Sets whether the field is hidden.
    #[must_use]
    pub fn hidden(mut self, value: bool) -> Self {
        self.hidden = value;
        self
    }

    /// Marks the field as the record identifier.
    #[must_use]
    pub fn identifier(mut self, value: bool) -> Self {
        self.identifier = value;
        self
    }

    /// Sets the initial value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Sets the inclusive lower bound.
    #[must_use]
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Sets the inclusive upper bound.
    #[must_use]
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Adds an accepted numeric range.
    #[must_use]
    pub fn range(mut self, range: Range) -> Self {
        self.ranges.push(range);
        self
    }

    /// Restricts values to `values`.
    #[must_use]
    pub fn enumeration<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.enumeration = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Requires text values to match `pattern`.
    #[must_use]
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// Adds a custom rule.
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Sets whether to keep an undo/redo history.
    #[must_use]
    pub fn audit(mut self, value: bool) -> Self {
        self.audit = value;
        self
    }

    /// Sets whether invalid values are stored instead of rejected.
    #[must_use]
    pub fn allow_invalid(mut self, value: bool) -> Self {
        self.allow_invalid = value;
        self
    }

    /// Sets whether input is converted to the declared type.
    #[must_use]
    pub fn autocorrect(mut self, value: bool) -> Self {
        self.autocorrect = value;
        self
    }

    /// Caps the undo/redo history.
    #[must_use]
    pub fn max_history(mut self, entries: usize) -> Self {
        self.max_history = Some(entries);
        self
    }

    /// Type the field will have once built.
    pub fn resolved_type(&self) -> FieldType {
        if let Some(ty) = self.field_type {
            return ty;
        }
        if let Some(ty) = self.default.as_ref().and_then(FieldType::of) {
            return ty;
        }
        if self.min.is_some() || self.max.is_some() || !self.ranges.is_empty() {
            return FieldType::Number;
        }
        FieldType::String
    }

    /// Assembles the validation rules, in evaluation order: type, custom
    /// rules, pattern, enumeration, ranges, bounds.
    pub(crate) fn compile_rules(&self) -> CoreResult<Vec<Rule>> {
        let mut rules = Vec::new();

        let ty = self.resolved_type();
        if ty != FieldType::Any {
            rules.push(Rule::custom(move |v| ty.matches(v)).named("type"));
        }
        rules.extend(self.rules.iter().cloned());
        if let Some(pattern) = &self.pattern {
            rules.push(Rule::pattern(pattern.clone()));
        }
        if let Some(values) = &self.enumeration {
            rules.push(Rule::enumeration(values.iter().cloned()));
        }
        if !self.ranges.is_empty() {
            rules.push(Rule::from(RangeRule::new("range", self.ranges.clone())));
        }
        if self.min.is_some() || self.max.is_some() {
            let bounds = Range::new(self.min, self.max)?;
            rules.push(Rule::from(RangeRule::new("bounds", vec![bounds])));
        }
        Ok(rules)
    }

    /// Builds a standalone data field.
    pub fn build(self) -> CoreResult<DataField> {
        DataField::from_definition(self)
    }
}

/// Configuration for a virtual field.
#[derive(Clone)]
pub struct VirtualDefinition {
    /// Field name.
    pub name: String,
    /// Value function.
    pub compute: Compute,
    /// Sibling fields the value depends on. Empty means every field.
    pub dependencies: Vec<String>,
    /// Whether the field is excluded from serialized views.
    pub hidden: bool,
    /// Whether computed values are cached.
    pub caching: bool,
    /// Scope used when the field is read on its own.
    pub scope: BTreeMap<String, Value>,
}

impl VirtualDefinition {
    /// Creates a definition around a value function.
    pub fn new<F>(name: impl Into<String>, compute: F) -> Self
    where
        F: Fn(&dyn crate::field::Scope) -> Value + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            compute: Arc::new(compute),
            dependencies: Vec::new(),
            hidden: false,
            caching: true,
            scope: BTreeMap::new(),
        }
    }

    /// Declares the sibling fields the value reads.
    #[must_use]
    pub fn depends_on<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether the field is hidden.
    #[must_use]
    pub fn hidden(mut self, value: bool) -> Self {
        self.hidden = value;
        self
    }

    /// Sets whether computed values are cached.
    #[must_use]
    pub fn caching(mut self, value: bool) -> Self {
        self.caching = value;
        self
    }

    /// Adds a value to the standalone scope.
    #[must_use]
    pub fn scope_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope.insert(name.into(), value.into());
        self
    }

    /// Builds a standalone virtual field.
    pub fn build(self) -> VirtualField {
        VirtualField::from_definition(self)
    }
}

impl fmt::Debug for VirtualDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualDefinition")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("hidden", &self.hidden)
            .field("caching", &self.caching)
            .finish_non_exhaustive()
    }
}

/// What a relationship field holds.
#[derive(Debug, Clone)]
pub enum Join {
    /// A single nested entity of this model.
    One(Model),
    /// A nested store of entities of this model.
    Many(Model),
}

impl Join {
    /// Model of the nested records.
    pub fn model(&self) -> &Model {
        match self {
            Join::One(model) | Join::Many(model) => model,
        }
    }
}

/// Configuration for a relationship field.
#[derive(Debug, Clone)]
pub struct RelationshipDefinition {
    /// Field name.
    pub name: String,
    /// Nested model and cardinality.
    pub join: Join,
    /// Whether the nested entity records a changelog.
    pub audit: bool,
    /// Whether the field is excluded from serialized views.
    pub hidden: bool,
}

impl RelationshipDefinition {
    /// Creates a definition joining `join`.
    pub fn new(name: impl Into<String>, join: Join) -> Self {
        Self {
            name: name.into(),
            join,
            audit: false,
            hidden: false,
        }
    }

    /// Sets whether the nested entity records a changelog.
    #[must_use]
    pub fn audit(mut self, value: bool) -> Self {
        self.audit = value;
        self
    }

    /// Sets whether the field is hidden.
    #[must_use]
    pub fn hidden(mut self, value: bool) -> Self {
        self.hidden = value;
        self
    }

    /// Builds a standalone relationship field.
    pub fn build(self) -> CoreResult<RelationshipField> {
        RelationshipField::from_definition(self)
    }
}

pub(crate) fn check_name(name: &str) -> CoreResult<()> {
    if name.trim().is_empty() {
        return Err(CoreError::invalid_config("field name must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_inference_order() {
        assert_eq!(FieldDefinition::new("a").resolved_type(), FieldType::String);
        assert_eq!(
            FieldDefinition::new("a").default_value(15).resolved_type(),
            FieldType::Number
        );
        assert_eq!(
            FieldDefinition::new("a").min(10.0).resolved_type(),
            FieldType::Number
        );
        assert_eq!(
            FieldDefinition::new("a")
                .field_type(FieldType::Boolean)
                .default_value("x")
                .resolved_type(),
            FieldType::Boolean
        );
    }

    #[test]
    fn rule_order() {
        let def = FieldDefinition::new("a")
            .pattern(Regex::new("^X").unwrap())
            .rule(Rule::custom(|_| true).named("mine"))
            .enumeration(["Xa", "Xb"]);
        let names: Vec<String> = def
            .compile_rules()
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names, vec!["type", "mine", "pattern", "enum"]);
    }

    #[test]
    fn inverted_bounds_fail_to_build() {
        let result = FieldDefinition::new("n").min(50.0).max(10.0).build();
        assert!(matches!(result, Err(CoreError::InvalidRange { .. })));
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(FieldDefinition::new("  ").build().is_err());
    }
}
