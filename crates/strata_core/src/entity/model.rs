//! Entity models.
//!
//! A [`Model`] is a validated, shareable entity type. It is built once from
//! a [`ModelDefinition`] and then stamps out [`Entity`] instances, each with
//! its own freshly built fields.
//!
//! # Example
//!
//! ```rust,ignore
//! let person = ModelDefinition::new("person")
//!     .id_field("testid")
//!     .field(FieldDefinition::new("firstname"))
//!     .field(FieldDefinition::new("val").min(10.0).max(20.0).default_value(15))
//!     .virtual_field(
//!         VirtualDefinition::new("label", |s| format!("test {}", s.get("val").unwrap_or_default()).into())
//!             .depends_on(["val"]),
//!     )
//!     .build()?;
//!
//! let mut record = person.create()?;
//! record.set("firstname", "Corey")?;
//! ```

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldDefinition, FieldType, RelationshipDefinition, VirtualDefinition};
use crate::ids::{default_generator, SharedIdGenerator};
use crate::value::Value;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Name of the identifier field when none is configured.
pub const DEFAULT_ID_FIELD: &str = "id";

/// Definition of one field of a model.
#[derive(Debug, Clone)]
pub enum FieldSpec {
    /// Stored, validated field.
    Data(FieldDefinition),
    /// Computed field.
    Virtual(VirtualDefinition),
    /// Nested entity or store.
    Relationship(RelationshipDefinition),
}

impl FieldSpec {
    /// Field name.
    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Data(def) => &def.name,
            FieldSpec::Virtual(def) => &def.name,
            FieldSpec::Relationship(def) => &def.name,
        }
    }
}

impl From<FieldDefinition> for FieldSpec {
    fn from(def: FieldDefinition) -> Self {
        FieldSpec::Data(def)
    }
}

impl From<VirtualDefinition> for FieldSpec {
    fn from(def: VirtualDefinition) -> Self {
        FieldSpec::Virtual(def)
    }
}

impl From<RelationshipDefinition> for FieldSpec {
    fn from(def: RelationshipDefinition) -> Self {
        FieldSpec::Relationship(def)
    }
}

/// Builder for a [`Model`].
#[derive(Clone)]
pub struct ModelDefinition {
    /// Model name.
    pub name: String,
    /// Name of the identifier field. Defaults to [`DEFAULT_ID_FIELD`].
    pub id_field: Option<String>,
    /// Whether new entities get their identifier field set to their record id.
    pub autoid: bool,
    /// Field definitions, in declaration order.
    pub fields: Vec<FieldSpec>,
    /// Field name to serialized key.
    pub fieldmap: BTreeMap<String, String>,
    /// Whether entities keep a changelog across fields.
    pub audit: bool,
    /// Changelog capacity when auditing.
    pub max_history: Option<usize>,
    /// Source of record and commit identifiers.
    pub ids: SharedIdGenerator,
}

impl ModelDefinition {
    /// Starts a definition with no fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the identifier field name.
    #[must_use]
    pub fn id_field(mut self, name: impl Into<String>) -> Self {
        self.id_field = Some(name.into());
        self
    }

    /// Sets whether new entities get an identifier automatically.
    #[must_use]
    pub fn autoid(mut self, value: bool) -> Self {
        self.autoid = value;
        self
    }

    /// Adds a field of any kind.
    #[must_use]
    pub fn field(mut self, spec: impl Into<FieldSpec>) -> Self {
        self.fields.push(spec.into());
        self
    }

    /// Adds a virtual field.
    #[must_use]
    pub fn virtual_field(self, def: VirtualDefinition) -> Self {
        self.field(def)
    }

    /// Adds a relationship field.
    #[must_use]
    pub fn relationship(self, def: RelationshipDefinition) -> Self {
        self.field(def)
    }

    /// Serializes `field` under `key`.
    #[must_use]
    pub fn map_field(mut self, field: impl Into<String>, key: impl Into<String>) -> Self {
        self.fieldmap.insert(field.into(), key.into());
        self
    }

    /// Sets whether entities keep a changelog.
    #[must_use]
    pub fn audit(mut self, value: bool) -> Self {
        self.audit = value;
        self
    }

    /// Caps the changelog.
    #[must_use]
    pub fn max_history(mut self, entries: usize) -> Self {
        self.max_history = Some(entries);
        self
    }

    /// Uses `ids` for record and commit identifiers.
    #[must_use]
    pub fn id_generator(mut self, ids: SharedIdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Validates the definition and builds the model.
    pub fn build(self) -> CoreResult<Model> {
        Model::new(self)
    }
}

impl Default for ModelDefinition {
    fn default() -> Self {
        Self {
            name: String::new(),
            id_field: None,
            autoid: false,
            fields: Vec::new(),
            fieldmap: BTreeMap::new(),
            audit: false,
            max_history: None,
            ids: default_generator(),
        }
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("name", &self.name)
            .field("id_field", &self.id_field)
            .field("autoid", &self.autoid)
            .field("fields", &self.fields)
            .field("fieldmap", &self.fieldmap)
            .field("audit", &self.audit)
            .field("max_history", &self.max_history)
            .finish_non_exhaustive()
    }
}

struct ModelInner {
    name: String,
    id_field: String,
    autoid: bool,
    fields: Vec<FieldSpec>,
    fieldmap: BTreeMap<String, String>,
    inverse: BTreeMap<String, String>,
    audit: bool,
    max_history: Option<usize>,
    ids: SharedIdGenerator,
}

/// A validated entity type. Cheap to clone.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Validates `def` and builds the model.
    ///
    /// Fails when a field name repeats, a field definition does not build,
    /// a virtual field depends on an unknown field, or the field map names
    /// an unknown field. A missing identifier field is added as an untyped
    /// data field.
    pub fn new(def: ModelDefinition) -> CoreResult<Self> {
        if def.name.trim().is_empty() {
            return Err(CoreError::invalid_config("model name must not be empty"));
        }

        let mut fields = def.fields;
        let id_field = def
            .id_field
            .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());

        let mut seen = HashSet::new();
        for spec in &fields {
            if !seen.insert(spec.name().to_string()) {
                return Err(CoreError::duplicate_field(spec.name()));
            }
        }

        match fields.iter_mut().find(|s| s.name() == id_field) {
            Some(FieldSpec::Data(id_def)) => id_def.identifier = true,
            Some(_) => {
                return Err(CoreError::invalid_config(format!(
                    "identifier field '{id_field}' must be a data field"
                )))
            }
            None => {
                seen.insert(id_field.clone());
                fields.push(FieldSpec::Data(
                    FieldDefinition::new(id_field.as_str())
                        .field_type(FieldType::Any)
                        .identifier(true),
                ));
            }
        }

        for spec in &fields {
            match spec {
                FieldSpec::Data(field) => {
                    field.clone().build()?;
                }
                FieldSpec::Virtual(field) => {
                    crate::field::check_name(&field.name)?;
                    if let Some(missing) = field.dependencies.iter().find(|d| !seen.contains(*d)) {
                        return Err(CoreError::invalid_config(format!(
                            "virtual field '{}' depends on unknown field '{missing}'",
                            field.name
                        )));
                    }
                }
                FieldSpec::Relationship(field) => crate::field::check_name(&field.name)?,
            }
        }

        let mut inverse = BTreeMap::new();
        for (field, key) in &def.fieldmap {
            if !seen.contains(field) {
                return Err(CoreError::field_not_found(field.as_str()));
            }
            if inverse.insert(key.clone(), field.clone()).is_some() {
                return Err(CoreError::invalid_config(format!(
                    "serialized key '{key}' is mapped twice"
                )));
            }
        }

        Ok(Self {
            inner: Arc::new(ModelInner {
                name: def.name,
                id_field,
                autoid: def.autoid,
                fields,
                fieldmap: def.fieldmap,
                inverse,
                audit: def.audit,
                max_history: def.max_history,
                ids: def.ids,
            }),
        })
    }

    /// Creates an entity with default field values.
    pub fn create(&self) -> CoreResult<Entity> {
        Entity::new(self.clone())
    }

    /// Creates an entity and loads `data` into it.
    ///
    /// Keys go through the inverse field map; unknown keys are ignored.
    pub fn create_with(&self, data: BTreeMap<String, Value>) -> CoreResult<Entity> {
        let mut entity = self.create()?;
        entity.load(data)?;
        Ok(entity)
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Name of the identifier field.
    pub fn id_field(&self) -> &str {
        &self.inner.id_field
    }

    /// Whether entities get their identifier automatically.
    pub fn is_autoid(&self) -> bool {
        self.inner.autoid
    }

    /// Field definitions, in declaration order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.inner.fields
    }

    /// Definition of the named field.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.inner.fields.iter().find(|s| s.name() == name)
    }

    /// Declared type of the named data field.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        match self.field(name)? {
            FieldSpec::Data(def) => Some(def.resolved_type()),
            _ => None,
        }
    }

    /// Serialized key for `field`.
    pub fn map_key<'a>(&'a self, field: &'a str) -> &'a str {
        self.inner
            .fieldmap
            .get(field)
            .map_or(field, String::as_str)
    }

    /// Field name for serialized `key`.
    pub fn unmap_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.inner.inverse.get(key).map_or(key, String::as_str)
    }

    /// Field name to serialized key.
    pub fn fieldmap(&self) -> &BTreeMap<String, String> {
        &self.inner.fieldmap
    }

    /// Whether entities keep a changelog.
    pub fn is_audited(&self) -> bool {
        self.inner.audit
    }

    /// Changelog capacity.
    pub fn max_history(&self) -> Option<usize> {
        self.inner.max_history
    }

    /// Source of record and commit identifiers.
    pub fn ids(&self) -> &SharedIdGenerator {
        &self.inner.ids
    }

    /// Whether `other` is the same model.
    pub fn same_as(&self, other: &Model) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.name() == other.name()
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("id_field", &self.inner.id_field)
            .field("fields", &self.inner.fields.len())
            .field("audit", &self.inner.audit)
            .finish_non_exhaustive()
    }
}
