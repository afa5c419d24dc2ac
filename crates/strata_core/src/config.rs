//! Store configuration.

use crate::entity::Model;
use crate::error::{CoreError, CoreResult};
use crate::index::DEFAULT_ORDER;
use crate::store::Store;

/// Configuration for building a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Model of the stored records. Required.
    pub model: Option<Model>,

    /// Fields to index when the store is built.
    pub index: Vec<String>,

    /// Order of the B-trees backing numeric indexes.
    pub btree_order: usize,

    /// Whether neighbor navigation wraps around.
    pub cycle: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            model: None,
            index: Vec::new(),
            btree_order: DEFAULT_ORDER,
            cycle: false,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record model.
    #[must_use]
    pub fn model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    /// Adds a field to index.
    #[must_use]
    pub fn index(mut self, field: impl Into<String>) -> Self {
        self.index.push(field.into());
        self
    }

    /// Sets the B-tree order for numeric indexes.
    #[must_use]
    pub const fn btree_order(mut self, order: usize) -> Self {
        self.btree_order = order;
        self
    }

    /// Sets whether neighbor navigation wraps around.
    #[must_use]
    pub const fn cycle(mut self, value: bool) -> Self {
        self.cycle = value;
        self
    }

    /// Builds the store, creating the configured indexes.
    pub fn build(self) -> CoreResult<Store> {
        Store::with_config(self)
    }

    pub(crate) fn take_model(&mut self) -> CoreResult<Model> {
        self.model.take().ok_or(CoreError::MissingModel)
    }
}
