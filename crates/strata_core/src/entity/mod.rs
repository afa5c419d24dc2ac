//! Entity types and their models.

mod model;
mod record;

pub use model::{FieldSpec, Model, ModelDefinition, DEFAULT_ID_FIELD};
pub use record::{Entity, EntityEvent};
