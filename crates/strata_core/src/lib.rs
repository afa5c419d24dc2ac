//! # Strata Core
//!
//! In-memory entity engine for Strata.
//!
//! This crate provides:
//! - Transaction logs with bounded, cursor-based undo/redo
//! - Rule-based field validation with per-field audit history
//! - Computed (virtual) fields with dependency-driven cache invalidation
//! - Entities built from validated models, with nested relationships
//! - Stores with tombstone removal, compaction, and B-tree or hash indexes

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod entity;
mod error;
mod events;
mod field;
mod ids;
mod index;
mod log;
mod rule;
mod store;
mod value;

pub use config::StoreConfig;
pub use entity::{Entity, EntityEvent, FieldSpec, Model, ModelDefinition, DEFAULT_ID_FIELD};
pub use error::{CoreError, CoreResult};
pub use events::{Event, EventEmitter, ListenerId, WeakEmitter, ANY_EVENT};
pub use field::{
    Compute, DataField, Field, FieldChange, FieldDefinition, FieldEvent, FieldKind, FieldType,
    Join, Related, RelationshipDefinition, RelationshipField, Scope, VirtualDefinition,
    VirtualField,
};
pub use ids::{
    default_generator, CommitId, IdGenerator, RecordId, SequentialIds, SharedIdGenerator,
    UuidGenerator,
};
pub use index::{
    BTree, FieldIndex, HashIndex, IndexKind, NumberKey, OrderedIndex, DEFAULT_ORDER, MIN_ORDER,
};
pub use log::{Commit, LogEvent, TransactionLog};
pub use rule::{Predicate, Range, RangeRule, Rule, RuleType};
pub use store::{RecordRef, Store, StoreEvent};
pub use value::Value;
