//! Secondary index structures.
//!
//! # Index Types
//!
//! - [`BTree`]: ordered multi-way search tree with range walks
//! - [`HashIndex`]: discrete key to record identifiers, one key per record
//! - [`FieldIndex`]: the per-field index a store maintains, choosing one of
//!   the above by the field's declared type

mod btree;
mod engine;
mod hash;

pub use btree::{BTree, DEFAULT_ORDER, MIN_ORDER};
pub use engine::{FieldIndex, IndexKind, NumberKey, OrderedIndex};
pub use hash::HashIndex;
