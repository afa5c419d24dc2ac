//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use strata_core::Value;

/// Strategy for scalar values, including null.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        (-1.0e9f64..1.0e9).prop_map(Value::from),
        "[a-z]{0,12}".prop_map(Value::from),
    ]
}

/// Strategy for values nested up to three levels deep.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_value_strategy().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for a numeric range with `min <= max`; either bound may be
/// open.
pub fn range_bounds_strategy() -> impl Strategy<Value = (Option<f64>, Option<f64>)> {
    (
        prop::option::of(-1000i32..1000),
        prop::option::of(0i32..1000),
    )
        .prop_map(|(min, width)| {
            let min = min.map(f64::from);
            let max = match (min, width) {
                (Some(lo), Some(w)) => Some(lo + f64::from(w)),
                (None, Some(w)) => Some(f64::from(w)),
                (_, None) => None,
            };
            (min, max)
        })
}

/// Strategy for a list of distinct integer keys in random order.
pub fn distinct_keys_strategy(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    prop::collection::hash_set(-10_000i64..10_000, 0..max_len)
        .prop_map(|keys| keys.into_iter().collect())
        .prop_shuffle()
}

/// Strategy for person rows whose `val` is valid for the sample model.
pub fn person_row_strategy() -> impl Strategy<Value = (String, String, i64)> {
    ("[A-Z][a-z]{1,7}", "[A-Z][a-z]{1,9}", 10i64..=20)
}

/// One operation applied to a person store.
#[derive(Debug, Clone)]
pub enum StoreOp {
    /// Add a person.
    Add(String, String, i64),
    /// Remove the record at this live position (modulo the live count).
    Remove(usize),
    /// Assign `val` of the record at this live position.
    SetVal(usize, i64),
    /// Assign `lastname` of the record at this live position.
    SetLastname(usize, String),
    /// Undo one change of the record at this live position.
    Undo(usize),
    /// Drop tombstones.
    Compact,
}

/// Strategy for store operations. `SetVal` may carry invalid values.
pub fn store_op_strategy() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        4 => person_row_strategy().prop_map(|(f, l, v)| StoreOp::Add(f, l, v)),
        2 => any::<usize>().prop_map(StoreOp::Remove),
        3 => (any::<usize>(), 5i64..=25).prop_map(|(i, v)| StoreOp::SetVal(i, v)),
        2 => (any::<usize>(), "[A-Z][a-z]{1,5}").prop_map(|(i, l)| StoreOp::SetLastname(i, l)),
        2 => any::<usize>().prop_map(StoreOp::Undo),
        1 => Just(StoreOp::Compact),
    ]
}
