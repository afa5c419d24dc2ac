//! Random operation sequences keep store indexes consistent.

use proptest::prelude::*;
use strata_core::CoreError;
use strata_testkit::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn indexes_agree_with_records(ops in prop::collection::vec(store_op_strategy(), 1..60)) {
        init_tracing();
        let mut harness = StoreHarness::new();
        for op in &ops {
            match harness.apply(op) {
                Ok(()) | Err(CoreError::ValidationFailed { .. }) => {}
                Err(other) => prop_assert!(false, "{op:?} failed: {other}"),
            }
            harness.verify();
        }
        prop_assert_eq!(harness.applied(), ops.len());
    }

    #[test]
    fn compaction_preserves_order(rows in prop::collection::vec(person_row_strategy(), 1..20), drop_every in 2usize..5) {
        let mut harness = StoreHarness::new();
        for (first, last, val) in &rows {
            harness.store.add_data(person_data(first, last, *val)).unwrap();
        }
        let ids: Vec<_> = harness.store.iter().map(|e| e.record_id().clone()).collect();
        for id in ids.iter().step_by(drop_every) {
            harness.store.remove(id);
        }
        let survivors: Vec<_> = harness.store.iter().map(|e| e.record_id().clone()).collect();

        harness.store.compact();
        let compacted: Vec<_> = harness.store.iter().map(|e| e.record_id().clone()).collect();
        prop_assert_eq!(&compacted, &survivors);
        prop_assert_eq!(harness.store.len(), survivors.len());
        for (position, id) in compacted.iter().enumerate() {
            prop_assert_eq!(harness.store.index_of(id), Some(position));
        }
        harness.verify();
    }
}
