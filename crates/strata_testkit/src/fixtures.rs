//! Sample models and test setup helpers.

use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use strata_core::{
    FieldDefinition, Join, Model, ModelDefinition, RelationshipDefinition, SequentialIds,
    SharedIdGenerator, Store, StoreConfig, Value, VirtualDefinition,
};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Identifier generator producing `prefix-1`, `prefix-2`, ...
pub fn sequential_ids(prefix: &str) -> SharedIdGenerator {
    Arc::new(SequentialIds::new(prefix))
}

/// Definition of the sample person model.
///
/// Fields: `firstname`, `lastname`, `val` (number in 10..=20, default 15),
/// `testid` (the identifier), and the virtual `label` rendering
/// `"test {val}"`.
pub fn person_definition() -> ModelDefinition {
    ModelDefinition::new("person")
        .id_field("testid")
        .id_generator(sequential_ids("person"))
        .field(FieldDefinition::new("firstname"))
        .field(FieldDefinition::new("lastname"))
        .field(
            FieldDefinition::new("val")
                .min(10.0)
                .max(20.0)
                .default_value(15),
        )
        .field(FieldDefinition::new("testid"))
        .virtual_field(
            VirtualDefinition::new("label", |scope| {
                let val = scope.get("val").unwrap_or_default();
                Value::from(format!("test {val}"))
            })
            .depends_on(["val"]),
        )
}

/// The sample person model.
pub fn person_model() -> Model {
    person_definition()
        .build()
        .expect("person model is valid")
}

/// The sample person model with an entity changelog.
pub fn audited_person_model() -> Model {
    person_definition()
        .audit(true)
        .build()
        .expect("person model is valid")
}

/// A team model with a single `lead` and many `members`, both people.
pub fn team_model(audit_lead: bool) -> Model {
    let person = person_model();
    ModelDefinition::new("team")
        .id_generator(sequential_ids("team"))
        .field(FieldDefinition::new("title").required(true).default_value("untitled"))
        .relationship(RelationshipDefinition::new("lead", Join::One(person.clone())).audit(audit_lead))
        .relationship(RelationshipDefinition::new("members", Join::Many(person)))
        .build()
        .expect("team model is valid")
}

/// Field values for a person.
pub fn person_data(first: &str, last: &str, val: i64) -> BTreeMap<String, Value> {
    let mut data = BTreeMap::new();
    data.insert("firstname".to_string(), Value::from(first));
    data.insert("lastname".to_string(), Value::from(last));
    data.insert("val".to_string(), Value::from(val));
    data
}

/// An empty person store indexed on `val` and `lastname`.
pub fn person_store(cycle: bool) -> Store {
    StoreConfig::new()
        .model(audited_person_model())
        .index("val")
        .index("lastname")
        .btree_order(4)
        .cycle(cycle)
        .build()
        .expect("person store config is valid")
}
