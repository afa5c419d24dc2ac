//! Nested entities and stores held by relationship fields.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use strata_core::{EntityEvent, RelationshipField, Store, Value};
use strata_testkit::prelude::*;

fn bubbled(team: &strata_core::Entity) -> Arc<Mutex<Vec<(String, String)>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    team.events().on("relationship.update", move |e| {
        if let EntityEvent::RelationshipUpdate { field, event } = e {
            sink.lock().unwrap().push((field.clone(), event.clone()));
        }
    });
    seen
}

#[test]
fn new_team_has_defaults_and_empty_relations() {
    let team = team_model(false).create().unwrap();

    assert_eq!(team.get("title"), Some(Value::from("untitled")));
    assert!(team.is_valid());

    let lead = team.relationship("lead").and_then(RelationshipField::entity).unwrap();
    assert_eq!(lead.get("val"), Some(Value::from(15)));
    assert!(lead.changelog().is_none());

    let members = team.relationship("members").and_then(RelationshipField::store).unwrap();
    assert!(members.is_empty());
}

#[test]
fn audited_lead_keeps_its_own_history() {
    let mut team = team_model(true).create().unwrap();
    assert!(team.changelog().is_none());

    let lead = team.relationship_mut("lead").unwrap();
    assert!(lead.is_audited());
    let person = lead.entity_mut().unwrap();
    person.set("firstname", "John").unwrap();
    person.set("lastname", "Doe").unwrap();
    person.set("firstname", "Jill").unwrap();

    let reverted = lead.undo(1);
    assert_eq!(reverted.len(), 1);
    assert_eq!(reverted[0].new, Value::from("John"));

    let data = team.data();
    let lead = data.get("lead").and_then(Value::as_map).unwrap();
    assert_eq!(lead.get("firstname"), Some(&Value::from("John")));
    assert_eq!(lead.get("lastname"), Some(&Value::from("Doe")));
}

#[test]
fn member_store_events_bubble() {
    let mut team = team_model(false).create().unwrap();
    let seen = bubbled(&team);

    let members = team
        .relationship_mut("members")
        .and_then(RelationshipField::store_mut)
        .unwrap();
    let ada = members.add_data(person_data("Ada", "Lovelace", 12)).unwrap();
    members.set(&ada, "val", 13).unwrap();
    members.remove(&ada);

    let events: Vec<String> = seen.lock().unwrap().iter().map(|(_, e)| e.clone()).collect();
    assert_eq!(events, vec!["record.create", "record.update", "record.delete"]);
    assert!(seen.lock().unwrap().iter().all(|(field, _)| field == "members"));
}

#[test]
fn nested_stores_index_their_members() {
    let mut team = team_model(false).create().unwrap();
    let members = team
        .relationship_mut("members")
        .and_then(RelationshipField::store_mut)
        .unwrap();
    members.create_index("val").unwrap();

    team.set(
        "members",
        Value::Array(vec![
            Value::Map(person_data("Ada", "Lovelace", 12)),
            Value::Map(person_data("Alan", "Turing", 18)),
        ]),
    )
    .unwrap();

    let members = team.relationship("members").and_then(RelationshipField::store).unwrap();
    let young: Vec<_> = members
        .index_range("val", ..15.0)
        .unwrap()
        .iter()
        .map(|e| e.get("firstname").unwrap())
        .collect();
    assert_eq!(young, vec![Value::from("Ada")]);
}

#[test]
fn teams_in_a_store_load_nested_rows() {
    let mut teams = Store::new(team_model(false));

    let mut row = BTreeMap::new();
    row.insert("title".to_string(), Value::from("engines"));
    row.insert("lead".to_string(), Value::Map(person_data("Ada", "Lovelace", 12)));
    row.insert(
        "members".to_string(),
        Value::Array(vec![Value::Map(person_data("Charles", "Babbage", 19))]),
    );
    let id = teams.add_data(row).unwrap();

    let found = teams.find("title", "engines").unwrap();
    assert_eq!(found.len(), 1);

    let json = teams.get_record(&id).unwrap().to_json().unwrap();
    assert_eq!(json["lead"]["firstname"], serde_json::json!("Ada"));
    assert_eq!(json["members"][0]["lastname"], serde_json::json!("Babbage"));
}

#[test]
fn hidden_relationship_leaves_views() {
    let mut team = team_model(false).create().unwrap();
    assert!(team.hide("members").unwrap());
    assert!(!team.hide("members").unwrap());

    assert!(!team.data().contains_key("members"));
    assert!(team.data().contains_key("lead"));

    assert!(team.unhide("members").unwrap());
    assert_eq!(team.data().get("members"), Some(&Value::Array(Vec::new())));
}

#[test]
fn removed_relationship_stops_forwarding_to_views() {
    let mut team = team_model(false).create().unwrap();
    let removed = team.remove_field("lead").unwrap();
    assert!(!team.has_field("lead"));
    assert!(!team.data().contains_key("lead"));
    assert_eq!(removed.name(), "lead");
}
