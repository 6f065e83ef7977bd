use super::*;
use crate::model::{AnimalStatus, Farm};
use chrono::{NaiveDate, Utc};
use serde_json::json;

fn sample_farm() -> Farm {
    Farm {
        id: "0190c3a2-farm".to_string(),
        name: "Green Acres".to_string(),
        location: "Iowa".to_string(),
        size: 120.0,
        production_type: vec!["dairy".to_string()],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn sample_animal() -> Animal {
    Animal {
        id: "0190c3a2-animal".to_string(),
        name: "Bessie".to_string(),
        species: "cow".to_string(),
        breed: "Holstein".to_string(),
        birth_date: NaiveDate::from_ymd_opt(2021, 4, 3).unwrap(),
        farm_id: "0190c3a2-farm".to_string(),
        status: AnimalStatus::Healthy,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn test_farm_event_wire_shape() {
    let event = NotificationEvent::for_farm(Mutation::Created, &sample_farm());

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "FARM_CREATED",
            "farmId": "0190c3a2-farm",
            "farmName": "Green Acres"
        })
    );
}

#[test]
fn test_animal_event_wire_shape() {
    let event = NotificationEvent::for_animal(Mutation::Deleted, &sample_animal());

    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "type": "ANIMAL_DELETED",
            "animalId": "0190c3a2-animal",
            "animalName": "Bessie",
            "farmId": "0190c3a2-farm"
        })
    );
}

#[test]
fn test_mutation_selects_event_type() {
    let farm = sample_farm();
    let animal = sample_animal();

    assert_eq!(
        NotificationEvent::for_farm(Mutation::Updated, &farm).event_type(),
        "FARM_UPDATED"
    );
    assert_eq!(
        NotificationEvent::for_farm(Mutation::Deleted, &farm).event_type(),
        "FARM_DELETED"
    );
    assert_eq!(
        NotificationEvent::for_animal(Mutation::Created, &animal).event_type(),
        "ANIMAL_CREATED"
    );
    assert_eq!(
        NotificationEvent::for_animal(Mutation::Updated, &animal).event_type(),
        "ANIMAL_UPDATED"
    );
}

#[test]
fn test_decode_from_queue_body() {
    let body = br#"{"type":"ANIMAL_UPDATED","animalId":"a1","animalName":"Clover","farmId":"f1"}"#;

    let event: NotificationEvent = serde_json::from_slice(body).unwrap();
    assert_eq!(event.event_type(), "ANIMAL_UPDATED");
    assert_eq!(event.entity_id(), "a1");
    assert_eq!(event.entity_name(), "Clover");
}

#[test]
fn test_decode_rejects_unknown_type() {
    let body = br#"{"type":"BARN_BURNED","farmId":"f1","farmName":"x"}"#;
    assert!(serde_json::from_slice::<NotificationEvent>(body).is_err());
}

#[test]
fn test_display_is_human_readable() {
    let event = NotificationEvent::for_farm(Mutation::Created, &sample_farm());
    assert_eq!(
        event.to_string(),
        "FARM_CREATED farmId=0190c3a2-farm farmName=\"Green Acres\""
    );

    let event = NotificationEvent::for_animal(Mutation::Created, &sample_animal());
    assert_eq!(
        event.to_string(),
        "ANIMAL_CREATED animalId=0190c3a2-animal animalName=\"Bessie\" farmId=0190c3a2-farm"
    );
}
