// Integration tests for /api/animals

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use herdbook::api::{create_router, AppState};
use herdbook::controller::{Notifier, StoreHandle};
use herdbook::event::NotificationEvent;
use herdbook::queue::{EventPublisher, LogTransport, Outbox, OutboxConfig};
use herdbook::store::DocumentStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tower::ServiceExt;

fn create_test_app() -> (Router, broadcast::Receiver<NotificationEvent>) {
    let store = StoreHandle::new(
        Arc::new(DocumentStore::open(":memory:").unwrap()),
        Duration::from_secs(5),
    );
    let transport = Arc::new(LogTransport::new(64));
    let events = transport.subscribe();
    let publisher = EventPublisher::new(transport, Duration::from_secs(1));
    let (outbox, _task) = Outbox::start(publisher.clone(), OutboxConfig::default());

    let state = AppState::new(store, Notifier::new(publisher, outbox));
    (create_router(state), events)
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn drain(rx: &mut broadcast::Receiver<NotificationEvent>) -> Vec<NotificationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn post(app: &Router, uri: &str, body: Value) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", uri, &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

async fn create_farm(app: &Router, name: &str) -> String {
    let farm = post(
        app,
        "/api/farms",
        json!({"name": name, "location": "Vermont", "size": 40}),
    )
    .await;
    farm["_id"].as_str().unwrap().to_string()
}

async fn create_animal(app: &Router, farm_id: &str, name: &str) -> Value {
    post(
        app,
        "/api/animals",
        json!({
            "name": name,
            "species": "cow",
            "breed": "Jersey",
            "birthDate": "2021-05-02",
            "farmId": farm_id
        }),
    )
    .await
}

#[tokio::test]
async fn test_create_animal() {
    let (app, mut events) = create_test_app();
    let farm_id = create_farm(&app, "Maple Hollow").await;
    drain(&mut events);

    let animal = create_animal(&app, &farm_id, "Daisy").await;
    assert!(animal["_id"].is_string());
    assert_eq!(animal["name"], "Daisy");
    assert_eq!(animal["birthDate"], "2021-05-02");
    assert_eq!(animal["status"], "healthy");
    assert_eq!(animal["farmId"], farm_id.as_str());

    let published = drain(&mut events);
    assert_eq!(published.len(), 1);
    let wire = serde_json::to_value(&published[0]).unwrap();
    assert_eq!(
        wire,
        json!({
            "type": "ANIMAL_CREATED",
            "animalId": animal["_id"],
            "animalName": "Daisy",
            "farmId": farm_id
        })
    );
}

/// Reads embed the owning farm.
#[tokio::test]
async fn test_get_animal_embeds_farm() {
    let (app, _events) = create_test_app();
    let farm_id = create_farm(&app, "Maple Hollow").await;
    let animal = create_animal(&app, &farm_id, "Daisy").await;
    let id = animal["_id"].as_str().unwrap();

    let response = app
        .oneshot(empty_request("GET", &format!("/api/animals/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let view = body_json(response).await;
    assert_eq!(view["_id"], id);
    assert_eq!(view["farmId"], farm_id.as_str());
    assert_eq!(view["farm"]["_id"], farm_id.as_str());
    assert_eq!(view["farm"]["name"], "Maple Hollow");
}

#[tokio::test]
async fn test_list_animals_filtered_by_farm() {
    let (app, _events) = create_test_app();
    let maple = create_farm(&app, "Maple Hollow").await;
    let cedar = create_farm(&app, "Cedar Ridge").await;
    create_animal(&app, &maple, "Daisy").await;
    create_animal(&app, &cedar, "Clover").await;
    create_animal(&app, &maple, "Buttercup").await;

    let response = app
        .clone()
        .oneshot(empty_request("GET", &format!("/api/animals?farmId={}", maple)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let animals = body_json(response).await;
    let names: Vec<&str> = animals
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Daisy", "Buttercup"]);
    assert!(animals
        .as_array()
        .unwrap()
        .iter()
        .all(|a| a["farm"]["name"] == "Maple Hollow"));

    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/animals"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 3);

    // Empty filter value lists everything
    let response = app
        .clone()
        .oneshot(empty_request("GET", "/api/animals?farmId="))
        .await
        .unwrap();
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 3);

    let response = app
        .oneshot(empty_request("GET", "/api/animals?farmId=no-such-farm"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_update_animal_status() {
    let (app, mut events) = create_test_app();
    let farm_id = create_farm(&app, "Maple Hollow").await;
    let animal = create_animal(&app, &farm_id, "Daisy").await;
    let id = animal["_id"].as_str().unwrap();
    drain(&mut events);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/api/animals/{}", id),
            &json!({"status": "sick"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let updated = body_json(response).await;
    assert_eq!(updated["status"], "sick");
    assert_eq!(updated["name"], "Daisy");
    assert_eq!(updated["farm"]["name"], "Maple Hollow");

    let published = drain(&mut events);
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].event_type(), "ANIMAL_UPDATED");

    let response = app
        .oneshot(json_request(
            "PUT",
            &format!("/api/animals/{}", id),
            &json!({"status": "asleep"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(drain(&mut events).is_empty());
}

/// PUT on an unknown id is 404 whatever the body, with no event.
#[tokio::test]
async fn test_update_unknown_animal_returns_404() {
    let (app, mut events) = create_test_app();

    for body in [json!({"name": "Ghost"}), json!({}), json!("not an object")] {
        let response = app
            .clone()
            .oneshot(json_request("PUT", "/api/animals/unknown", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "body: {}", body);
    }

    let response = app
        .clone()
        .oneshot(empty_request("PUT", "/api/animals/unknown"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(drain(&mut events).is_empty());
}

/// An empty PUT body changes nothing but still counts as an update.
#[tokio::test]
async fn test_empty_body_update_of_existing_animal() {
    let (app, mut events) = create_test_app();
    let farm_id = create_farm(&app, "Maple Hollow").await;
    let animal = create_animal(&app, &farm_id, "Daisy").await;
    let id = animal["_id"].as_str().unwrap();
    drain(&mut events);

    let response = app
        .oneshot(empty_request("PUT", &format!("/api/animals/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "Daisy");
    assert_eq!(drain(&mut events).len(), 1);
}

#[tokio::test]
async fn test_delete_animal() {
    let (app, mut events) = create_test_app();
    let farm_id = create_farm(&app, "Maple Hollow").await;
    let animal = create_animal(&app, &farm_id, "Daisy").await;
    let id = animal["_id"].as_str().unwrap();
    drain(&mut events);

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/api/animals/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let published = drain(&mut events);
    assert_eq!(published.len(), 1);
    let wire = serde_json::to_value(&published[0]).unwrap();
    assert_eq!(wire["type"], "ANIMAL_DELETED");
    assert_eq!(wire["animalId"], id);
    assert_eq!(wire["animalName"], "Daisy");
    assert_eq!(wire["farmId"], farm_id.as_str());

    let response = app
        .oneshot(empty_request("GET", &format!("/api/animals/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_animal_validation_errors() {
    let (app, mut events) = create_test_app();

    let invalid = vec![
        json!({"species": "cow", "breed": "Jersey", "birthDate": "2021-05-02", "farmId": "f"}),
        json!({"name": "Daisy", "species": "cow", "breed": "Jersey", "birthDate": "yesterday", "farmId": "f"}),
        json!({"name": "Daisy", "species": "cow", "breed": "Jersey", "birthDate": "2021-05-02"}),
        json!({"name": "Daisy", "species": "cow", "breed": "Jersey", "birthDate": "2021-05-02", "farmId": "f", "status": "zombie"}),
    ];

    for body in invalid {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/api/animals", &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }

    assert!(drain(&mut events).is_empty());
}

/// Animals may reference farms that do not exist; the embedded farm is null.
#[tokio::test]
async fn test_dangling_farm_reference() {
    let (app, _events) = create_test_app();
    let farm_id = create_farm(&app, "Maple Hollow").await;
    let animal = create_animal(&app, &farm_id, "Daisy").await;
    let id = animal["_id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(empty_request("DELETE", &format!("/api/farms/{}", farm_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(empty_request("GET", &format!("/api/animals/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let view = body_json(response).await;
    assert_eq!(view["farmId"], farm_id.as_str());
    assert!(view["farm"].is_null());
}
