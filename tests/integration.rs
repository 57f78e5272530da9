use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tower::ServiceExt;
use uuid::Uuid;

use ride_dispatch::api::rest::router;
use ride_dispatch::config::Config;
use ride_dispatch::engine::fare::FareTable;
use ride_dispatch::models::event::{OutboundEvent, Topic};
use ride_dispatch::notify::EventNotifier;
use ride_dispatch::oracle::{DistanceOracle, GeodesicOracle};
use ride_dispatch::state::AppState;

fn test_config(offer_window: Duration) -> Config {
    Config {
        http_port: 0,
        log_level: "info".to_string(),
        event_buffer_size: 64,
        search_radius_km: 50.0,
        max_notified_drivers: 3,
        offer_window,
        sweep_interval: Duration::from_secs(30),
        routing_url: None,
        average_speed_kmh: 40.0,
        currency: "INR".to_string(),
        fares: FareTable::default(),
    }
}

fn setup_with_window(offer_window: Duration) -> (axum::Router, Arc<AppState>) {
    let config = test_config(offer_window);
    let notifier = EventNotifier::new(config.event_buffer_size);
    let oracle = DistanceOracle::Geodesic(GeodesicOracle {
        average_speed_kmh: config.average_speed_kmh,
    });
    let state = Arc::new(AppState::new(config, oracle, notifier));
    (router(state.clone()), state)
}

fn setup() -> (axum::Router, Arc<AppState>) {
    setup_with_window(Duration::from_secs(30))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn actor_request(method: &str, uri: &str, actor_id: Uuid, role: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-actor-id", actor_id.to_string())
        .header("x-actor-role", role);

    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(lat: f64, lng: f64, address: &str) -> Value {
    json!({ "point": { "lat": lat, "lng": lng }, "address": address })
}

fn ride_request_body() -> Value {
    json!({
        "pickup": location(12.9716, 77.5946, "MG Road"),
        "dropoff": location(12.9352, 77.6245, "Koramangala"),
        "vehicle_class": "car"
    })
}

async fn upsert_driver(app: &axum::Router, driver_id: Uuid, lat: f64, lng: f64, class: &str) {
    let response = app
        .clone()
        .oneshot(actor_request(
            "PUT",
            "/drivers/location",
            driver_id,
            "driver",
            Some(json!({
                "position": { "lat": lat, "lng": lng },
                "available": true,
                "vehicle_class": class
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn request_ride(app: &axum::Router, customer_id: Uuid) -> Value {
    let response = app
        .clone()
        .oneshot(actor_request(
            "POST",
            "/rides/request",
            customer_id,
            "customer",
            Some(ride_request_body()),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    body_json(response).await
}

async fn wait_for_status_event(
    rx: &mut broadcast::Receiver<OutboundEvent>,
    status: &str,
) -> OutboundEvent {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed");
        if event.topic == Topic::RideStatusUpdate && event.payload["status"] == status {
            return event;
        }
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["rides"], 0);
    assert_eq!(body["drivers"], 0);
    assert_eq!(body["active_searches"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_searches"));
}

#[tokio::test]
async fn missing_identity_headers_returns_401() {
    let (app, _state) = setup();
    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/rides/active")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn driver_location_upsert_is_idempotent() {
    let (app, state) = setup();
    let driver_id = Uuid::new_v4();

    for _ in 0..3 {
        upsert_driver(&app, driver_id, 12.9716, 77.5946, "car").await;
    }

    assert_eq!(state.registry.len(), 1);
    let entry = state.registry.get(driver_id).unwrap();
    assert!(entry.available);
}

#[tokio::test]
async fn customer_cannot_update_driver_location() {
    let (app, _state) = setup();
    let response = app
        .oneshot(actor_request(
            "PUT",
            "/drivers/location",
            Uuid::new_v4(),
            "customer",
            Some(json!({ "position": { "lat": 12.97, "lng": 77.59 } })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ride_request_with_invalid_fields_returns_field_errors() {
    let (app, _state) = setup();
    let response = app
        .oneshot(actor_request(
            "POST",
            "/rides/request",
            Uuid::new_v4(),
            "customer",
            Some(json!({
                "pickup": location(999.0, 77.5946, ""),
                "dropoff": location(12.9352, 77.6245, "Koramangala"),
                "vehicle_class": "car"
            })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    let errors = body["errors"].as_array().unwrap();
    let fields: Vec<&str> = errors
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"pickup.point.lat"));
    assert!(fields.contains(&"pickup.address"));
}

#[tokio::test]
async fn ride_request_with_no_drivers_resolves_immediately() {
    let (app, state) = setup();
    let mut events = state.notifier.subscribe();

    let ride = request_ride(&app, Uuid::new_v4()).await;
    assert_eq!(ride["status"], "no_drivers_found");

    let event = wait_for_status_event(&mut events, "no_drivers_found").await;
    assert_eq!(event.payload["ride_id"], ride["id"]);
}

#[tokio::test]
async fn duplicate_ride_request_is_a_conflict() {
    let (app, _state) = setup();
    let customer_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    upsert_driver(&app, driver_id, 12.9720, 77.5950, "car").await;
    let first = request_ride(&app, customer_id).await;
    assert_eq!(first["status"], "searching");

    let response = app
        .oneshot(actor_request(
            "POST",
            "/rides/request",
            customer_id,
            "customer",
            Some(ride_request_body()),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn first_acceptance_wins_second_gets_conflict() {
    let (app, state) = setup();
    let customer_id = Uuid::new_v4();
    let d1 = Uuid::new_v4();
    let d2 = Uuid::new_v4();

    upsert_driver(&app, d1, 12.9720, 77.5950, "car").await;
    upsert_driver(&app, d2, 12.9730, 77.5960, "car").await;

    let ride = request_ride(&app, customer_id).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    assert_eq!(ride["status"], "searching");

    let response = app
        .clone()
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            d1,
            "driver",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let accepted = body_json(response).await;
    assert_eq!(accepted["status"], "accepted");
    assert_eq!(accepted["driver_id"], d1.to_string());
    assert!(!state.registry.is_available(d1));

    let response = app
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            d2,
            "driver",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // loser's attempt left the ride untouched
    let ride = state
        .rides
        .get(&ride_id.parse::<Uuid>().unwrap())
        .unwrap()
        .value()
        .clone();
    assert_eq!(ride.driver_id, Some(d1));
}

#[tokio::test]
async fn customer_cannot_accept_a_ride() {
    let (app, _state) = setup();
    let response = app
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{}/accept", Uuid::new_v4()),
            Uuid::new_v4(),
            "customer",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unregistered_driver_cannot_accept() {
    let (app, _state) = setup();
    let customer_id = Uuid::new_v4();
    let registered = Uuid::new_v4();

    upsert_driver(&app, registered, 12.9720, 77.5950, "car").await;
    let ride = request_ride(&app, customer_id).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let response = app
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            Uuid::new_v4(),
            "driver",
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn rejecting_the_last_candidate_resolves_without_waiting() {
    let (app, state) = setup();
    let customer_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    upsert_driver(&app, driver_id, 12.9720, 77.5950, "car").await;
    let mut events = state.notifier.subscribe();

    let ride = request_ride(&app, customer_id).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    assert_eq!(ride["status"], "searching");

    let response = app
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{ride_id}/reject"),
            driver_id,
            "driver",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rejected = body_json(response).await;
    assert_eq!(rejected["status"], "no_drivers_found");

    let event = wait_for_status_event(&mut events, "no_drivers_found").await;
    assert_eq!(event.payload["ride_id"].as_str(), Some(ride_id.as_str()));
    assert!(state.matches.is_empty());
}

#[tokio::test]
async fn offer_window_expiry_abandons_the_search() {
    let (app, state) = setup_with_window(Duration::from_millis(200));
    let customer_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    upsert_driver(&app, driver_id, 12.9720, 77.5950, "car").await;
    let mut events = state.notifier.subscribe();

    let ride = request_ride(&app, customer_id).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    assert_eq!(ride["status"], "searching");

    // nobody accepts or rejects; the 200ms test window lapses
    let event = wait_for_status_event(&mut events, "no_drivers_found").await;
    assert_eq!(event.payload["ride_id"].as_str(), Some(ride_id.as_str()));

    let response = app
        .oneshot(actor_request(
            "GET",
            &format!("/rides/{ride_id}"),
            customer_id,
            "customer",
            None,
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "no_drivers_found");
    assert!(state.matches.is_empty());
}

#[tokio::test]
async fn full_lifecycle_to_completion() {
    let (app, state) = setup();
    let customer_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    upsert_driver(&app, driver_id, 12.9720, 77.5950, "car").await;
    let mut events = state.notifier.subscribe();

    let ride = request_ride(&app, customer_id).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();
    assert!(ride["estimated_fare"].as_f64().unwrap() > 0.0);

    for (path, expected_status) in [
        ("accept", "accepted"),
        ("arrived", "driver_arrived"),
        ("start", "started"),
    ] {
        let response = app
            .clone()
            .oneshot(actor_request(
                "POST",
                &format!("/rides/{ride_id}/{path}"),
                driver_id,
                "driver",
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], expected_status);
    }

    let response = app
        .clone()
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{ride_id}/end"),
            driver_id,
            "driver",
            Some(json!({})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let completed = body_json(response).await;
    assert_eq!(completed["status"], "completed");

    // ~5.6 km trip at 12/km clears the 60 minimum
    let final_fare = completed["final_fare"].as_f64().unwrap();
    assert!(final_fare >= 60.0);
    assert!(completed["final_distance_km"].as_f64().unwrap() > 0.0);
    assert!(completed["ended_at"].is_string());

    // driver freed for the next ride
    assert!(state.registry.is_available(driver_id));

    let payment = loop {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for payment event")
            .expect("event channel closed");
        if event.topic == Topic::RideCompletedForPayment {
            break event;
        }
    };
    assert_eq!(payment.payload["amount"].as_f64().unwrap(), final_fare);
    assert_eq!(payment.payload["currency"], "INR");

    let response = app
        .oneshot(actor_request(
            "GET",
            "/rides/history",
            customer_id,
            "customer",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let history = body_json(response).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "completed");
}

#[tokio::test]
async fn customer_cancellation_frees_the_bound_driver() {
    let (app, state) = setup();
    let customer_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    upsert_driver(&app, driver_id, 12.9720, 77.5950, "car").await;
    let ride = request_ride(&app, customer_id).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{ride_id}/accept"),
            driver_id,
            "driver",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!state.registry.is_available(driver_id));

    let response = app
        .clone()
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{ride_id}/cancel"),
            customer_id,
            "customer",
            Some(json!({ "reason": "changed my plans" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled = body_json(response).await;
    assert_eq!(cancelled["status"], "cancelled_by_customer");
    assert_eq!(cancelled["cancellation_reason"], "changed my plans");
    assert!(state.registry.is_available(driver_id));
}

#[tokio::test]
async fn cancellation_requires_a_reason() {
    let (app, _state) = setup();
    let response = app
        .oneshot(actor_request(
            "POST",
            &format!("/rides/{}/cancel", Uuid::new_v4()),
            Uuid::new_v4(),
            "customer",
            Some(json!({ "reason": "  " })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn only_involved_parties_or_admin_can_view_a_ride() {
    let (app, _state) = setup();
    let customer_id = Uuid::new_v4();

    let ride = request_ride(&app, customer_id).await;
    let ride_id = ride["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(actor_request(
            "GET",
            &format!("/rides/{ride_id}"),
            Uuid::new_v4(),
            "customer",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(actor_request(
            "GET",
            &format!("/rides/{ride_id}"),
            Uuid::new_v4(),
            "admin",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn active_ride_reflects_the_current_search() {
    let (app, _state) = setup();
    let customer_id = Uuid::new_v4();
    let driver_id = Uuid::new_v4();

    upsert_driver(&app, driver_id, 12.9720, 77.5950, "car").await;

    let response = app
        .clone()
        .oneshot(actor_request("GET", "/rides/active", customer_id, "customer", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let ride = request_ride(&app, customer_id).await;

    let response = app
        .oneshot(actor_request("GET", "/rides/active", customer_id, "customer", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let active = body_json(response).await;
    assert_eq!(active["id"], ride["id"]);
    assert_eq!(active["status"], "searching");
}
