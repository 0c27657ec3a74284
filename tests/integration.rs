use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde_json::{json, Value};
use tower::ServiceExt;

use delivery_dispatch::api::rest::router;
use delivery_dispatch::channels::{
    delivery_channel, driver_channel, FLEET_CHANNEL, FLEET_LOCATION_CHANNEL,
};
use delivery_dispatch::dispatch::arbiter::{handle_driver_response, RespondOutcome};
use delivery_dispatch::dispatch::engine::{broadcast_request, DispatchTarget};
use delivery_dispatch::error::AppError;
use delivery_dispatch::geo::GeoPoint;
use delivery_dispatch::models::delivery::{NewDeliveryRequest, PackageInfo, RequestStatus};
use delivery_dispatch::models::response::ResponseKind;
use delivery_dispatch::observability::metrics::Metrics;
use delivery_dispatch::presence;
use delivery_dispatch::state::AppState;
use delivery_dispatch::store::memory::MemoryStore;
use delivery_dispatch::store::{DeliveryStore, ResponseStore};
use delivery_dispatch::transport::{
    MessageKind, Subscription, SubscriptionId, TransportFabric, WireMessage,
};

fn setup() -> (axum::Router, Arc<AppState>) {
    setup_with_ttl(120)
}

fn setup_with_ttl(ttl_secs: i64) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::in_memory(Duration::seconds(ttl_secs)));
    (router(state.clone()), state)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
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

fn delivery_payload(customer_id: i64) -> Value {
    json!({
        "customer_id": customer_id,
        "pickup": { "lat": -17.8292, "lng": 31.0522 },
        "pickup_address": "12 Samora Machel Ave",
        "dropoff": { "lat": -17.8650, "lng": 31.0100 },
        "dropoff_address": "4 Borrowdale Rd",
        "fare": 8.5,
        "package": { "description": "documents" },
        "recipient_phone": "+263771234567"
    })
}

async fn register_driver(app: &axum::Router, id: i64, name: &str) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/drivers",
            json!({
                "id": id,
                "name": name,
                "phone": format!("+26377000{id:04}"),
                "vehicle": { "make_model": "Honda Fit", "plate": format!("AEZ {id}") }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn create_broadcast_delivery(
    app: &axum::Router,
    customer_id: i64,
    candidates: &[i64],
) -> i64 {
    let mut payload = delivery_payload(customer_id);
    payload["candidate_driver_ids"] = json!(candidates);

    let response = app
        .clone()
        .oneshot(json_request("POST", "/deliveries", payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    body["id"].as_i64().unwrap()
}

async fn respond(
    app: &axum::Router,
    request_id: i64,
    driver_id: i64,
    response: &str,
) -> axum::response::Response {
    app.clone()
        .oneshot(json_request(
            "POST",
            "/bookings/respond",
            json!({
                "request_id": request_id,
                "driver_id": driver_id,
                "response": response
            }),
        ))
        .await
        .unwrap()
}

fn new_request(customer_id: i64) -> NewDeliveryRequest {
    NewDeliveryRequest {
        customer_id,
        pickup: GeoPoint {
            lat: -17.8292,
            lng: 31.0522,
        },
        pickup_address: "12 Samora Machel Ave".to_string(),
        dropoff: GeoPoint {
            lat: -17.8650,
            lng: 31.0100,
        },
        dropoff_address: "4 Borrowdale Rd".to_string(),
        fare: 8.5,
        distance_km: 6.2,
        package: PackageInfo {
            description: "documents".to_string(),
            size: None,
            weight_kg: None,
        },
        recipient_phone: "+263771234567".to_string(),
    }
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _state) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["pending_requests"], 0);
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
    assert!(body.contains("pending_requests"));
}

#[tokio::test]
async fn create_delivery_requires_a_dispatch_target() {
    let (app, _state) = setup();
    let response = app
        .oneshot(json_request("POST", "/deliveries", delivery_payload(1)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_delivery_rejects_out_of_range_pickup() {
    let (app, _state) = setup();
    let mut payload = delivery_payload(1);
    payload["pickup"] = json!({ "lat": 91.0, "lng": 31.05 });
    payload["candidate_driver_ids"] = json!([5]);

    let response = app
        .oneshot(json_request("POST", "/deliveries", payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn first_acceptance_wins_and_later_responses_resolve_correctly() {
    let (app, state) = setup();
    for (id, name) in [(5, "Tawanda"), (6, "Rudo"), (7, "Kuda")] {
        register_driver(&app, id, name).await;
    }

    let request_id = create_broadcast_delivery(&app, 1, &[5, 6, 7]).await;

    // Driver 6 accepts first and wins the claim.
    let response = respond(&app, request_id, 6, "accepted").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "assigned");
    assert_eq!(body["request"]["assigned_driver_id"], 6);
    assert_eq!(body["request"]["status"], "accepted");

    // Driver 7's later acceptance is a conflict, not a generic error.
    let response = respond(&app, request_id, 7, "accepted").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("already accepted by another driver"));

    // Driver 5's rejection is recorded with no state change.
    let response = respond(&app, request_id, 5, "rejected").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "rejection_recorded");

    let response = app
        .oneshot(get_request(&format!(
            "/bookings/status?request_id={request_id}"
        )))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["assigned_driver_id"], 6);

    let responses = state.responses.list_for_request(request_id).await.unwrap();
    assert_eq!(responses.len(), 3);
}

#[tokio::test]
async fn concurrent_acceptances_produce_exactly_one_winner() {
    let state = Arc::new(AppState::in_memory(Duration::seconds(60)));
    let drivers: Vec<i64> = (1..=8).collect();

    let request = broadcast_request(
        &state,
        new_request(1),
        DispatchTarget::Broadcast(drivers.clone()),
    )
    .await
    .unwrap();

    let tasks = drivers.iter().map(|&driver_id| {
        let state = state.clone();
        let request_id = request.id;
        tokio::spawn(async move {
            handle_driver_response(&state, request_id, driver_id, ResponseKind::Accepted).await
        })
    });

    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let winners = results
        .iter()
        .filter(|r| matches!(r, Ok(RespondOutcome::Assigned(_))))
        .count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(AppError::Conflict(_))))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, drivers.len() - 1);

    let stored = state.deliveries.get(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Accepted);
    assert!(stored.assigned_driver_id.is_some());
}

#[tokio::test]
async fn winning_claim_notifies_customer_and_closes_the_fleet() {
    let (app, state) = setup();
    register_driver(&app, 6, "Rudo").await;

    let mut driver = state.fabric.subscribe(&[driver_channel(6)]).await;
    let mut customer = state.fabric.subscribe(&["customer_3".to_string()]).await;
    let mut fleet = state.fabric.subscribe(&[FLEET_CHANNEL.to_string()]).await;

    let request_id = create_broadcast_delivery(&app, 3, &[6]).await;

    // The fan-out lands the full request on the candidate's channel.
    let (_, offer) = driver.recv().await.unwrap();
    assert_eq!(offer.kind, MessageKind::BookingRequest);
    assert_eq!(offer.data["id"], request_id);
    assert_eq!(offer.data["status"], "pending");
    assert_eq!(offer.data["customer_id"], 3);

    let response = respond(&app, request_id, 6, "accepted").await;
    assert_eq!(response.status(), StatusCode::OK);

    // The customer push carries the assignment and the driver's
    // contact/vehicle details.
    let (_, accepted) = customer.recv().await.unwrap();
    assert_eq!(accepted.kind, MessageKind::BookingAccepted);
    assert_eq!(accepted.data["request"]["id"], request_id);
    assert_eq!(accepted.data["request"]["assigned_driver_id"], 6);
    assert_eq!(accepted.data["request"]["status"], "accepted");
    assert_eq!(accepted.data["driver"]["name"], "Rudo");
    assert_eq!(accepted.data["driver"]["phone"], "+263770000006");
    assert_eq!(accepted.data["driver"]["vehicle"]["plate"], "AEZ 6");

    // The fleet notice lets the other candidates stop their countdowns.
    let (_, closed) = fleet.recv().await.unwrap();
    assert_eq!(closed.kind, MessageKind::RequestAccepted);
    assert_eq!(closed.data["request_id"], request_id);
    assert_eq!(closed.data["driver_id"], 6);
    assert!(fleet.try_recv().is_none());
}

#[tokio::test]
async fn rejection_keeps_request_pending_and_publishes_rebroadcast() {
    let (app, state) = setup();
    register_driver(&app, 9, "Nyasha").await;

    let request_id = create_broadcast_delivery(&app, 2, &[9]).await;

    let mut fleet = state.fabric.subscribe(&[FLEET_CHANNEL.to_string()]).await;

    let response = respond(&app, request_id, 9, "rejected").await;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, message) = fleet.recv().await.unwrap();
    assert_eq!(message.kind, MessageKind::RequestRebroadcast);
    assert_eq!(message.data["request_id"], request_id);
    assert_eq!(message.data["rejected_by"], 9);

    let stored = state.deliveries.get(request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert!(stored.assigned_driver_id.is_none());
}

#[tokio::test]
async fn responses_after_expiry_never_change_status() {
    let (app, state) = setup_with_ttl(-1);
    let request_id = create_broadcast_delivery(&app, 3, &[4]).await;

    for kind in ["accepted", "rejected"] {
        let response = respond(&app, request_id, 4, kind).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("expired"));
    }

    let stored = state.deliveries.get(request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert!(stored.assigned_driver_id.is_none());

    let response = app
        .oneshot(get_request(&format!(
            "/bookings/status?request_id={request_id}"
        )))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["expired"], true);
}

#[tokio::test]
async fn responding_to_unknown_request_is_not_found() {
    let (app, _state) = setup();
    let response = respond(&app, 999, 1, "accepted").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_candidate_list_ages_out_through_the_sweep() {
    let (app, state) = setup_with_ttl(-1);
    let request_id = create_broadcast_delivery(&app, 1, &[]).await;

    let stored = state.deliveries.get(request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);

    let expired = state.deliveries.expire_stale(Utc::now()).await.unwrap();
    assert_eq!(expired, vec![request_id]);

    let stored = state.deliveries.get(request_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Expired);
}

#[tokio::test]
async fn location_boundaries_are_inclusive() {
    let (app, _state) = setup();

    for (lat, lng, expected) in [
        (90.0, 0.0, StatusCode::OK),
        (-90.0, 0.0, StatusCode::OK),
        (90.0001, 0.0, StatusCode::BAD_REQUEST),
        (-90.0001, 0.0, StatusCode::BAD_REQUEST),
        (0.0, 180.0, StatusCode::OK),
        (0.0, -180.0, StatusCode::OK),
        (0.0, 180.0001, StatusCode::BAD_REQUEST),
        (0.0, -180.0001, StatusCode::BAD_REQUEST),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                "/drivers/1/location",
                json!({ "lat": lat, "lng": lng }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), expected, "lat={lat} lng={lng}");
    }
}

#[tokio::test]
async fn going_online_without_fresh_coords_never_replays_the_stale_location() {
    let (app, state) = setup();

    // Seed a last-known location, then drop offline.
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/drivers/8/location",
            json!({ "lat": -17.83, "lng": 31.04 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/drivers/8/presence",
            json!({ "online": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut fleet = state
        .fabric
        .subscribe(&[FLEET_LOCATION_CHANNEL.to_string()])
        .await;

    // Coming online without coordinates keeps the stale location on the
    // record but publishes nothing.
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/drivers/8/presence",
            json!({ "online": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["online"], true);
    assert_eq!(body["location"]["lat"], -17.83);
    assert!(fleet.try_recv().is_none());

    // Coming online with fresh coordinates is what announces them.
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/drivers/8/presence",
            json!({ "online": true, "location": { "lat": -17.84, "lng": 31.03 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, ping) = fleet.recv().await.unwrap();
    assert_eq!(ping.kind, MessageKind::DriverLocationUpdate);
    assert_eq!(ping.data["driver_id"], 8);
    assert_eq!(ping.data["location"]["lat"], -17.84);
}

#[tokio::test]
async fn location_pings_reach_the_matched_customer_with_delivery_id() {
    let (app, state) = setup();
    register_driver(&app, 5, "Tawanda").await;

    let mut payload = delivery_payload(7);
    payload["assigned_driver_id"] = json!(5);
    let response = app
        .clone()
        .oneshot(json_request("POST", "/deliveries", payload))
        .await
        .unwrap();
    let request_id = body_json(response).await["id"].as_i64().unwrap();

    let response = respond(&app, request_id, 5, "accepted").await;
    assert_eq!(response.status(), StatusCode::OK);

    let mut customer = state.fabric.subscribe(&["customer_7".to_string()]).await;
    let mut fleet = state
        .fabric
        .subscribe(&[FLEET_LOCATION_CHANNEL.to_string()])
        .await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            "/drivers/5/location",
            json!({ "lat": -17.83, "lng": 31.04, "heading": 270.0, "speed": 12.5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, scoped) = customer.recv().await.unwrap();
    assert_eq!(scoped.kind, MessageKind::DriverLocationUpdate);
    assert_eq!(scoped.data["delivery_id"], request_id);
    assert_eq!(scoped.data["driver_id"], 5);

    let (_, broadcast) = fleet.recv().await.unwrap();
    assert_eq!(broadcast.kind, MessageKind::DriverLocationUpdate);
    assert_eq!(broadcast.data["driver_id"], 5);

    // Poll fallback returns the persisted ping.
    let response = app
        .oneshot(get_request("/drivers/5/location"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["online"], true);
    assert_eq!(body["location"]["lat"], -17.83);
}

#[tokio::test]
async fn chat_messages_are_isolated_per_delivery_channel() {
    let (app, state) = setup();
    let first = create_broadcast_delivery(&app, 1, &[5]).await;
    let second = create_broadcast_delivery(&app, 2, &[5]).await;
    assert_ne!(first, second);

    let mut first_sub = state.fabric.subscribe(&[delivery_channel(first)]).await;
    let mut second_sub = state.fabric.subscribe(&[delivery_channel(second)]).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/deliveries/{first}/messages"),
            json!({
                "sender_type": "customer",
                "sender_id": 1,
                "content": "please call at the gate"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, message) = first_sub.recv().await.unwrap();
    assert_eq!(message.kind, MessageKind::ChatMessage);
    assert_eq!(message.data["delivery_id"], first);
    assert_eq!(message.data["content"], "please call at the gate");

    assert!(second_sub.try_recv().is_none());
}

#[tokio::test]
async fn mark_read_is_idempotent() {
    let (app, _state) = setup();
    let delivery_id = create_broadcast_delivery(&app, 1, &[5]).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/deliveries/{delivery_id}/messages"),
            json!({
                "sender_type": "driver",
                "sender_id": 5,
                "content": "on my way"
            }),
        ))
        .await
        .unwrap();
    let message_id = body_json(response).await["id"].as_i64().unwrap();

    // Bulk mode: the customer marks everything from the other party.
    let mark_all = json!({ "reader": "customer" });
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/deliveries/{delivery_id}/messages/read"),
            mark_all.clone(),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["marked"], 1);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/deliveries/{delivery_id}/messages/read"),
            mark_all,
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["marked"], 0);

    // Single-message mode on an already-read message is a no-op too.
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/deliveries/{delivery_id}/messages/read"),
            json!({ "message_id": message_id }),
        ))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["marked"], 0);

    let response = app
        .oneshot(get_request(&format!("/deliveries/{delivery_id}/messages")))
        .await
        .unwrap();
    let messages = body_json(response).await;
    assert_eq!(messages[0]["is_read"], true);
}

#[tokio::test]
async fn delivery_status_updates_follow_the_transition_table() {
    let (app, state) = setup();
    register_driver(&app, 5, "Tawanda").await;

    let mut payload = delivery_payload(1);
    payload["assigned_driver_id"] = json!(5);
    let response = app
        .clone()
        .oneshot(json_request("POST", "/deliveries", payload))
        .await
        .unwrap();
    let delivery_id = body_json(response).await["id"].as_i64().unwrap();

    respond(&app, delivery_id, 5, "accepted").await;

    let mut customer = state.fabric.subscribe(&["customer_1".to_string()]).await;

    // Only the assigned driver may advance the delivery.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/deliveries/{delivery_id}/status"),
            json!({ "status": "en_route", "driver_id": 99 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/deliveries/{delivery_id}/status"),
            json!({ "status": "en_route", "driver_id": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["delivery_status"], "en_route");

    // Skipping ahead violates the sub-state machine.
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/deliveries/{delivery_id}/status"),
            json!({ "status": "paid", "driver_id": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let (_, push) = customer.recv().await.unwrap();
    assert_eq!(push.kind, MessageKind::BookingStatusUpdate);
    assert_eq!(push.data["status"], "en_route");

    // The transition is mirrored into the chat log as a system note.
    let response = app
        .oneshot(get_request(&format!("/deliveries/{delivery_id}/messages")))
        .await
        .unwrap();
    let messages = body_json(response).await;
    let note = messages
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["message_type"] == "status_update")
        .unwrap();
    assert_eq!(note["sender_type"], "system");
    assert_eq!(note["content"], "en_route");
}

struct FailingFabric;

#[async_trait]
impl TransportFabric for FailingFabric {
    async fn publish(&self, channel: &str, _message: WireMessage) -> Result<(), AppError> {
        Err(AppError::Transport(format!("{channel} unreachable")))
    }

    async fn subscribe(&self, _channels: &[String]) -> Subscription {
        let (_tx, rx) = tokio::sync::mpsc::unbounded_channel();
        Subscription::new(0, rx)
    }

    async fn unsubscribe(&self, _id: SubscriptionId) {}
}

#[tokio::test]
async fn publish_failure_never_blocks_the_persisted_write() {
    let store = Arc::new(MemoryStore::new());
    let state = AppState {
        deliveries: store.clone(),
        responses: store.clone(),
        drivers: store.clone(),
        chat: store,
        fabric: Arc::new(FailingFabric),
        request_ttl: Duration::seconds(60),
        metrics: Metrics::new(),
    };

    let result = presence::update_location(
        &state,
        5,
        serde_json::from_value(json!({ "lat": -17.83, "lng": 31.04 })).unwrap(),
    )
    .await;

    let record = result.unwrap();
    assert!(record.online);
    assert_eq!(record.location.as_ref().unwrap().lat, -17.83);

    let persisted = presence::last_known(&state, 5).await.unwrap();
    assert_eq!(persisted.location.unwrap().lat, -17.83);
    assert_eq!(
        state
            .metrics
            .publish_failures_total
            .with_label_values(&["fleet"])
            .get(),
        1
    );
}
