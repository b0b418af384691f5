//! Order endpoints: create, poll, cancel.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};

fn setup() -> (TestDb, axum::Router, TicketTier) {
    let db = TestDb::new();
    let tier = {
        let conn = db.pool.get().unwrap();
        create_test_catalog(&conn, 5)
    };
    let app = test_app(create_test_app_state(&db, Arc::new(FakeGateway::default())));
    (db, app, tier)
}

fn order_body(tier_id: &str, quantity: i64) -> Value {
    json!({
        "customer": {
            "user_id": "user-1",
            "name": "Dewi",
            "email": "dewi@example.com",
            "phone": "+628123456789"
        },
        "items": [{ "tier_id": tier_id, "quantity": quantity }]
    })
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (_db, app, _tier) = setup();
    let response = send(&app, get("/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_create_order_returns_created_with_items() {
    let (db, app, tier) = setup();

    let response = send(&app, json_request("POST", "/orders", &order_body(&tier.id, 2))).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["status"], "pending");
    assert_eq!(json["kind"], "tickets");
    assert_eq!(json["total_amount"], 200_000);
    assert_eq!(json["currency"], "IDR");
    assert_eq!(json["items"].as_array().unwrap().len(), 1);
    assert_eq!(json["items"][0]["quantity"], 2);

    let conn = db.pool.get().unwrap();
    assert_eq!(tier_available(&conn, &tier.id), 3);
}

#[tokio::test]
async fn test_create_order_over_capacity_is_conflict() {
    let (db, app, tier) = setup();

    let response = send(&app, json_request("POST", "/orders", &order_body(&tier.id, 6))).await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Insufficient inventory");

    let conn = db.pool.get().unwrap();
    assert_eq!(tier_available(&conn, &tier.id), 5);
}

#[tokio::test]
async fn test_create_order_invalid_body_is_bad_request() {
    let (_db, app, tier) = setup();

    let zero = send(&app, json_request("POST", "/orders", &order_body(&tier.id, 0))).await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let missing_customer = json!({ "items": [{ "tier_id": tier.id, "quantity": 1 }] });
    let response = send(&app, json_request("POST", "/orders", &missing_customer)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_order_applies_lazy_expiry() {
    let (db, app, tier) = setup();
    let created = body_json(
        send(&app, json_request("POST", "/orders", &order_body(&tier.id, 2))).await,
    )
    .await;
    let order_id = created["id"].as_str().unwrap().to_string();

    let live = send(&app, get(&format!("/orders/{}", order_id))).await;
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(body_json(live).await["status"], "pending");

    {
        let conn = db.pool.get().unwrap();
        backdate_expiry(&conn, &order_id);
    }

    let expired = send(&app, get(&format!("/orders/{}", order_id))).await;
    assert_eq!(expired.status(), StatusCode::OK);
    assert_eq!(body_json(expired).await["status"], "cancelled");

    let conn = db.pool.get().unwrap();
    assert_eq!(tier_available(&conn, &tier.id), 5);
}

#[tokio::test]
async fn test_get_order_unknown_or_malformed_id_is_not_found() {
    let (_db, app, _tier) = setup();

    let unknown = boxoffice::id::EntityType::Order.gen_id();
    let response = send(&app, get(&format!("/orders/{}", unknown))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, get("/orders/not-an-order")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_paid_order_lists_tickets() {
    let (db, app, tier) = setup();
    let created = body_json(
        send(&app, json_request("POST", "/orders", &order_body(&tier.id, 2))).await,
    )
    .await;
    let order_id = created["id"].as_str().unwrap().to_string();
    let reference = created["external_reference"].as_str().unwrap().to_string();

    {
        let conn = db.pool.get().unwrap();
        mark_awaiting_payment(&conn, &order_id);
    }
    let callback = xendit_callback("evt-1", &reference, "SUCCEEDED").to_string();
    let ack = send(&app, webhook_request(Some(TEST_CALLBACK_TOKEN), &callback)).await;
    assert_eq!(ack.status(), StatusCode::OK);

    let json = body_json(send(&app, get(&format!("/orders/{}", order_id))).await).await;
    assert_eq!(json["status"], "paid");
    let tickets = json["tickets"].as_array().expect("paid order lists tickets");
    assert_eq!(tickets.len(), 2);
    assert!(tickets[0]["code"].as_str().unwrap().starts_with("TKT-"));
}

#[tokio::test]
async fn test_cancel_order_releases_inventory() {
    let (db, app, tier) = setup();
    let created = body_json(
        send(&app, json_request("POST", "/orders", &order_body(&tier.id, 3))).await,
    )
    .await;
    let order_id = created["id"].as_str().unwrap().to_string();

    let response = send(
        &app,
        json_request("POST", &format!("/orders/{}/cancel", order_id), &json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelled");

    let conn = db.pool.get().unwrap();
    assert_eq!(tier_available(&conn, &tier.id), 5);
}

#[tokio::test]
async fn test_cancel_after_payment_started_is_conflict() {
    let (db, app, tier) = setup();
    let created = body_json(
        send(&app, json_request("POST", "/orders", &order_body(&tier.id, 1))).await,
    )
    .await;
    let order_id = created["id"].as_str().unwrap().to_string();
    {
        let conn = db.pool.get().unwrap();
        mark_awaiting_payment(&conn, &order_id);
    }

    let response = send(
        &app,
        json_request("POST", &format!("/orders/{}/cancel", order_id), &json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_get_concert_shows_current_availability() {
    let (_db, app, tier) = setup();
    send(&app, json_request("POST", "/orders", &order_body(&tier.id, 2))).await;

    let response = send(&app, get(&format!("/concerts/{}", tier.concert_id))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["title"], "Test Concert");
    let tiers = json["tiers"].as_array().unwrap();
    assert_eq!(tiers.len(), 1);
    assert_eq!(tiers[0]["total_quantity"], 5);
    assert_eq!(tiers[0]["available_quantity"], 3);

    let missing = send(&app, get("/concerts/bo_con_missing")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}
