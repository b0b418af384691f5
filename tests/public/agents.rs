//! Agent registration: order creation and activation through the callback.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::json;

fn registration_body(user_id: &str) -> serde_json::Value {
    json!({
        "customer": {
            "user_id": user_id,
            "name": "Budi",
            "email": "budi@example.com"
        }
    })
}

#[tokio::test]
async fn test_register_agent_end_to_end() {
    let db = TestDb::new();
    let gateway = Arc::new(FakeGateway::default());
    let app = test_app(create_test_app_state(&db, gateway.clone()));

    let response = send(
        &app,
        json_request("POST", "/agents/register", &registration_body("agent-user")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let order = body_json(response).await;
    assert_eq!(order["kind"], "agent_registration");
    assert_eq!(order["total_amount"], AGENT_FEE);
    let order_id = order["id"].as_str().unwrap().to_string();
    let reference = order["external_reference"].as_str().unwrap().to_string();
    assert!(reference.starts_with("AGENT-REG-"));

    // Double submit returns the same open order.
    let again = body_json(
        send(
            &app,
            json_request("POST", "/agents/register", &registration_body("agent-user")),
        )
        .await,
    )
    .await;
    assert_eq!(again["id"], order_id.as_str());

    let pay = send(
        &app,
        json_request(
            "POST",
            &format!("/orders/{}/payment", order_id),
            &json!({ "method": "ewallet", "method_detail": "ovo" }),
        ),
    )
    .await;
    assert_eq!(pay.status(), StatusCode::OK);

    let callback = xendit_callback("evt-agent", &reference, "COMPLETED").to_string();
    for _ in 0..3 {
        let ack = send(&app, webhook_request(Some(TEST_CALLBACK_TOKEN), &callback)).await;
        assert_eq!(ack.status(), StatusCode::OK);
    }

    {
        let conn = db.pool.get().unwrap();
        assert_eq!(order_status(&conn, &order_id), OrderStatus::Paid);
        assert_eq!(queries::count_agents_for_user(&conn, "agent-user").unwrap(), 1);
        assert_eq!(queries::list_role_grants(&conn, "agent-user").unwrap().len(), 1);
    }

    // Already an agent: a new registration is refused.
    let response = send(
        &app,
        json_request("POST", "/agents/register", &registration_body("agent-user")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
