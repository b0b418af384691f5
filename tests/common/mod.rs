//! Test utilities and fixtures for boxoffice integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use rusqlite::Connection;
use serde_json::Value;
use tower::ServiceExt;

pub use boxoffice::crypto::TicketCodeSigner;
pub use boxoffice::db::{AppState, DbPool, Settings, create_pool, init_db, queries};
pub use boxoffice::models::*;
pub use boxoffice::payments::{
    GatewayError, GatewayFuture, PaymentGateway, PaymentInstrument, PaymentRequest, RetryPolicy,
};

pub const TEST_CALLBACK_TOKEN: &str = "test-callback-token";
pub const TEST_ADMIN_KEY: &str = "test-admin-key";
pub const TEST_CODE_SECRET: &[u8] = b"test-ticket-code-secret";
pub const ORDER_TTL_SECS: i64 = 3600;
pub const AGENT_FEE: i64 = 150_000;

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn test_signer() -> TicketCodeSigner {
    TicketCodeSigner::new(TEST_CODE_SECRET).expect("Failed to create test signer")
}

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// File-backed database shared by several pooled connections.
///
/// In-memory SQLite is private to one connection, so anything that
/// exercises concurrency or the HTTP stack needs a real file.
pub struct TestDb {
    pub pool: DbPool,
    path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("boxoffice-test-{}.db", uuid::Uuid::new_v4()));
        let pool = create_pool(path.to_str().expect("temp path is utf-8"))
            .expect("Failed to create test pool");
        {
            let conn = pool.get().unwrap();
            conn.execute_batch("PRAGMA journal_mode = WAL;").unwrap();
            init_db(&conn).expect("Failed to initialize schema");
        }
        Self { pool, path }
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

// ============ Catalog fixtures ============

pub fn create_test_concert(conn: &Connection, title: &str) -> Concert {
    queries::create_concert(
        conn,
        &CreateConcert {
            title: title.to_string(),
            venue: "Test Arena".to_string(),
            starts_at: now() + 7 * 86400,
        },
    )
    .expect("Failed to create test concert")
}

pub fn create_test_tier(conn: &Connection, concert_id: &str, name: &str, price: i64, qty: i64) -> TicketTier {
    queries::create_ticket_tier(
        conn,
        concert_id,
        &CreateTicketTier {
            name: name.to_string(),
            price,
            total_quantity: qty,
        },
    )
    .expect("Failed to create test tier")
}

/// Concert with one tier, returning the tier.
pub fn create_test_catalog(conn: &Connection, qty: i64) -> TicketTier {
    let concert = create_test_concert(conn, "Test Concert");
    create_test_tier(conn, &concert.id, "Regular", 100_000, qty)
}

pub fn test_customer(user_id: &str) -> CustomerInfo {
    CustomerInfo {
        user_id: user_id.to_string(),
        name: format!("Customer {}", user_id),
        email: format!("{}@example.com", user_id),
        phone: None,
    }
}

pub fn order_input(user_id: &str, lines: &[(&str, i64)]) -> CreateOrder {
    CreateOrder {
        customer: test_customer(user_id),
        items: lines
            .iter()
            .map(|(tier_id, quantity)| OrderItemInput {
                tier_id: tier_id.to_string(),
                quantity: *quantity,
            })
            .collect(),
    }
}

pub fn create_test_order(conn: &mut Connection, tier_id: &str, qty: i64) -> OrderWithItems {
    boxoffice::orders::create_order(
        conn,
        &order_input("user-1", &[(tier_id, qty)]),
        "IDR",
        ORDER_TTL_SECS,
        now(),
    )
    .expect("Failed to create test order")
}

/// Move a pending order to awaiting_payment with a fake VA instrument.
pub fn mark_awaiting_payment(conn: &Connection, order_id: &str) {
    let instrument = PaymentInstrument {
        payment_id: format!("pr-{}", order_id),
        method: boxoffice::payments::PaymentMethod::VirtualAccount {
            bank_code: "BCA".to_string(),
        },
        display: Some("8808123456789".to_string()),
    };
    boxoffice::orders::attach_payment(conn, order_id, &instrument, now())
        .expect("Failed to attach payment");
}

pub fn tier_available(conn: &Connection, tier_id: &str) -> i64 {
    queries::get_ticket_tier_by_id(conn, tier_id)
        .unwrap()
        .expect("tier exists")
        .available_quantity
}

pub fn order_status(conn: &Connection, order_id: &str) -> OrderStatus {
    queries::get_order_by_id(conn, order_id)
        .unwrap()
        .expect("order exists")
        .status
}

/// Push an order's deadline into the past.
pub fn backdate_expiry(conn: &Connection, order_id: &str) {
    conn.execute(
        "UPDATE orders SET expires_at = ?1 WHERE id = ?2",
        rusqlite::params![now() - 60, order_id],
    )
    .unwrap();
}

// ============ Callback payloads ============

/// Xendit payment request callback body.
pub fn xendit_callback(event_id: &str, reference: &str, status: &str) -> Value {
    serde_json::json!({
        "event": "payment.succeeded",
        "data": {
            "id": event_id,
            "payment_request_id": format!("pr-{}", event_id),
            "reference_id": reference,
            "status": status,
            "amount": 100000,
            "currency": "IDR"
        }
    })
}

// ============ Fake gateway ============

/// Gateway double: scripted failures, then a deterministic instrument.
/// Records every request it sees.
#[derive(Default)]
pub struct FakeGateway {
    pub calls: AtomicUsize,
    pub unavailable_first: usize,
    pub reject: bool,
    pub requests: Mutex<Vec<PaymentRequest>>,
}

impl FakeGateway {
    pub fn failing(unavailable_first: usize) -> Self {
        Self {
            unavailable_first,
            ..Self::default()
        }
    }

    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentGateway for FakeGateway {
    fn provider(&self) -> &'static str {
        "xendit"
    }

    fn create_payment<'a>(&'a self, request: &'a PaymentRequest) -> GatewayFuture<'a> {
        Box::pin(async move {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.reject {
                return Err(GatewayError::InvalidRequest("amount below minimum".into()));
            }
            if n < self.unavailable_first {
                return Err(GatewayError::Unavailable("503 from gateway".into()));
            }
            Ok(PaymentInstrument {
                payment_id: format!("pr-{}", request.order_id),
                method: request.method.clone(),
                display: Some("8808000011112222".to_string()),
            })
        })
    }
}

// ============ HTTP harness ============

pub fn test_settings() -> Settings {
    Settings {
        order_ttl_secs: ORDER_TTL_SECS,
        agent_registration_fee: AGENT_FEE,
        currency: "IDR".to_string(),
        callback_token: TEST_CALLBACK_TOKEN.to_string(),
        admin_api_key: TEST_ADMIN_KEY.to_string(),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
        },
    }
}

pub fn create_test_app_state(db: &TestDb, gateway: Arc<FakeGateway>) -> AppState {
    AppState {
        db: db.pool.clone(),
        gateway,
        code_signer: Arc::new(test_signer()),
        settings: Arc::new(test_settings()),
    }
}

pub fn test_app(state: AppState) -> Router {
    boxoffice::app(state)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

pub fn webhook_request(token: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/xendit")
        .header("content-type", "application/json");
    if let Some(token) = token {
        builder = builder.header("x-callback-token", token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).expect("Response should be valid JSON")
}
