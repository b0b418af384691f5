mod agents;
mod concerts;
mod orders;

pub use agents::*;
pub use concerts::*;
pub use orders::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/concerts/{id}", get(get_concert))
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
        .route("/orders/{id}/payment", post(request_payment))
        .route("/orders/{id}/cancel", post(cancel_order))
        .route("/agents/register", post(register_agent))
}
