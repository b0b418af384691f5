use axum::{extract::State, http::StatusCode};
use chrono::Utc;

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::models::{CreateAgentRegistration, Order};
use crate::orders;

/// Start an agent registration. Payment goes through the same
/// `/orders/{id}/payment` endpoint; the role is granted on the paid callback.
pub async fn register_agent(
    State(state): State<AppState>,
    Json(request): Json<CreateAgentRegistration>,
) -> Result<(StatusCode, Json<Order>)> {
    let mut conn = state.db.get()?;
    let order = orders::create_agent_registration(
        &mut conn,
        &request,
        state.settings.agent_registration_fee,
        &state.settings.currency,
        state.settings.order_ttl_secs,
        Utc::now().timestamp(),
    )?;
    Ok((StatusCode::CREATED, Json(order)))
}
