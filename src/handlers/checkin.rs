use axum::{
    Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use chrono::Utc;
use serde::Deserialize;

use crate::checkin::{self, RedeemResult};
use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::{AdminAuth, Json};
use crate::models::Ticket;

#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub code: String,
    /// Scanning device or staff member
    pub operator: String,
}

/// Redeem a scanned code. The status code mirrors the result so scanner
/// apps can branch on it: 200 admitted, 409 already redeemed, 404 unknown.
pub async fn redeem_ticket(
    State(state): State<AppState>,
    Json(request): Json<CheckinRequest>,
) -> Result<(StatusCode, Json<RedeemResult>)> {
    let conn = state.db.get()?;
    let result = checkin::redeem(
        &conn,
        &state.code_signer,
        &request.code,
        &request.operator,
        Utc::now().timestamp(),
    )?;
    let status = match &result {
        RedeemResult::Admitted(_) => StatusCode::OK,
        RedeemResult::AlreadyRedeemed { .. } => StatusCode::CONFLICT,
        RedeemResult::UnknownCode => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(result)))
}

#[derive(Debug, Deserialize)]
pub struct RevertRequest {
    pub code: String,
    /// Administrator performing the override
    pub admin: String,
    pub reason: String,
}

pub async fn revert_redemption(
    _auth: AdminAuth,
    State(state): State<AppState>,
    Json(request): Json<RevertRequest>,
) -> Result<Json<Ticket>> {
    if request.admin.trim().is_empty() || request.reason.trim().is_empty() {
        return Err(AppError::BadRequest("admin and reason are required".into()));
    }
    let mut conn = state.db.get()?;
    let ticket = checkin::revert_redemption(
        &mut conn,
        &request.code,
        request.admin.trim(),
        request.reason.trim(),
        Utc::now().timestamp(),
    )?;
    Ok(Json(ticket))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkin", post(redeem_ticket))
        .route("/checkin/revert", post(revert_redemption))
}
