use axum::extract::State;
use serde::Serialize;

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::models::{Concert, TicketTier};

#[derive(Serialize)]
pub struct ConcertResponse {
    #[serde(flatten)]
    pub concert: Concert,
    pub tiers: Vec<TicketTier>,
}

/// Catalog read for the checkout page. `available_quantity` is a snapshot;
/// the reservation at order time is the only authoritative check.
pub async fn get_concert(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ConcertResponse>> {
    let conn = state.db.get()?;
    let concert = queries::get_concert_by_id(&conn, &id)?.or_not_found(msg::CONCERT_NOT_FOUND)?;
    let tiers = queries::list_ticket_tiers_for_concert(&conn, &concert.id)?;
    Ok(Json(ConcertResponse { concert, tiers }))
}
