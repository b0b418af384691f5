use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ReservationState {
    /// Quantity taken from the tier, order not resolved yet
    Held,
    /// Quantity returned to the tier
    Released,
    /// Order paid; quantity stays sold
    Consumed,
}

/// Handle returned by the inventory ledger for one tier/quantity hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: String,
    pub order_id: String,
    pub tier_id: String,
    pub quantity: i64,
    pub state: ReservationState,
    pub created_at: i64,
    pub updated_at: i64,
}
