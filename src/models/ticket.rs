use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RedemptionState {
    Issued,
    Redeemed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub order_id: String,
    pub order_item_id: String,
    pub tier_id: String,
    /// Position within the order item (1..=quantity)
    pub seq: i64,
    pub code: String,
    pub redemption_state: RedemptionState,
    pub redeemed_at: Option<i64>,
    /// Scanning device or operator that admitted the holder
    pub redeemed_by: Option<String>,
    pub created_at: i64,
}

/// What the door staff sees after a successful scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckinContext {
    pub ticket_id: String,
    pub code: String,
    pub order_id: String,
    pub order_number: String,
    pub holder_name: String,
    pub tier_name: String,
    pub concert_id: String,
    pub concert_title: String,
    pub venue: String,
    pub starts_at: i64,
    pub redeemed_at: Option<i64>,
    pub redeemed_by: Option<String>,
}
