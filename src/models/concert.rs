use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concert {
    pub id: String,
    pub title: String,
    pub venue: String,
    pub starts_at: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateConcert {
    pub title: String,
    pub venue: String,
    pub starts_at: i64,
}

/// A priced category of tickets with bounded quantity.
///
/// `available_quantity` is only ever changed by the inventory ledger and is
/// guarded by a storage CHECK (0 <= available <= total).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketTier {
    pub id: String,
    pub concert_id: String,
    pub name: String,
    pub price: i64,
    pub total_quantity: i64,
    pub available_quantity: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketTier {
    pub name: String,
    pub price: i64,
    pub total_quantity: i64,
}
