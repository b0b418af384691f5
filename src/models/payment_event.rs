use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::OrderKind;

/// Payment status as reported by the gateway, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CallbackStatus {
    Paid,
    Failed,
    Pending,
}

/// A gateway callback normalized into our terms.
#[derive(Debug, Clone)]
pub struct PaymentCallbackEvent {
    /// Provider name, part of the dedup key
    pub provider: &'static str,
    /// Gateway-provided event identity, used as dedup key
    pub event_id: String,
    pub external_reference: String,
    /// Order id recovered from the external reference
    pub order_id: String,
    /// Which reference family the callback used
    pub kind: OrderKind,
    pub status: CallbackStatus,
    /// Gateway payment id when the payload carries one
    pub payment_id: Option<String>,
    pub raw_payload: serde_json::Value,
    pub received_at: i64,
}

/// What reconciliation did with an event. Stored on the dedup row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventOutcome {
    Fulfilled,
    Failed,
    Pending,
    AlreadyResolved,
    LatePayment,
    UnknownOrder,
}

/// Row in the dedup store.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentEventRecord {
    pub id: String,
    pub provider: String,
    pub event_id: String,
    pub order_id: Option<String>,
    pub external_reference: String,
    pub reported_status: CallbackStatus,
    pub outcome: Option<EventOutcome>,
    pub payload: String,
    pub received_at: i64,
}
