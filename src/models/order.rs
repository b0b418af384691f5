use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Lifecycle status of an order.
///
/// ```text
/// pending ──► awaiting_payment ──► paid
///    │               ├──────────► expired
///    │               └──────────► failed
///    └──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    Paid,
    Expired,
    Failed,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Expired | Self::Failed | Self::Cancelled
        )
    }

    /// Whether `self -> to` is an edge of the state machine.
    pub fn can_transition_to(&self, to: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, to),
            (Pending, AwaitingPayment)
                | (Pending, Cancelled)
                | (AwaitingPayment, Paid)
                | (AwaitingPayment, Expired)
                | (AwaitingPayment, Failed)
        )
    }
}

/// What the order buys. Agent registrations carry no line items; their
/// fulfillment is a role grant instead of tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderKind {
    Tickets,
    AgentRegistration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Human-facing number printed on receipts (BO-YYYYMMDD-XXXXXX)
    pub order_number: String,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub currency: String,
    /// Opaque user id from the identity provider
    pub customer_user_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub payment_method: Option<String>,
    pub payment_method_detail: Option<String>,
    /// Reference string handed to the gateway; decodes back to `id`
    pub external_reference: String,
    /// Gateway-side payment id once an instrument exists
    pub payment_id: Option<String>,
    /// Redirect or display URL / QR string for the instrument
    pub payment_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub paid_at: Option<i64>,
    pub expires_at: i64,
}

impl Order {
    /// Pending or awaiting payment past its deadline.
    pub fn is_overdue(&self, now: i64) -> bool {
        !self.status.is_terminal() && now >= self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub tier_id: String,
    pub quantity: i64,
    pub unit_price: i64,
    pub subtotal: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerInfo {
    pub user_id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub tier_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub customer: CustomerInfo,
    pub items: Vec<OrderItemInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentRegistration {
    pub customer: CustomerInfo,
}

/// Order together with its line items, as returned by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}
