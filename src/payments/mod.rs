//! Payment gateway adapter.
//!
//! Outbound: the [`PaymentGateway`] trait and its Xendit implementation, plus
//! a retry wrapper that only retries transient failures.
//! Inbound: [`parse_callback`] turns an arbitrary gateway payload into a
//! [`PaymentCallbackEvent`](crate::models::PaymentCallbackEvent). All field
//! guessing about payload shapes lives there and nowhere else.

mod callback;
mod xendit;

pub use callback::*;
pub use xendit::*;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::error::{AppError, Result};
use crate::id::{EntityType, is_valid_id_of};
use crate::models::OrderKind;

/// Reference prefix for ticket orders.
pub const ORDER_REFERENCE_PREFIX: &str = "ORDER-";
/// Reference prefix for agent registrations.
pub const AGENT_REFERENCE_PREFIX: &str = "AGENT-REG-";

/// Virtual account banks the gateway account is enabled for.
const VA_BANKS: &[&str] = &["BCA", "BNI", "BRI", "MANDIRI", "PERMATA", "BSI", "CIMB"];
/// E-wallet channels the gateway account is enabled for.
const EWALLETS: &[&str] = &["OVO", "DANA", "SHOPEEPAY", "LINKAJA", "ASTRAPAY"];

/// How the customer will pay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    VirtualAccount { bank_code: String },
    #[serde(rename = "ewallet")]
    EWallet { provider: String },
    Qr,
}

impl PaymentMethod {
    /// Parse the `(method, detail)` pair a checkout form submits.
    pub fn parse(method: &str, detail: Option<&str>) -> Result<Self> {
        let detail = detail.map(|d| d.trim().to_ascii_uppercase());
        match method.trim().to_ascii_lowercase().as_str() {
            "virtual_account" | "va" => {
                let bank = detail.ok_or_else(|| {
                    AppError::InvalidPaymentRequest("Virtual account requires a bank code".into())
                })?;
                if !VA_BANKS.contains(&bank.as_str()) {
                    return Err(AppError::InvalidPaymentRequest(format!(
                        "Unsupported bank code: {}",
                        bank
                    )));
                }
                Ok(Self::VirtualAccount { bank_code: bank })
            }
            "ewallet" | "e_wallet" => {
                let provider = detail.ok_or_else(|| {
                    AppError::InvalidPaymentRequest("E-wallet requires a provider".into())
                })?;
                if !EWALLETS.contains(&provider.as_str()) {
                    return Err(AppError::InvalidPaymentRequest(format!(
                        "Unsupported e-wallet: {}",
                        provider
                    )));
                }
                Ok(Self::EWallet { provider })
            }
            "qr" | "qris" => Ok(Self::Qr),
            other => Err(AppError::InvalidPaymentRequest(format!(
                "Unsupported payment method: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualAccount { .. } => "virtual_account",
            Self::EWallet { .. } => "ewallet",
            Self::Qr => "qr",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::VirtualAccount { bank_code } => Some(bank_code),
            Self::EWallet { provider } => Some(provider),
            Self::Qr => None,
        }
    }
}

/// Everything the gateway needs to create an instrument for one order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    /// Also used as the idempotency key
    pub order_id: String,
    pub reference: String,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub description: String,
    pub expires_at: i64,
}

/// What the customer uses to pay: a VA number, a redirect URL or a QR string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInstrument {
    pub payment_id: String,
    pub method: PaymentMethod,
    /// VA account number, checkout URL or QR string, depending on method
    pub display: Option<String>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Network failure, timeout, 5xx or rate limiting; safe to retry
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// The gateway rejected the request itself; retrying cannot help
    #[error("gateway rejected request: {0}")]
    InvalidRequest(String),
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Unavailable(m) => AppError::GatewayUnavailable(m),
            GatewayError::InvalidRequest(m) => AppError::InvalidPaymentRequest(m),
        }
    }
}

pub type GatewayFuture<'a> =
    Pin<Box<dyn Future<Output = std::result::Result<PaymentInstrument, GatewayError>> + Send + 'a>>;

/// Abstraction over the payment provider so handlers and tests can swap it.
pub trait PaymentGateway: Send + Sync {
    /// Short provider name, used as part of the callback dedup key.
    fn provider(&self) -> &'static str;

    /// Create a payment instrument. Must be idempotent on `request.order_id`.
    fn create_payment<'a>(&'a self, request: &'a PaymentRequest) -> GatewayFuture<'a>;
}

/// Backoff schedule for [`create_payment_with_retry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Create a payment, retrying only [`GatewayError::Unavailable`].
///
/// Every attempt sends the same request and therefore the same idempotency
/// key, so a retry after an ambiguous timeout cannot create a second charge.
pub async fn create_payment_with_retry(
    gateway: &dyn PaymentGateway,
    request: &PaymentRequest,
    policy: &RetryPolicy,
) -> Result<PaymentInstrument> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match gateway.create_payment(request).await {
            Ok(instrument) => return Ok(instrument),
            Err(GatewayError::Unavailable(reason)) if attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    order_id = %request.order_id,
                    attempt,
                    ?delay,
                    "Payment gateway unavailable, retrying: {}",
                    reason
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// External reference handed to the gateway for an order.
pub fn encode_reference(kind: OrderKind, order_id: &str) -> String {
    match kind {
        OrderKind::Tickets => format!("{}{}", ORDER_REFERENCE_PREFIX, order_id),
        OrderKind::AgentRegistration => format!("{}{}", AGENT_REFERENCE_PREFIX, order_id),
    }
}

/// Recover `(kind, order_id)` from a reference. Anything else is not ours.
pub fn decode_reference(reference: &str) -> Option<(OrderKind, String)> {
    let reference = reference.trim();
    let (kind, rest) = if let Some(rest) = reference.strip_prefix(AGENT_REFERENCE_PREFIX) {
        (OrderKind::AgentRegistration, rest)
    } else if let Some(rest) = reference.strip_prefix(ORDER_REFERENCE_PREFIX) {
        (OrderKind::Tickets, rest)
    } else {
        return None;
    };
    is_valid_id_of(EntityType::Order, rest).then(|| (kind, rest.to_string()))
}
