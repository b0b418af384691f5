use serde_json::Value;

use crate::crypto::sha256_hex;
use crate::error::{AppError, Result};
use crate::models::{CallbackStatus, PaymentCallbackEvent};

use super::decode_reference;

/// Result of looking at an inbound callback body.
#[derive(Debug, Clone)]
pub enum CallbackParse {
    /// A callback about one of our orders
    Event(PaymentCallbackEvent),
    /// Well-formed, but for another event stream sharing the endpoint.
    /// Acknowledge and ignore.
    NotOurs { reference: Option<String> },
}

/// Fields that may carry our reference, in priority order.
const REFERENCE_FIELDS: &[&str] = &["external_id", "reference_id"];

const PAID_STATUSES: &[&str] = &["PAID", "SUCCEEDED", "COMPLETED", "SETTLED", "CAPTURED"];
const FAILED_STATUSES: &[&str] = &["FAILED", "EXPIRED", "VOIDED", "CANCELLED", "CANCELED"];

/// Normalize a raw gateway callback.
///
/// The gateway sends several payload shapes (invoice, virtual account and
/// payment-request callbacks) to the same endpoint, with the interesting
/// fields either at the root or nested under `data`. Root fields win.
pub fn parse_callback(provider: &'static str, body: &[u8], received_at: i64) -> Result<CallbackParse> {
    let raw: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid callback payload: {}", e)))?;
    if !raw.is_object() {
        return Err(AppError::BadRequest("Callback payload must be a JSON object".into()));
    }

    let Some(reference) = REFERENCE_FIELDS
        .iter()
        .find_map(|field| string_field(&raw, field))
    else {
        return Ok(CallbackParse::NotOurs { reference: None });
    };

    let Some((kind, order_id)) = decode_reference(&reference) else {
        return Ok(CallbackParse::NotOurs {
            reference: Some(reference),
        });
    };

    let status = callback_status(&raw);

    let event_id = match gateway_event_id(&raw) {
        Some(id) => format!("{}:{}", id, status.as_ref()),
        None => format!("sha256:{}", sha256_hex(body)),
    };

    let payment_id = string_field(&raw, "payment_id")
        .or_else(|| string_field(&raw, "payment_request_id"))
        .or_else(|| string_field(&raw, "id"));

    Ok(CallbackParse::Event(PaymentCallbackEvent {
        provider,
        event_id,
        external_reference: reference,
        order_id,
        kind,
        status,
        payment_id,
        raw_payload: raw,
        received_at,
    }))
}

/// Look up a non-empty string at the root, then under `data`.
fn string_field(raw: &Value, field: &str) -> Option<String> {
    let non_empty = |v: &Value| {
        v.get(field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    };
    non_empty(raw).or_else(|| raw.get("data").and_then(non_empty))
}

fn callback_status(raw: &Value) -> CallbackStatus {
    match string_field(raw, "status") {
        Some(status) => {
            let status = status.to_ascii_uppercase();
            if PAID_STATUSES.contains(&status.as_str()) {
                CallbackStatus::Paid
            } else if FAILED_STATUSES.contains(&status.as_str()) {
                CallbackStatus::Failed
            } else {
                CallbackStatus::Pending
            }
        }
        // Virtual account payment callbacks carry no status: their existence
        // means money arrived.
        None if string_field(raw, "payment_id").is_some()
            || string_field(raw, "callback_virtual_account_id").is_some() =>
        {
            CallbackStatus::Paid
        }
        None => CallbackStatus::Pending,
    }
}

fn gateway_event_id(raw: &Value) -> Option<String> {
    string_field(raw, "id").or_else(|| string_field(raw, "payment_id"))
}
