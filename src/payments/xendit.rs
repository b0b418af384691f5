use std::time::Duration;

use chrono::{DateTime, SecondsFormat};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    GatewayError, GatewayFuture, PaymentGateway, PaymentInstrument, PaymentMethod, PaymentRequest,
};

pub const XENDIT_PROVIDER: &str = "xendit";

#[derive(Debug, Deserialize)]
struct PaymentRequestResponse {
    id: String,
    #[serde(default)]
    actions: Vec<PaymentAction>,
    #[serde(default)]
    payment_method: Value,
}

#[derive(Debug, Deserialize)]
struct PaymentAction {
    #[serde(default)]
    url: Option<String>,
}

/// Client for the Xendit Payment Requests API.
#[derive(Debug, Clone)]
pub struct XenditClient {
    client: Client,
    api_base: String,
    secret_key: String,
}

impl XenditClient {
    pub fn new(api_base: &str, secret_key: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::InvalidRequest(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn send(&self, request: &PaymentRequest) -> Result<PaymentInstrument, GatewayError> {
        let response = self
            .client
            .post(format!("{}/payment_requests", self.api_base))
            .basic_auth(&self.secret_key, Some(""))
            .header("Idempotency-key", &request.order_id)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Xendit request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, error_text));
        }

        let body: PaymentRequestResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Xendit response unreadable: {}", e)))?;

        let display = match &request.method {
            PaymentMethod::VirtualAccount { .. } => body
                .payment_method
                .pointer("/virtual_account/channel_properties/virtual_account_number")
                .and_then(Value::as_str)
                .map(String::from),
            PaymentMethod::Qr => body
                .payment_method
                .pointer("/qr_code/channel_properties/qr_string")
                .and_then(Value::as_str)
                .map(String::from),
            PaymentMethod::EWallet { .. } => None,
        }
        .or_else(|| body.actions.into_iter().find_map(|a| a.url));

        Ok(PaymentInstrument {
            payment_id: body.id,
            method: request.method.clone(),
            display,
        })
    }
}

impl PaymentGateway for XenditClient {
    fn provider(&self) -> &'static str {
        XENDIT_PROVIDER
    }

    fn create_payment<'a>(&'a self, request: &'a PaymentRequest) -> GatewayFuture<'a> {
        Box::pin(self.send(request))
    }
}

/// 5xx and 429 are transient; every other 4xx is the request's fault.
fn classify_failure(status: StatusCode, body: String) -> GatewayError {
    let message = format!("Xendit returned {}: {}", status.as_u16(), body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        GatewayError::Unavailable(message)
    } else {
        GatewayError::InvalidRequest(message)
    }
}

fn request_body(request: &PaymentRequest) -> Value {
    let expires_at = DateTime::from_timestamp(request.expires_at, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true));

    let payment_method = match &request.method {
        PaymentMethod::VirtualAccount { bank_code } => json!({
            "type": "VIRTUAL_ACCOUNT",
            "reusability": "ONE_TIME_USE",
            "reference_id": request.reference,
            "virtual_account": {
                "channel_code": bank_code,
                "channel_properties": {
                    "customer_name": request.customer_name,
                    "expires_at": expires_at,
                }
            }
        }),
        PaymentMethod::EWallet { provider } => json!({
            "type": "EWALLET",
            "reusability": "ONE_TIME_USE",
            "reference_id": request.reference,
            "ewallet": {
                "channel_code": provider,
                "channel_properties": {
                    "mobile_number": request.customer_phone,
                }
            }
        }),
        PaymentMethod::Qr => json!({
            "type": "QR_CODE",
            "reusability": "ONE_TIME_USE",
            "reference_id": request.reference,
            "qr_code": {
                "channel_code": "QRIS",
                "channel_properties": {
                    "expires_at": expires_at,
                }
            }
        }),
    };

    json!({
        "reference_id": request.reference,
        "amount": request.amount,
        "currency": request.currency,
        "country": "ID",
        "description": request.description,
        "customer": {
            "reference_id": request.reference,
            "type": "INDIVIDUAL",
            "email": request.customer_email,
            "mobile_number": request.customer_phone,
            "individual_detail": { "given_names": request.customer_name }
        },
        "payment_method": payment_method,
    })
}
