use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::common::{WebhookProvider, WebhookResult, ack, handle_webhook};
use crate::crypto::secrets_match;
use crate::db::AppState;
use crate::error::msg;
use crate::payments::{CallbackParse, XENDIT_PROVIDER, parse_callback};

/// Header carrying the verification token configured in the Xendit dashboard.
const CALLBACK_TOKEN_HEADER: &str = "x-callback-token";

pub struct XenditWebhook;

impl WebhookProvider for XenditWebhook {
    fn provider_name(&self) -> &'static str {
        XENDIT_PROVIDER
    }

    fn verify_request(
        &self,
        headers: &HeaderMap,
        state: &AppState,
    ) -> Result<(), WebhookResult> {
        let Some(token) = headers
            .get(CALLBACK_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            tracing::warn!("{}", msg::MISSING_CALLBACK_TOKEN);
            return Err(ack(StatusCode::UNAUTHORIZED, "error", "missing_token"));
        };

        if !secrets_match(token, &state.settings.callback_token) {
            tracing::warn!("{}", msg::INVALID_CALLBACK_TOKEN);
            return Err(ack(StatusCode::UNAUTHORIZED, "error", "invalid_token"));
        }
        Ok(())
    }

    fn parse_event(&self, body: &Bytes, received_at: i64) -> Result<CallbackParse, WebhookResult> {
        parse_callback(XENDIT_PROVIDER, body, received_at).map_err(|e| {
            tracing::warn!("Malformed Xendit callback: {}", e);
            ack(StatusCode::BAD_REQUEST, "error", "malformed")
        })
    }
}

pub async fn handle_xendit_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    handle_webhook(&XenditWebhook, &state, headers, body).await
}
