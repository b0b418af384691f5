pub mod common;
pub mod xendit;

pub use common::{ReconcileOutcome, process_payment_event};
pub use xendit::handle_xendit_webhook;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/xendit", post(handle_xendit_webhook))
}
