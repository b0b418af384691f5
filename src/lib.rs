//! Boxoffice - ticket marketplace back office
//!
//! Payment reconciliation and fulfillment for a concert ticket marketplace:
//! inventory holds, the order state machine, Xendit payment creation and
//! callbacks, ticket code issuance and door check-in.

pub mod checkin;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod id;
pub mod inventory;
pub mod models;
pub mod orders;
pub mod payments;
pub mod tickets;

use axum::Router;

use crate::db::AppState;

/// Full HTTP surface, without middleware layers.
pub fn app(state: AppState) -> Router {
    Router::new()
        // Public endpoints (no auth)
        .merge(handlers::public::router())
        // Gateway callbacks (callback token auth)
        .merge(handlers::webhooks::router())
        // Door check-in; the revert override requires the admin key
        .merge(handlers::checkin::router())
        .with_state(state)
}
