//! Common webhook handling: callback authentication, dedup and reconciliation.
//!
//! The gateway delivers at-least-once and out of order. Each delivery is
//! reduced to exactly-once effects by two guards that live in storage:
//! the `payment_events` dedup row and the order status CAS. Both are taken
//! inside one IMMEDIATE transaction, so a failure anywhere rolls back the
//! dedup row too and the next delivery replays the whole unit.

use axum::{
    Json,
    body::Bytes,
    http::{HeaderMap, StatusCode},
};
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use serde_json::json;

use crate::crypto::TicketCodeSigner;
use crate::db::{AppState, queries};
use crate::error::Result;
use crate::inventory;
use crate::models::{
    AGENT_ROLE, ActorType, AuditAction, CallbackStatus, EventOutcome, Order, OrderKind,
    OrderStatus, PaymentCallbackEvent,
};
use crate::orders::{self, Transition};
use crate::payments::CallbackParse;
use crate::tickets;

/// Body returned to the gateway for every delivery.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
    pub outcome: &'static str,
}

/// Result type for webhook operations.
pub type WebhookResult = (StatusCode, Json<WebhookAck>);

pub fn ack(code: StatusCode, status: &'static str, outcome: &'static str) -> WebhookResult {
    (code, Json(WebhookAck { status, outcome }))
}

/// What reconciliation did with one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Same event seen before; nothing happened
    Duplicate,
    /// Reference decoded but no such order
    UnknownOrder,
    /// Order was already terminal; carries its status
    AlreadyResolved(OrderStatus),
    /// Paid after the order expired; needs a manual refund
    LatePayment,
    /// This delivery moved the order to paid and fulfilled it
    Fulfilled { tickets_issued: usize },
    /// This delivery moved the order to failed and released its holds
    Failed,
    /// Gateway reports the payment still in flight
    Pending,
}

impl ReconcileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::UnknownOrder => "unknown_order",
            Self::AlreadyResolved(_) => "already_resolved",
            Self::LatePayment => "late_payment",
            Self::Fulfilled { .. } => "fulfilled",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }

    /// Outcome stored on the dedup row. Duplicates never get a row of their own.
    fn event_outcome(&self) -> Option<EventOutcome> {
        match self {
            Self::Duplicate => None,
            Self::UnknownOrder => Some(EventOutcome::UnknownOrder),
            Self::AlreadyResolved(_) => Some(EventOutcome::AlreadyResolved),
            Self::LatePayment => Some(EventOutcome::LatePayment),
            Self::Fulfilled { .. } => Some(EventOutcome::Fulfilled),
            Self::Failed => Some(EventOutcome::Failed),
            Self::Pending => Some(EventOutcome::Pending),
        }
    }
}

/// Trait for payment provider webhook handling.
///
/// Implementors authenticate and parse; [`handle_webhook`] does the rest.
pub trait WebhookProvider: Send + Sync {
    /// Provider name for logging and the dedup key (e.g., "xendit")
    fn provider_name(&self) -> &'static str;

    /// Authenticate the delivery from its headers.
    fn verify_request(&self, headers: &HeaderMap, state: &AppState) -> std::result::Result<(), WebhookResult>;

    /// Parse the body into an event about one of our orders, or `NotOurs`.
    fn parse_event(&self, body: &Bytes, received_at: i64) -> std::result::Result<CallbackParse, WebhookResult>;
}

/// Apply one normalized callback event. Idempotent under redelivery.
pub fn process_payment_event(
    conn: &mut Connection,
    signer: &TicketCodeSigner,
    event: &PaymentCallbackEvent,
    now: i64,
) -> Result<ReconcileOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Dropping the transaction on any early return or error rolls this back.
    if !queries::try_record_payment_event(&tx, event)? {
        return Ok(ReconcileOutcome::Duplicate);
    }

    let outcome = reconcile(&tx, signer, event, now)?;

    if let Some(stored) = outcome.event_outcome() {
        queries::set_payment_event_outcome(&tx, event.provider, &event.event_id, stored)?;
    }
    tx.commit()?;

    Ok(outcome)
}

fn reconcile(
    conn: &Connection,
    signer: &TicketCodeSigner,
    event: &PaymentCallbackEvent,
    now: i64,
) -> Result<ReconcileOutcome> {
    let Some(order) = queries::get_order_by_id(conn, &event.order_id)? else {
        tracing::warn!(
            reference = %event.external_reference,
            event_id = %event.event_id,
            "Callback for unknown order"
        );
        return Ok(ReconcileOutcome::UnknownOrder);
    };
    if order.kind != event.kind {
        tracing::warn!(
            order_id = %order.id,
            reference = %event.external_reference,
            "Callback reference family does not match order kind"
        );
        return Ok(ReconcileOutcome::UnknownOrder);
    }

    let order = orders::expire_if_due(conn, &order.id, now)?;

    match (order.status, event.status) {
        // A timed-out or abandoned order can still be charged if its
        // instrument was created; the money has to be refunded by hand.
        (OrderStatus::Expired | OrderStatus::Cancelled, CallbackStatus::Paid) => {
            record_late_payment(conn, &order, event)
        }
        (status, _) if status.is_terminal() => Ok(ReconcileOutcome::AlreadyResolved(status)),
        (_, CallbackStatus::Pending) => Ok(ReconcileOutcome::Pending),
        (status, reported) => {
            // A result can outrun our own bookkeeping of the instrument.
            if status == OrderStatus::Pending {
                orders::transition(
                    conn,
                    &order.id,
                    OrderStatus::Pending,
                    OrderStatus::AwaitingPayment,
                    now,
                )?;
            }
            if let Some(payment_id) = &event.payment_id {
                queries::set_order_payment_id_if_missing(conn, &order.id, payment_id)?;
            }
            match reported {
                CallbackStatus::Paid => fulfill(conn, signer, &order, event, now),
                _ => fail(conn, &order, now),
            }
        }
    }
}

fn fulfill(
    conn: &Connection,
    signer: &TicketCodeSigner,
    order: &Order,
    event: &PaymentCallbackEvent,
    now: i64,
) -> Result<ReconcileOutcome> {
    if let Transition::AlreadyResolved(status) = orders::transition(
        conn,
        &order.id,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        now,
    )? {
        return Ok(ReconcileOutcome::AlreadyResolved(status));
    }

    inventory::finalize_for_order(conn, &order.id, now)?;
    let issued = tickets::issue_for_order(conn, signer, &order.id, now)?;

    if order.kind == OrderKind::AgentRegistration {
        let created = queries::try_create_agent(conn, &order.customer_user_id, &order.id, now)?;
        let granted =
            queries::try_grant_role(conn, &order.customer_user_id, AGENT_ROLE, Some(&order.id), now)?;
        if created || granted {
            queries::create_audit_log(
                conn,
                ActorType::Gateway,
                Some(event.provider),
                AuditAction::GrantAgentRole,
                "user",
                &order.customer_user_id,
                Some(&json!({ "order_id": order.id, "role": AGENT_ROLE })),
            )?;
        }
        tracing::info!(
            order_id = %order.id,
            user_id = %order.customer_user_id,
            "Agent activated"
        );
    }

    queries::create_audit_log(
        conn,
        ActorType::Gateway,
        Some(event.provider),
        AuditAction::FulfillOrder,
        "order",
        &order.id,
        Some(&json!({
            "event_id": event.event_id,
            "tickets_issued": issued.created,
            "amount": order.total_amount,
            "currency": order.currency,
        })),
    )?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        tickets_issued = issued.created,
        "Order fulfilled"
    );
    Ok(ReconcileOutcome::Fulfilled {
        tickets_issued: issued.created,
    })
}

fn fail(conn: &Connection, order: &Order, now: i64) -> Result<ReconcileOutcome> {
    match orders::transition(
        conn,
        &order.id,
        OrderStatus::AwaitingPayment,
        OrderStatus::Failed,
        now,
    )? {
        Transition::Applied => {
            let released = inventory::release_for_order(conn, &order.id, now)?;
            tracing::info!(order_id = %order.id, released, "Payment failed, holds released");
            Ok(ReconcileOutcome::Failed)
        }
        Transition::AlreadyResolved(status) => Ok(ReconcileOutcome::AlreadyResolved(status)),
    }
}

fn record_late_payment(
    conn: &Connection,
    order: &Order,
    event: &PaymentCallbackEvent,
) -> Result<ReconcileOutcome> {
    tracing::warn!(
        order_id = %order.id,
        order_number = %order.order_number,
        event_id = %event.event_id,
        payment_id = ?event.payment_id,
        amount = order.total_amount,
        status = order.status.as_ref(),
        "Payment received for closed order, refund required"
    );
    queries::create_audit_log(
        conn,
        ActorType::Gateway,
        Some(event.provider),
        AuditAction::RecordLatePayment,
        "order",
        &order.id,
        Some(&json!({
            "event_id": event.event_id,
            "payment_id": event.payment_id,
            "amount": order.total_amount,
            "currency": order.currency,
        })),
    )?;
    Ok(ReconcileOutcome::LatePayment)
}

/// Generic webhook handler: authenticate, parse, reconcile, acknowledge.
///
/// Every outcome, including duplicates and events for other streams, is a
/// 200 so the gateway stops retrying. Only processing failures return 500.
pub async fn handle_webhook<P: WebhookProvider>(
    provider: &P,
    state: &AppState,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    if let Err(rejection) = provider.verify_request(&headers, state) {
        return rejection;
    }

    let now = chrono::Utc::now().timestamp();
    let event = match provider.parse_event(&body, now) {
        Ok(CallbackParse::Event(event)) => event,
        Ok(CallbackParse::NotOurs { reference }) => {
            tracing::debug!(
                provider = provider.provider_name(),
                ?reference,
                "Ignoring callback for another event stream"
            );
            return ack(StatusCode::OK, "ok", "ignored");
        }
        Err(rejection) => return rejection,
    };

    let mut conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return ack(StatusCode::INTERNAL_SERVER_ERROR, "error", "processing_failed");
        }
    };

    match process_payment_event(&mut conn, &state.code_signer, &event, now) {
        Ok(outcome) => {
            tracing::info!(
                provider = provider.provider_name(),
                event_id = %event.event_id,
                order_id = %event.order_id,
                outcome = outcome.label(),
                "Callback processed"
            );
            ack(StatusCode::OK, "ok", outcome.label())
        }
        Err(e) => {
            tracing::error!(
                provider = provider.provider_name(),
                event_id = %event.event_id,
                order_id = %event.order_id,
                "Callback processing failed: {}",
                e
            );
            ack(StatusCode::INTERNAL_SERVER_ERROR, "error", "processing_failed")
        }
    }
}
