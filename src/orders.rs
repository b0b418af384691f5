//! Order aggregate: creation, the status state machine and lazy expiry.
//!
//! Every status change goes through [`transition`], a single UPDATE keyed on
//! the expected current status. Losing a race is reported as
//! [`Transition::AlreadyResolved`], never as an error.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::id::EntityType;
use crate::inventory;
use crate::models::*;
use crate::payments::{PaymentInstrument, encode_reference};

/// Orders swept per pass, to keep each pass short.
const SWEEP_BATCH: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// This call moved the order
    Applied,
    /// The order was not in the expected state; carries what it actually is
    AlreadyResolved(OrderStatus),
}

/// Compare-and-set the order from `from` to `to`.
///
/// Asking for an edge the state machine does not have is a programming error.
pub fn transition(
    conn: &Connection,
    order_id: &str,
    from: OrderStatus,
    to: OrderStatus,
    now: i64,
) -> Result<Transition> {
    if !from.can_transition_to(to) {
        return Err(AppError::Internal(format!(
            "Illegal order transition {} -> {}",
            from.as_ref(),
            to.as_ref()
        )));
    }

    if queries::try_transition_order(conn, order_id, from, to, now)? {
        tracing::info!(
            order_id,
            from = from.as_ref(),
            to = to.as_ref(),
            "Order transitioned"
        );
        return Ok(Transition::Applied);
    }

    let current = queries::get_order_by_id(conn, order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    Ok(Transition::AlreadyResolved(current.status))
}

/// Human-facing order number: `BO-YYYYMMDD-XXXXXX`.
fn generate_order_number(now: i64) -> String {
    use rand::Rng;
    let date = chrono::DateTime::from_timestamp(now, 0)
        .map(|t| t.format("%Y%m%d").to_string())
        .unwrap_or_else(|| "00000000".to_string());
    let mut rng = rand::thread_rng();
    let chars: Vec<char> = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789".chars().collect();
    let suffix: String = (0..6)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect();
    format!("BO-{}-{}", date, suffix)
}

/// Pick an order number not yet taken. Runs inside the write transaction, so
/// the check cannot race another writer.
fn unique_order_number(conn: &Connection, now: i64) -> Result<String> {
    for _ in 0..5 {
        let candidate = generate_order_number(now);
        if queries::get_order_by_number(conn, &candidate)?.is_none() {
            return Ok(candidate);
        }
    }
    Err(AppError::Internal("Could not allocate an order number".into()))
}

fn validate_customer(customer: &CustomerInfo) -> Result<()> {
    if customer.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("customer.user_id is required".into()));
    }
    if customer.name.trim().is_empty() {
        return Err(AppError::BadRequest("customer.name is required".into()));
    }
    if !customer.email.contains('@') {
        return Err(AppError::BadRequest("customer.email is invalid".into()));
    }
    Ok(())
}

fn new_order(
    conn: &Connection,
    kind: OrderKind,
    customer: &CustomerInfo,
    total_amount: i64,
    currency: &str,
    ttl_secs: i64,
    now: i64,
) -> Result<Order> {
    let id = EntityType::Order.gen_id();
    Ok(Order {
        order_number: unique_order_number(conn, now)?,
        kind,
        status: OrderStatus::Pending,
        total_amount,
        currency: currency.to_string(),
        customer_user_id: customer.user_id.trim().to_string(),
        customer_name: customer.name.trim().to_string(),
        customer_email: customer.email.trim().to_string(),
        customer_phone: customer.phone.clone(),
        payment_method: None,
        payment_method_detail: None,
        external_reference: encode_reference(kind, &id),
        payment_id: None,
        payment_url: None,
        created_at: now,
        updated_at: now,
        paid_at: None,
        expires_at: now + ttl_secs,
        id,
    })
}

/// Create a pending ticket order, reserving every line in one transaction.
///
/// If any tier is short the whole order rolls back, including holds already
/// taken for earlier lines.
pub fn create_order(
    conn: &mut Connection,
    input: &CreateOrder,
    currency: &str,
    ttl_secs: i64,
    now: i64,
) -> Result<OrderWithItems> {
    validate_customer(&input.customer)?;
    if input.items.is_empty() {
        return Err(AppError::BadRequest(msg::EMPTY_ORDER.into()));
    }
    if input.items.iter().any(|i| i.quantity <= 0) {
        return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut priced = Vec::with_capacity(input.items.len());
    for line in &input.items {
        let tier = queries::get_ticket_tier_by_id(&tx, &line.tier_id)?
            .or_not_found(msg::TIER_NOT_FOUND)?;
        priced.push((tier, line.quantity));
    }
    let total_amount = priced
        .iter()
        .try_fold(0i64, |acc, (tier, qty)| {
            tier.price.checked_mul(*qty).and_then(|s| acc.checked_add(s))
        })
        .ok_or_else(|| AppError::BadRequest("Order total out of range".into()))?;

    let order = new_order(
        &tx,
        OrderKind::Tickets,
        &input.customer,
        total_amount,
        currency,
        ttl_secs,
        now,
    )?;
    queries::insert_order(&tx, &order)?;

    let mut items = Vec::with_capacity(priced.len());
    for (tier, qty) in priced {
        inventory::reserve(&tx, &order.id, &tier.id, qty, now)?;
        let item = OrderItem {
            id: EntityType::OrderItem.gen_id(),
            order_id: order.id.clone(),
            tier_id: tier.id,
            quantity: qty,
            unit_price: tier.price,
            subtotal: tier.price * qty,
        };
        queries::insert_order_item(&tx, &item)?;
        items.push(item);
    }

    tx.commit()?;

    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = order.total_amount,
        "Created ticket order"
    );
    Ok(OrderWithItems { order, items })
}

/// Create an agent-registration order for a fixed fee.
///
/// An existing open registration for the same user is returned instead of a
/// second one, so a double-submitted form cannot produce two charges.
pub fn create_agent_registration(
    conn: &mut Connection,
    input: &CreateAgentRegistration,
    fee: i64,
    currency: &str,
    ttl_secs: i64,
    now: i64,
) -> Result<Order> {
    validate_customer(&input.customer)?;
    let user_id = input.customer.user_id.trim();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    if queries::get_agent_by_user_id(&tx, user_id)?.is_some() {
        return Err(AppError::Conflict(msg::ALREADY_AGENT.into()));
    }

    if let Some(open) = queries::get_open_order_for_user(&tx, user_id, OrderKind::AgentRegistration)? {
        let open = expire_if_due(&tx, &open.id, now)?;
        if !open.status.is_terminal() {
            tx.commit()?;
            return Ok(open);
        }
    }

    let order = new_order(
        &tx,
        OrderKind::AgentRegistration,
        &input.customer,
        fee,
        currency,
        ttl_secs,
        now,
    )?;
    queries::insert_order(&tx, &order)?;
    tx.commit()?;

    tracing::info!(
        order_id = %order.id,
        user_id,
        "Created agent registration order"
    );
    Ok(order)
}

/// Apply the timeout edge if the order is past its deadline.
///
/// `awaiting_payment` becomes `expired`, `pending` becomes `cancelled`.
/// Inventory is released only by the caller whose CAS applied, so running
/// this twice (or concurrently with the sweep) releases once.
/// Returns the order as it is after the check.
pub fn expire_if_due(conn: &Connection, order_id: &str, now: i64) -> Result<Order> {
    let order = queries::get_order_by_id(conn, order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    if !order.is_overdue(now) {
        return Ok(order);
    }

    let target = match order.status {
        OrderStatus::AwaitingPayment => OrderStatus::Expired,
        _ => OrderStatus::Cancelled,
    };

    if transition(conn, order_id, order.status, target, now)? == Transition::Applied {
        let released = inventory::release_for_order(conn, order_id, now)?;
        tracing::info!(
            order_id,
            status = target.as_ref(),
            released,
            "Order timed out"
        );
    }

    queries::get_order_by_id(conn, order_id)?.or_not_found(msg::ORDER_NOT_FOUND)
}

/// Load an order for an inbound request, applying lazy expiry first.
pub fn refresh(conn: &mut Connection, order_id: &str, now: i64) -> Result<Order> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let order = expire_if_due(&tx, order_id, now)?;
    tx.commit()?;
    Ok(order)
}

/// Order with its line items.
pub fn with_items(conn: &Connection, order: Order) -> Result<OrderWithItems> {
    let items = queries::list_order_items(conn, &order.id)?;
    Ok(OrderWithItems { order, items })
}

/// Store the gateway instrument and move `pending -> awaiting_payment`.
pub fn attach_payment(
    conn: &Connection,
    order_id: &str,
    instrument: &PaymentInstrument,
    now: i64,
) -> Result<Transition> {
    if queries::try_attach_payment(
        conn,
        order_id,
        instrument.method.as_str(),
        instrument.method.detail(),
        &instrument.payment_id,
        instrument.display.as_deref(),
        now,
    )? {
        tracing::info!(
            order_id,
            payment_id = %instrument.payment_id,
            method = instrument.method.as_str(),
            "Order awaiting payment"
        );
        return Ok(Transition::Applied);
    }

    let current = queries::get_order_by_id(conn, order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    Ok(Transition::AlreadyResolved(current.status))
}

/// Abandon checkout: `pending -> cancelled` and return the holds.
///
/// Cancelling an already cancelled order returns it unchanged.
pub fn cancel(conn: &mut Connection, order_id: &str, now: i64) -> Result<Order> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let order = expire_if_due(&tx, order_id, now)?;

    match order.status {
        OrderStatus::Pending => {
            if transition(&tx, order_id, OrderStatus::Pending, OrderStatus::Cancelled, now)?
                == Transition::Applied
            {
                inventory::release_for_order(&tx, order_id, now)?;
            }
        }
        OrderStatus::Cancelled => {}
        _ => return Err(AppError::Conflict(msg::ORDER_NOT_CANCELLABLE.into())),
    }

    let order = queries::get_order_by_id(&tx, order_id)?.or_not_found(msg::ORDER_NOT_FOUND)?;
    tx.commit()?;
    Ok(order)
}

/// Expire every overdue order. Each order gets its own short transaction and
/// the same CAS as lazy expiry, so this is safe alongside live callbacks.
/// Returns how many orders this pass moved.
pub fn expire_overdue(conn: &mut Connection, now: i64) -> Result<usize> {
    let overdue = queries::list_overdue_orders(conn, now, SWEEP_BATCH)?;
    let mut moved = 0;
    for order in overdue {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let after = expire_if_due(&tx, &order.id, now)?;
        tx.commit()?;
        if after.status != order.status {
            moved += 1;
        }
    }
    Ok(moved)
}
