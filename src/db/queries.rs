use chrono::Utc;
use rusqlite::{Connection, params};

use crate::error::Result;
use crate::id::EntityType;
use crate::models::*;

use super::from_row::{
    AGENT_COLS, AUDIT_LOG_COLS, CHECKIN_CONTEXT_COLS, CONCERT_COLS, ORDER_COLS, ORDER_ITEM_COLS,
    PAYMENT_EVENT_COLS, RESERVATION_COLS, ROLE_GRANT_COLS, TICKET_COLS, TICKET_TIER_COLS,
    query_all, query_one,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

// ============ Concerts ============

pub fn create_concert(conn: &Connection, input: &CreateConcert) -> Result<Concert> {
    let concert = Concert {
        id: EntityType::Concert.gen_id(),
        title: input.title.clone(),
        venue: input.venue.clone(),
        starts_at: input.starts_at,
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO concerts (id, title, venue, starts_at, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            &concert.id,
            &concert.title,
            &concert.venue,
            concert.starts_at,
            concert.created_at
        ],
    )?;
    Ok(concert)
}

pub fn get_concert_by_id(conn: &Connection, id: &str) -> Result<Option<Concert>> {
    query_one(
        conn,
        &format!("SELECT {} FROM concerts WHERE id = ?1", CONCERT_COLS),
        &[&id],
    )
}

pub fn list_concerts(conn: &Connection) -> Result<Vec<Concert>> {
    query_all(
        conn,
        &format!("SELECT {} FROM concerts ORDER BY starts_at", CONCERT_COLS),
        &[],
    )
}

// ============ Ticket Tiers ============

/// New tiers start fully available.
pub fn create_ticket_tier(
    conn: &Connection,
    concert_id: &str,
    input: &CreateTicketTier,
) -> Result<TicketTier> {
    let tier = TicketTier {
        id: EntityType::TicketTier.gen_id(),
        concert_id: concert_id.to_string(),
        name: input.name.clone(),
        price: input.price,
        total_quantity: input.total_quantity,
        available_quantity: input.total_quantity,
        created_at: now(),
    };
    conn.execute(
        "INSERT INTO ticket_tiers (id, concert_id, name, price, total_quantity, available_quantity, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &tier.id,
            &tier.concert_id,
            &tier.name,
            tier.price,
            tier.total_quantity,
            tier.available_quantity,
            tier.created_at
        ],
    )?;
    Ok(tier)
}

pub fn get_ticket_tier_by_id(conn: &Connection, id: &str) -> Result<Option<TicketTier>> {
    query_one(
        conn,
        &format!("SELECT {} FROM ticket_tiers WHERE id = ?1", TICKET_TIER_COLS),
        &[&id],
    )
}

pub fn list_ticket_tiers_for_concert(conn: &Connection, concert_id: &str) -> Result<Vec<TicketTier>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM ticket_tiers WHERE concert_id = ?1 ORDER BY price DESC",
            TICKET_TIER_COLS
        ),
        &[&concert_id],
    )
}

/// Atomically take `qty` units from a tier.
///
/// The WHERE clause is the guard: two racing callers can never both drive the
/// counter below zero. Returns false when the tier is missing or short.
pub fn try_take_tier_quantity(conn: &Connection, tier_id: &str, qty: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE ticket_tiers SET available_quantity = available_quantity - ?1
         WHERE id = ?2 AND available_quantity >= ?1",
        params![qty, tier_id],
    )?;
    Ok(affected > 0)
}

/// Return `qty` units to a tier. Callers must hold a reservation transition
/// that justifies the restore; the CHECK constraint rejects overshooting total.
pub fn restore_tier_quantity(conn: &Connection, tier_id: &str, qty: i64) -> Result<()> {
    conn.execute(
        "UPDATE ticket_tiers SET available_quantity = available_quantity + ?1 WHERE id = ?2",
        params![qty, tier_id],
    )?;
    Ok(())
}

// ============ Reservations ============

pub fn create_reservation(
    conn: &Connection,
    order_id: &str,
    tier_id: &str,
    qty: i64,
    now: i64,
) -> Result<Reservation> {
    let reservation = Reservation {
        id: EntityType::Reservation.gen_id(),
        order_id: order_id.to_string(),
        tier_id: tier_id.to_string(),
        quantity: qty,
        state: ReservationState::Held,
        created_at: now,
        updated_at: now,
    };
    conn.execute(
        "INSERT INTO reservations (id, order_id, tier_id, quantity, state, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &reservation.id,
            &reservation.order_id,
            &reservation.tier_id,
            reservation.quantity,
            reservation.state.as_ref(),
            reservation.created_at,
            reservation.updated_at
        ],
    )?;
    Ok(reservation)
}

pub fn get_reservation_by_id(conn: &Connection, id: &str) -> Result<Option<Reservation>> {
    query_one(
        conn,
        &format!("SELECT {} FROM reservations WHERE id = ?1", RESERVATION_COLS),
        &[&id],
    )
}

pub fn list_reservations_for_order(conn: &Connection, order_id: &str) -> Result<Vec<Reservation>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM reservations WHERE order_id = ?1 ORDER BY created_at, id",
            RESERVATION_COLS
        ),
        &[&order_id],
    )
}

/// Compare-and-set on reservation state. Returns true if this call moved it.
pub fn try_transition_reservation(
    conn: &Connection,
    id: &str,
    from: ReservationState,
    to: ReservationState,
    now: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE reservations SET state = ?1, updated_at = ?2 WHERE id = ?3 AND state = ?4",
        params![to.as_ref(), now, id, from.as_ref()],
    )?;
    Ok(affected > 0)
}

// ============ Orders ============

pub fn insert_order(conn: &Connection, order: &Order) -> Result<()> {
    conn.execute(
        "INSERT INTO orders (id, order_number, kind, status, total_amount, currency, customer_user_id, customer_name, customer_email, customer_phone, payment_method, payment_method_detail, external_reference, payment_id, payment_url, created_at, updated_at, paid_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            &order.id,
            &order.order_number,
            order.kind.as_ref(),
            order.status.as_ref(),
            order.total_amount,
            &order.currency,
            &order.customer_user_id,
            &order.customer_name,
            &order.customer_email,
            &order.customer_phone,
            &order.payment_method,
            &order.payment_method_detail,
            &order.external_reference,
            &order.payment_id,
            &order.payment_url,
            order.created_at,
            order.updated_at,
            order.paid_at,
            order.expires_at
        ],
    )?;
    Ok(())
}

pub fn get_order_by_id(conn: &Connection, id: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLS),
        &[&id],
    )
}

pub fn get_order_by_number(conn: &Connection, order_number: &str) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!("SELECT {} FROM orders WHERE order_number = ?1", ORDER_COLS),
        &[&order_number],
    )
}

/// Unresolved orders whose deadline has passed, oldest first.
pub fn list_overdue_orders(conn: &Connection, now: i64, limit: i64) -> Result<Vec<Order>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM orders
             WHERE status IN ('pending', 'awaiting_payment') AND expires_at <= ?1
             ORDER BY expires_at LIMIT ?2",
            ORDER_COLS
        ),
        &[&now, &limit],
    )
}

/// Most recent unresolved order of `kind` for this user, if any.
pub fn get_open_order_for_user(
    conn: &Connection,
    user_id: &str,
    kind: OrderKind,
) -> Result<Option<Order>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM orders
             WHERE customer_user_id = ?1 AND kind = ?2 AND status IN ('pending', 'awaiting_payment')
             ORDER BY created_at DESC LIMIT 1",
            ORDER_COLS
        ),
        &[&user_id, &kind.as_ref()],
    )
}

/// Compare-and-set on order status, keyed on the expected current status.
///
/// `paid_at` is stamped in the same statement when the target is `paid`, so
/// the paid/paid_at CHECK never sees an intermediate state.
pub fn try_transition_order(
    conn: &Connection,
    id: &str,
    from: OrderStatus,
    to: OrderStatus,
    now: i64,
) -> Result<bool> {
    let paid_at = (to == OrderStatus::Paid).then_some(now);
    let affected = conn.execute(
        "UPDATE orders SET status = ?1, updated_at = ?2, paid_at = COALESCE(?3, paid_at)
         WHERE id = ?4 AND status = ?5",
        params![to.as_ref(), now, paid_at, id, from.as_ref()],
    )?;
    Ok(affected > 0)
}

/// Move a pending order to awaiting_payment together with its instrument.
#[allow(clippy::too_many_arguments)]
pub fn try_attach_payment(
    conn: &Connection,
    id: &str,
    method: &str,
    method_detail: Option<&str>,
    payment_id: &str,
    payment_url: Option<&str>,
    now: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE orders SET status = 'awaiting_payment', payment_method = ?1,
         payment_method_detail = ?2, payment_id = ?3, payment_url = ?4, updated_at = ?5
         WHERE id = ?6 AND status = 'pending'",
        params![method, method_detail, payment_id, payment_url, now, id],
    )?;
    Ok(affected > 0)
}

/// Record the gateway payment id reported by a callback, if none is stored.
pub fn set_order_payment_id_if_missing(conn: &Connection, id: &str, payment_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE orders SET payment_id = ?1 WHERE id = ?2 AND payment_id IS NULL",
        params![payment_id, id],
    )?;
    Ok(())
}

// ============ Order Items ============

pub fn insert_order_item(conn: &Connection, item: &OrderItem) -> Result<()> {
    conn.execute(
        "INSERT INTO order_items (id, order_id, tier_id, quantity, unit_price, subtotal)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            &item.id,
            &item.order_id,
            &item.tier_id,
            item.quantity,
            item.unit_price,
            item.subtotal
        ],
    )?;
    Ok(())
}

pub fn list_order_items(conn: &Connection, order_id: &str) -> Result<Vec<OrderItem>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM order_items WHERE order_id = ?1 ORDER BY rowid",
            ORDER_ITEM_COLS
        ),
        &[&order_id],
    )
}

// ============ Tickets ============

/// Plain insert; constraint violations come back as `rusqlite::Error` so the
/// issuer can tell a code collision from a concurrent issuer.
pub fn insert_ticket(conn: &Connection, ticket: &Ticket) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO tickets (id, order_id, order_item_id, tier_id, seq, code, redemption_state, redeemed_at, redeemed_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &ticket.id,
            &ticket.order_id,
            &ticket.order_item_id,
            &ticket.tier_id,
            ticket.seq,
            &ticket.code,
            ticket.redemption_state.as_ref(),
            ticket.redeemed_at,
            &ticket.redeemed_by,
            ticket.created_at
        ],
    )?;
    Ok(())
}

pub fn list_tickets_for_item(conn: &Connection, order_item_id: &str) -> Result<Vec<Ticket>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM tickets WHERE order_item_id = ?1 ORDER BY seq",
            TICKET_COLS
        ),
        &[&order_item_id],
    )
}

pub fn list_tickets_for_order(conn: &Connection, order_id: &str) -> Result<Vec<Ticket>> {
    query_all(
        conn,
        &format!(
            "SELECT t.{} FROM tickets t JOIN order_items i ON i.id = t.order_item_id
             WHERE t.order_id = ?1 ORDER BY i.rowid, t.seq",
            TICKET_COLS.replace(", ", ", t.")
        ),
        &[&order_id],
    )
}

pub fn get_ticket_by_code(conn: &Connection, code: &str) -> Result<Option<Ticket>> {
    query_one(
        conn,
        &format!("SELECT {} FROM tickets WHERE code = ?1", TICKET_COLS),
        &[&code],
    )
}

/// Atomically redeem an issued ticket. Returns true if this call admitted it.
pub fn try_redeem_ticket(conn: &Connection, code: &str, redeemed_by: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE tickets SET redemption_state = 'redeemed', redeemed_at = ?1, redeemed_by = ?2
         WHERE code = ?3 AND redemption_state = 'issued'",
        params![now, redeemed_by, code],
    )?;
    Ok(affected > 0)
}

/// Undo a redemption. Only reachable through the administrative override.
pub fn try_unredeem_ticket(conn: &Connection, code: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE tickets SET redemption_state = 'issued', redeemed_at = NULL, redeemed_by = NULL
         WHERE code = ?1 AND redemption_state = 'redeemed'",
        params![code],
    )?;
    Ok(affected > 0)
}

pub fn get_checkin_context(conn: &Connection, code: &str) -> Result<Option<CheckinContext>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM tickets t
             JOIN order_items i ON i.id = t.order_item_id
             JOIN orders o ON o.id = t.order_id
             JOIN ticket_tiers tt ON tt.id = t.tier_id
             JOIN concerts c ON c.id = tt.concert_id
             WHERE t.code = ?1",
            CHECKIN_CONTEXT_COLS
        ),
        &[&code],
    )
}

// ============ Payment Event Deduplication ============

/// Atomically record a callback event, returning true if this is a new event.
///
/// Uses INSERT OR IGNORE so that of N concurrent deliveries carrying the same
/// (provider, event_id) exactly one sees `true`.
pub fn try_record_payment_event(conn: &Connection, event: &PaymentCallbackEvent) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO payment_events (id, provider, event_id, order_id, external_reference, reported_status, outcome, payload, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)",
        params![
            EntityType::PaymentEvent.gen_id(),
            event.provider,
            &event.event_id,
            &event.order_id,
            &event.external_reference,
            event.status.as_ref(),
            event.raw_payload.to_string(),
            event.received_at
        ],
    )?;
    Ok(affected > 0)
}

pub fn set_payment_event_outcome(
    conn: &Connection,
    provider: &str,
    event_id: &str,
    outcome: EventOutcome,
) -> Result<()> {
    conn.execute(
        "UPDATE payment_events SET outcome = ?1 WHERE provider = ?2 AND event_id = ?3",
        params![outcome.as_ref(), provider, event_id],
    )?;
    Ok(())
}

pub fn get_payment_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
) -> Result<Option<PaymentEventRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM payment_events WHERE provider = ?1 AND event_id = ?2",
            PAYMENT_EVENT_COLS
        ),
        &[&provider, &event_id],
    )
}

pub fn list_payment_events_for_order(
    conn: &Connection,
    order_id: &str,
) -> Result<Vec<PaymentEventRecord>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM payment_events WHERE order_id = ?1 ORDER BY received_at, rowid",
            PAYMENT_EVENT_COLS
        ),
        &[&order_id],
    )
}

/// Purge dedup rows beyond the retention period.
/// The gateway stops retrying long before this, so old rows only cost space.
/// Returns the number of deleted records.
///
/// Late-payment rows are kept: a replay after the window would otherwise
/// raise a second refund.
pub fn purge_old_payment_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM payment_events
         WHERE received_at < ?1 AND (outcome IS NULL OR outcome != ?2)",
        params![cutoff, EventOutcome::LatePayment.as_ref()],
    )?;
    Ok(deleted)
}

// ============ Agents & Role Grants ============

/// Insert the agent row unless the user already has one.
/// Returns true if this call created it.
pub fn try_create_agent(conn: &Connection, user_id: &str, order_id: &str, now: i64) -> Result<bool> {
    let affected = conn.execute(
        "INSERT INTO agents (id, user_id, order_id, activated_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id) DO NOTHING",
        params![EntityType::Agent.gen_id(), user_id, order_id, now],
    )?;
    Ok(affected > 0)
}

pub fn get_agent_by_user_id(conn: &Connection, user_id: &str) -> Result<Option<Agent>> {
    query_one(
        conn,
        &format!("SELECT {} FROM agents WHERE user_id = ?1", AGENT_COLS),
        &[&user_id],
    )
}

pub fn count_agents_for_user(conn: &Connection, user_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM agents WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Grant a role unless already held. Returns true if this call granted it.
pub fn try_grant_role(
    conn: &Connection,
    user_id: &str,
    role: &str,
    source_order_id: Option<&str>,
    now: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT INTO role_grants (user_id, role, granted_at, source_order_id) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, role) DO NOTHING",
        params![user_id, role, now, source_order_id],
    )?;
    Ok(affected > 0)
}

pub fn list_role_grants(conn: &Connection, user_id: &str) -> Result<Vec<RoleGrant>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM role_grants WHERE user_id = ?1 ORDER BY granted_at",
            ROLE_GRANT_COLS
        ),
        &[&user_id],
    )
}

// ============ Audit Logs ============

pub fn create_audit_log(
    conn: &Connection,
    actor_type: ActorType,
    actor_id: Option<&str>,
    action: AuditAction,
    resource_type: &str,
    resource_id: &str,
    details: Option<&serde_json::Value>,
) -> Result<AuditLog> {
    let log = AuditLog {
        id: EntityType::AuditLog.gen_id(),
        timestamp: now(),
        actor_type,
        actor_id: actor_id.map(String::from),
        action: action.as_ref().to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        details: details.cloned(),
    };
    let details_str = details.map(|d| d.to_string());

    conn.execute(
        "INSERT INTO audit_logs (id, timestamp, actor_type, actor_id, action, resource_type, resource_id, details)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            &log.id,
            log.timestamp,
            log.actor_type.as_ref(),
            &log.actor_id,
            &log.action,
            &log.resource_type,
            &log.resource_id,
            &details_str
        ],
    )?;
    Ok(log)
}

pub fn list_audit_logs_for_resource(
    conn: &Connection,
    resource_type: &str,
    resource_id: &str,
) -> Result<Vec<AuditLog>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM audit_logs WHERE resource_type = ?1 AND resource_id = ?2
             ORDER BY timestamp, rowid",
            AUDIT_LOG_COLS
        ),
        &[&resource_type, &resource_id],
    )
}
