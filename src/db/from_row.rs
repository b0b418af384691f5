//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to rusqlite errors.
///
/// A corrupt enum value surfaces as a query error instead of a panic.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

fn parse_optional_enum<T: std::str::FromStr>(
    row: &Row,
    col: usize,
    col_name: &str,
) -> rusqlite::Result<Option<T>> {
    match row.get::<_, Option<String>>(col)? {
        Some(s) => s.parse::<T>().map(Some).map_err(|_| {
            rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
        }),
        None => Ok(None),
    }
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const CONCERT_COLS: &str = "id, title, venue, starts_at, created_at";

pub const TICKET_TIER_COLS: &str =
    "id, concert_id, name, price, total_quantity, available_quantity, created_at";

pub const ORDER_COLS: &str = "id, order_number, kind, status, total_amount, currency, customer_user_id, customer_name, customer_email, customer_phone, payment_method, payment_method_detail, external_reference, payment_id, payment_url, created_at, updated_at, paid_at, expires_at";

pub const ORDER_ITEM_COLS: &str = "id, order_id, tier_id, quantity, unit_price, subtotal";

pub const RESERVATION_COLS: &str =
    "id, order_id, tier_id, quantity, state, created_at, updated_at";

pub const TICKET_COLS: &str = "id, order_id, order_item_id, tier_id, seq, code, redemption_state, redeemed_at, redeemed_by, created_at";

pub const PAYMENT_EVENT_COLS: &str = "id, provider, event_id, order_id, external_reference, reported_status, outcome, payload, received_at";

pub const AGENT_COLS: &str = "id, user_id, order_id, activated_at";

pub const ROLE_GRANT_COLS: &str = "user_id, role, granted_at, source_order_id";

pub const AUDIT_LOG_COLS: &str =
    "id, timestamp, actor_type, actor_id, action, resource_type, resource_id, details";

/// Joined columns for check-in display (tickets t, order_items i, orders o,
/// ticket_tiers tt, concerts c).
pub const CHECKIN_CONTEXT_COLS: &str = "t.id, t.code, o.id, o.order_number, o.customer_name, tt.name, c.id, c.title, c.venue, c.starts_at, t.redeemed_at, t.redeemed_by";

// ============ FromRow Implementations ============

impl FromRow for Concert {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Concert {
            id: row.get(0)?,
            title: row.get(1)?,
            venue: row.get(2)?,
            starts_at: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

impl FromRow for TicketTier {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(TicketTier {
            id: row.get(0)?,
            concert_id: row.get(1)?,
            name: row.get(2)?,
            price: row.get(3)?,
            total_quantity: row.get(4)?,
            available_quantity: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl FromRow for Order {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Order {
            id: row.get(0)?,
            order_number: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            status: parse_enum(row, 3, "status")?,
            total_amount: row.get(4)?,
            currency: row.get(5)?,
            customer_user_id: row.get(6)?,
            customer_name: row.get(7)?,
            customer_email: row.get(8)?,
            customer_phone: row.get(9)?,
            payment_method: row.get(10)?,
            payment_method_detail: row.get(11)?,
            external_reference: row.get(12)?,
            payment_id: row.get(13)?,
            payment_url: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
            paid_at: row.get(17)?,
            expires_at: row.get(18)?,
        })
    }
}

impl FromRow for OrderItem {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OrderItem {
            id: row.get(0)?,
            order_id: row.get(1)?,
            tier_id: row.get(2)?,
            quantity: row.get(3)?,
            unit_price: row.get(4)?,
            subtotal: row.get(5)?,
        })
    }
}

impl FromRow for Reservation {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Reservation {
            id: row.get(0)?,
            order_id: row.get(1)?,
            tier_id: row.get(2)?,
            quantity: row.get(3)?,
            state: parse_enum(row, 4, "state")?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}

impl FromRow for Ticket {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Ticket {
            id: row.get(0)?,
            order_id: row.get(1)?,
            order_item_id: row.get(2)?,
            tier_id: row.get(3)?,
            seq: row.get(4)?,
            code: row.get(5)?,
            redemption_state: parse_enum(row, 6, "redemption_state")?,
            redeemed_at: row.get(7)?,
            redeemed_by: row.get(8)?,
            created_at: row.get(9)?,
        })
    }
}

impl FromRow for PaymentEventRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(PaymentEventRecord {
            id: row.get(0)?,
            provider: row.get(1)?,
            event_id: row.get(2)?,
            order_id: row.get(3)?,
            external_reference: row.get(4)?,
            reported_status: parse_enum(row, 5, "reported_status")?,
            outcome: parse_optional_enum(row, 6, "outcome")?,
            payload: row.get(7)?,
            received_at: row.get(8)?,
        })
    }
}

impl FromRow for Agent {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Agent {
            id: row.get(0)?,
            user_id: row.get(1)?,
            order_id: row.get(2)?,
            activated_at: row.get(3)?,
        })
    }
}

impl FromRow for RoleGrant {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(RoleGrant {
            user_id: row.get(0)?,
            role: row.get(1)?,
            granted_at: row.get(2)?,
            source_order_id: row.get(3)?,
        })
    }
}

impl FromRow for AuditLog {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let details: Option<String> = row.get(7)?;
        Ok(AuditLog {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor_type: parse_enum(row, 2, "actor_type")?,
            actor_id: row.get(3)?,
            action: row.get(4)?,
            resource_type: row.get(5)?,
            resource_id: row.get(6)?,
            details: details.and_then(|d| serde_json::from_str(&d).ok()),
        })
    }
}

impl FromRow for CheckinContext {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(CheckinContext {
            ticket_id: row.get(0)?,
            code: row.get(1)?,
            order_id: row.get(2)?,
            order_number: row.get(3)?,
            holder_name: row.get(4)?,
            tier_name: row.get(5)?,
            concert_id: row.get(6)?,
            concert_title: row.get(7)?,
            venue: row.get(8)?,
            starts_at: row.get(9)?,
            redeemed_at: row.get(10)?,
            redeemed_by: row.get(11)?,
        })
    }
}
