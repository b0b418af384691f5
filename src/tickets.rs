//! Ticket issuer: one ticket per purchased unit, with a unique scannable code.
//!
//! Issuance is idempotent per order item. `UNIQUE(order_item_id, seq)` stops
//! a second issuer from minting extra tickets, and `UNIQUE(code)` turns a code
//! collision into a regenerate-and-retry.

use std::collections::HashSet;

use rusqlite::{Connection, ErrorCode};

use crate::crypto::TicketCodeSigner;
use crate::db::queries;
use crate::error::{AppError, Result};
use crate::id::EntityType;
use crate::models::{OrderItem, RedemptionState, Ticket};

/// Code regenerations per seat before giving up.
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone)]
pub struct Issued {
    /// All tickets of the item, existing and new, ordered by seq
    pub tickets: Vec<Ticket>,
    /// How many of them this call inserted
    pub created: usize,
}

/// Issue tickets for every unit of `item`, returning existing ones unchanged.
pub fn issue(
    conn: &Connection,
    signer: &TicketCodeSigner,
    item: &OrderItem,
    now: i64,
) -> Result<Issued> {
    issue_with(conn, item, now, || signer.generate())
}

/// Same as [`issue`] with an injectable code source.
pub fn issue_with(
    conn: &Connection,
    item: &OrderItem,
    now: i64,
    mut next_code: impl FnMut() -> String,
) -> Result<Issued> {
    let have: HashSet<i64> = queries::list_tickets_for_item(conn, &item.id)?
        .into_iter()
        .map(|t| t.seq)
        .collect();

    let mut created = 0;
    for seq in (1..=item.quantity).filter(|s| !have.contains(s)) {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let ticket = Ticket {
                id: EntityType::Ticket.gen_id(),
                order_id: item.order_id.clone(),
                order_item_id: item.id.clone(),
                tier_id: item.tier_id.clone(),
                seq,
                code: next_code(),
                redemption_state: RedemptionState::Issued,
                redeemed_at: None,
                redeemed_by: None,
                created_at: now,
            };

            match queries::insert_ticket(conn, &ticket) {
                Ok(()) => {
                    created += 1;
                    break;
                }
                Err(e) if is_unique_violation(&e, "tickets.code") => {
                    tracing::warn!(
                        order_item_id = %item.id,
                        seq,
                        attempts,
                        "Ticket code collision, regenerating"
                    );
                    if attempts >= MAX_CODE_ATTEMPTS {
                        return Err(AppError::Internal(format!(
                            "Could not mint a unique ticket code for item {} seq {}",
                            item.id, seq
                        )));
                    }
                }
                // Another issuer already wrote this seat.
                Err(e) if is_unique_violation(&e, "tickets.order_item_id") => break,
                Err(e) => return Err(e.into()),
            }
        }
    }

    if created > 0 {
        tracing::info!(order_item_id = %item.id, created, "Issued tickets");
    }

    Ok(Issued {
        tickets: queries::list_tickets_for_item(conn, &item.id)?,
        created,
    })
}

/// Issue tickets for every item of an order. Returns all tickets and how many
/// were created by this call.
pub fn issue_for_order(
    conn: &Connection,
    signer: &TicketCodeSigner,
    order_id: &str,
    now: i64,
) -> Result<Issued> {
    let mut tickets = Vec::new();
    let mut created = 0;
    for item in queries::list_order_items(conn, order_id)? {
        let issued = issue(conn, signer, &item, now)?;
        created += issued.created;
        tickets.extend(issued.tickets);
    }
    Ok(Issued { tickets, created })
}

/// SQLite reports composite keys by their first column, e.g.
/// `UNIQUE constraint failed: tickets.order_item_id, tickets.seq`.
fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(message)) => {
            e.code == ErrorCode::ConstraintViolation
                && message.starts_with("UNIQUE constraint failed:")
                && message
                    .trim_start_matches("UNIQUE constraint failed:")
                    .trim_start()
                    .starts_with(column)
        }
        _ => false,
    }
}
