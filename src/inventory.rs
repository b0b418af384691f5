//! Inventory ledger: holds, releases and finalizes tier quantity.
//!
//! Every function takes a `&Connection` and is meant to run inside the
//! caller's transaction, so a reservation row and its counter change commit
//! together. The guards live in the SQL itself (conditional UPDATEs), never in
//! process memory, so concurrent processes sharing the database stay correct.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::models::{Reservation, ReservationState};

/// Result of a release or finalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// This call changed the reservation
    Applied,
    /// The reservation had already left `held`; nothing changed
    NoOp,
}

/// Take `qty` units of `tier_id` for `order_id`.
///
/// The decrement is a single conditional statement. On failure the tier is
/// re-read only to build an accurate error.
pub fn reserve(
    conn: &Connection,
    order_id: &str,
    tier_id: &str,
    qty: i64,
    now: i64,
) -> Result<Reservation> {
    if qty <= 0 {
        return Err(AppError::BadRequest(msg::INVALID_QUANTITY.into()));
    }

    if !queries::try_take_tier_quantity(conn, tier_id, qty)? {
        let tier = queries::get_ticket_tier_by_id(conn, tier_id)?.or_not_found(msg::TIER_NOT_FOUND)?;
        return Err(AppError::InsufficientInventory {
            tier_id: tier.id,
            requested: qty,
            available: tier.available_quantity,
        });
    }

    let reservation = queries::create_reservation(conn, order_id, tier_id, qty, now)?;
    tracing::debug!(
        reservation_id = %reservation.id,
        tier_id,
        qty,
        "Reserved inventory"
    );
    Ok(reservation)
}

/// Return a held reservation's quantity to its tier.
///
/// Only the caller that wins the `held -> released` CAS restores quantity, so
/// releasing twice (or releasing something already consumed) is a no-op.
pub fn release(conn: &Connection, reservation_id: &str, now: i64) -> Result<LedgerOutcome> {
    let reservation = queries::get_reservation_by_id(conn, reservation_id)?
        .or_not_found(msg::RESERVATION_NOT_FOUND)?;

    if !queries::try_transition_reservation(
        conn,
        reservation_id,
        ReservationState::Held,
        ReservationState::Released,
        now,
    )? {
        return Ok(LedgerOutcome::NoOp);
    }

    queries::restore_tier_quantity(conn, &reservation.tier_id, reservation.quantity)?;
    tracing::debug!(
        reservation_id,
        tier_id = %reservation.tier_id,
        qty = reservation.quantity,
        "Released inventory"
    );
    Ok(LedgerOutcome::Applied)
}

/// Mark a held reservation as sold. Quantity was already taken at reserve time.
pub fn finalize(conn: &Connection, reservation_id: &str, now: i64) -> Result<LedgerOutcome> {
    if queries::try_transition_reservation(
        conn,
        reservation_id,
        ReservationState::Held,
        ReservationState::Consumed,
        now,
    )? {
        return Ok(LedgerOutcome::Applied);
    }

    // Distinguish a missing reservation from one that already moved on.
    queries::get_reservation_by_id(conn, reservation_id)?.or_not_found(msg::RESERVATION_NOT_FOUND)?;
    Ok(LedgerOutcome::NoOp)
}

/// Release every reservation of an order. Returns how many were released by this call.
pub fn release_for_order(conn: &Connection, order_id: &str, now: i64) -> Result<usize> {
    let mut released = 0;
    for reservation in queries::list_reservations_for_order(conn, order_id)? {
        if release(conn, &reservation.id, now)? == LedgerOutcome::Applied {
            released += 1;
        }
    }
    Ok(released)
}

/// Finalize every reservation of an order. Returns how many were finalized by this call.
pub fn finalize_for_order(conn: &Connection, order_id: &str, now: i64) -> Result<usize> {
    let mut finalized = 0;
    for reservation in queries::list_reservations_for_order(conn, order_id)? {
        if finalize(conn, &reservation.id, now)? == LedgerOutcome::Applied {
            finalized += 1;
        }
    }
    Ok(finalized)
}
