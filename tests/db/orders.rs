//! Order lifecycle tests: creation, state machine CAS, expiry and cancel.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use boxoffice::error::AppError;
use boxoffice::orders::{self, Transition};

#[test]
fn test_create_order_prices_items_and_reserves() {
    let mut conn = setup_test_db();
    let concert = create_test_concert(&conn, "Night Show");
    let regular = create_test_tier(&conn, &concert.id, "Regular", 100_000, 10);
    let vip = create_test_tier(&conn, &concert.id, "VIP", 500_000, 5);

    let created = orders::create_order(
        &mut conn,
        &order_input("user-1", &[(&regular.id, 3), (&vip.id, 1)]),
        "IDR",
        ORDER_TTL_SECS,
        now(),
    )
    .unwrap();

    let order = &created.order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.kind, OrderKind::Tickets);
    assert_eq!(order.total_amount, 800_000);
    assert_eq!(order.external_reference, format!("ORDER-{}", order.id));
    assert!(order.order_number.starts_with("BO-"));
    assert_eq!(order.expires_at - order.created_at, ORDER_TTL_SECS);
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.items[0].subtotal, 300_000);

    assert_eq!(tier_available(&conn, &regular.id), 7);
    assert_eq!(tier_available(&conn, &vip.id), 4);
    let holds = queries::list_reservations_for_order(&conn, &order.id).unwrap();
    assert_eq!(holds.len(), 2);
    assert!(holds.iter().all(|r| r.state == ReservationState::Held));
}

#[test]
fn test_create_order_short_line_rolls_back_everything() {
    let mut conn = setup_test_db();
    let concert = create_test_concert(&conn, "Night Show");
    let regular = create_test_tier(&conn, &concert.id, "Regular", 100_000, 10);
    let vip = create_test_tier(&conn, &concert.id, "VIP", 500_000, 1);

    let err = orders::create_order(
        &mut conn,
        &order_input("user-1", &[(&regular.id, 3), (&vip.id, 2)]),
        "IDR",
        ORDER_TTL_SECS,
        now(),
    )
    .unwrap_err();

    assert!(matches!(err, AppError::InsufficientInventory { .. }));
    // The first line's hold was rolled back with the order.
    assert_eq!(tier_available(&conn, &regular.id), 10);
    assert_eq!(tier_available(&conn, &vip.id), 1);
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM orders", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn test_create_order_validation() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);

    let empty = order_input("user-1", &[]);
    assert!(matches!(
        orders::create_order(&mut conn, &empty, "IDR", ORDER_TTL_SECS, now()),
        Err(AppError::BadRequest(_))
    ));

    let zero = order_input("user-1", &[(&tier.id, 0)]);
    assert!(matches!(
        orders::create_order(&mut conn, &zero, "IDR", ORDER_TTL_SECS, now()),
        Err(AppError::BadRequest(_))
    ));

    let mut bad_email = order_input("user-1", &[(&tier.id, 1)]);
    bad_email.customer.email = "not-an-email".to_string();
    assert!(matches!(
        orders::create_order(&mut conn, &bad_email, "IDR", ORDER_TTL_SECS, now()),
        Err(AppError::BadRequest(_))
    ));

    let unknown = order_input("user-1", &[("bo_tier_missing", 1)]);
    assert!(matches!(
        orders::create_order(&mut conn, &unknown, "IDR", ORDER_TTL_SECS, now()),
        Err(AppError::NotFound(_))
    ));

    assert_eq!(tier_available(&conn, &tier.id), 10);
}

#[test]
fn test_transition_cas_reports_actual_status() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);
    let order = create_test_order(&mut conn, &tier.id, 1).order;
    mark_awaiting_payment(&conn, &order.id);

    let first = orders::transition(
        &conn,
        &order.id,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        now(),
    )
    .unwrap();
    assert_eq!(first, Transition::Applied);

    let second = orders::transition(
        &conn,
        &order.id,
        OrderStatus::AwaitingPayment,
        OrderStatus::Failed,
        now(),
    )
    .unwrap();
    assert_eq!(second, Transition::AlreadyResolved(OrderStatus::Paid));

    let stored = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
    assert!(stored.paid_at.is_some());
}

#[test]
fn test_attach_payment_moves_pending_once() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);
    let order = create_test_order(&mut conn, &tier.id, 1).order;

    mark_awaiting_payment(&conn, &order.id);
    let stored = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::AwaitingPayment);
    assert_eq!(stored.payment_method.as_deref(), Some("virtual_account"));
    assert_eq!(stored.payment_method_detail.as_deref(), Some("BCA"));
    assert_eq!(stored.payment_id, Some(format!("pr-{}", order.id)));

    let instrument = PaymentInstrument {
        payment_id: "pr-other".to_string(),
        method: boxoffice::payments::PaymentMethod::Qr,
        display: None,
    };
    let again = orders::attach_payment(&conn, &order.id, &instrument, now()).unwrap();
    assert_eq!(again, Transition::AlreadyResolved(OrderStatus::AwaitingPayment));
    // The first instrument is kept.
    let stored = queries::get_order_by_id(&conn, &order.id).unwrap().unwrap();
    assert_eq!(stored.payment_id, Some(format!("pr-{}", order.id)));
}

#[test]
fn test_expiry_twice_releases_once() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);
    let order = create_test_order(&mut conn, &tier.id, 4).order;
    mark_awaiting_payment(&conn, &order.id);
    backdate_expiry(&conn, &order.id);
    assert_eq!(tier_available(&conn, &tier.id), 6);

    let first = orders::expire_if_due(&conn, &order.id, now()).unwrap();
    assert_eq!(first.status, OrderStatus::Expired);
    assert_eq!(tier_available(&conn, &tier.id), 10);

    let second = orders::expire_if_due(&conn, &order.id, now()).unwrap();
    assert_eq!(second.status, OrderStatus::Expired);
    assert_eq!(tier_available(&conn, &tier.id), 10);
}

#[test]
fn test_overdue_pending_order_is_cancelled() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);
    let order = create_test_order(&mut conn, &tier.id, 2).order;
    backdate_expiry(&conn, &order.id);

    let refreshed = orders::refresh(&mut conn, &order.id, now()).unwrap();
    assert_eq!(refreshed.status, OrderStatus::Cancelled);
    assert_eq!(tier_available(&conn, &tier.id), 10);
}

#[test]
fn test_refresh_leaves_live_order_alone() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);
    let order = create_test_order(&mut conn, &tier.id, 2).order;

    let refreshed = orders::refresh(&mut conn, &order.id, now()).unwrap();
    assert_eq!(refreshed.status, OrderStatus::Pending);
    assert_eq!(tier_available(&conn, &tier.id), 8);
}

#[test]
fn test_expire_overdue_sweeps_only_due_orders() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 20);
    let due_awaiting = create_test_order(&mut conn, &tier.id, 1).order;
    let due_pending = create_test_order(&mut conn, &tier.id, 2).order;
    let live = create_test_order(&mut conn, &tier.id, 3).order;
    mark_awaiting_payment(&conn, &due_awaiting.id);
    backdate_expiry(&conn, &due_awaiting.id);
    backdate_expiry(&conn, &due_pending.id);

    let moved = orders::expire_overdue(&mut conn, now()).unwrap();
    assert_eq!(moved, 2);
    assert_eq!(order_status(&conn, &due_awaiting.id), OrderStatus::Expired);
    assert_eq!(order_status(&conn, &due_pending.id), OrderStatus::Cancelled);
    assert_eq!(order_status(&conn, &live.id), OrderStatus::Pending);
    assert_eq!(tier_available(&conn, &tier.id), 17);

    assert_eq!(orders::expire_overdue(&mut conn, now()).unwrap(), 0);
    assert_eq!(tier_available(&conn, &tier.id), 17);
}

#[test]
fn test_cancel_pending_releases_and_is_repeatable() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);
    let order = create_test_order(&mut conn, &tier.id, 3).order;

    let cancelled = orders::cancel(&mut conn, &order.id, now()).unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(tier_available(&conn, &tier.id), 10);

    let again = orders::cancel(&mut conn, &order.id, now()).unwrap();
    assert_eq!(again.status, OrderStatus::Cancelled);
    assert_eq!(tier_available(&conn, &tier.id), 10);
}

#[test]
fn test_cancel_awaiting_payment_is_conflict() {
    let mut conn = setup_test_db();
    let tier = create_test_catalog(&conn, 10);
    let order = create_test_order(&mut conn, &tier.id, 3).order;
    mark_awaiting_payment(&conn, &order.id);

    let err = orders::cancel(&mut conn, &order.id, now()).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(tier_available(&conn, &tier.id), 7);
}

#[test]
fn test_agent_registration_reuses_open_order() {
    let mut conn = setup_test_db();
    let input = CreateAgentRegistration {
        customer: test_customer("agent-user"),
    };

    let first =
        orders::create_agent_registration(&mut conn, &input, AGENT_FEE, "IDR", ORDER_TTL_SECS, now())
            .unwrap();
    assert_eq!(first.kind, OrderKind::AgentRegistration);
    assert_eq!(first.total_amount, AGENT_FEE);
    assert_eq!(first.external_reference, format!("AGENT-REG-{}", first.id));

    let second =
        orders::create_agent_registration(&mut conn, &input, AGENT_FEE, "IDR", ORDER_TTL_SECS, now())
            .unwrap();
    assert_eq!(second.id, first.id);

    // Once the open one is overdue a fresh order is created.
    backdate_expiry(&conn, &first.id);
    let third =
        orders::create_agent_registration(&mut conn, &input, AGENT_FEE, "IDR", ORDER_TTL_SECS, now())
            .unwrap();
    assert_ne!(third.id, first.id);
    // The stale order is resolved on the spot, not left for the sweep.
    assert_eq!(order_status(&conn, &first.id), OrderStatus::Cancelled);
}

#[test]
fn test_agent_registration_expires_stale_awaiting_order() {
    let mut conn = setup_test_db();
    let input = CreateAgentRegistration {
        customer: test_customer("agent-user"),
    };
    let first =
        orders::create_agent_registration(&mut conn, &input, AGENT_FEE, "IDR", ORDER_TTL_SECS, now())
            .unwrap();
    mark_awaiting_payment(&conn, &first.id);
    backdate_expiry(&conn, &first.id);

    let second =
        orders::create_agent_registration(&mut conn, &input, AGENT_FEE, "IDR", ORDER_TTL_SECS, now())
            .unwrap();

    assert_ne!(second.id, first.id);
    assert_eq!(second.status, OrderStatus::Pending);
    assert_eq!(order_status(&conn, &first.id), OrderStatus::Expired);
}

#[test]
fn test_agent_registration_rejected_for_existing_agent() {
    let mut conn = setup_test_db();
    let input = CreateAgentRegistration {
        customer: test_customer("agent-user"),
    };
    let order =
        orders::create_agent_registration(&mut conn, &input, AGENT_FEE, "IDR", ORDER_TTL_SECS, now())
            .unwrap();
    queries::try_create_agent(&conn, "agent-user", &order.id, now()).unwrap();

    let err =
        orders::create_agent_registration(&mut conn, &input, AGENT_FEE, "IDR", ORDER_TTL_SECS, now())
            .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}
