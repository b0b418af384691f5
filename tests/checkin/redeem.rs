//! Redemption tests: exactly-once admission, revert, and the scanner session.

#[path = "../common/mod.rs"]
mod common;
use common::*;

use std::sync::{Arc, Barrier};
use std::thread;

use boxoffice::checkin::{self, RedeemResult, ScanSession};
use boxoffice::error::AppError;

/// Paid order with issued tickets; returns their codes.
fn issued_codes(conn: &mut rusqlite::Connection, qty: i64) -> Vec<String> {
    let signer = test_signer();
    let tier = create_test_catalog(conn, 10);
    let order = create_test_order(conn, &tier.id, qty).order;
    boxoffice::tickets::issue_for_order(conn, &signer, &order.id, now())
        .unwrap()
        .tickets
        .into_iter()
        .map(|t| t.code)
        .collect()
}

#[test]
fn test_redeem_admits_once() {
    let mut conn = setup_test_db();
    let signer = test_signer();
    let code = issued_codes(&mut conn, 1).remove(0);

    let first = checkin::redeem(&conn, &signer, &code, "gate-a", 1_000).unwrap();
    match first {
        RedeemResult::Admitted(ctx) => {
            assert_eq!(ctx.code, code);
            assert_eq!(ctx.concert_title, "Test Concert");
            assert_eq!(ctx.tier_name, "Regular");
            assert_eq!(ctx.redeemed_at, Some(1_000));
            assert_eq!(ctx.redeemed_by.as_deref(), Some("gate-a"));
        }
        other => panic!("expected Admitted, got {:?}", other),
    }

    let second = checkin::redeem(&conn, &signer, &code, "gate-b", 2_000).unwrap();
    assert_eq!(
        second,
        RedeemResult::AlreadyRedeemed {
            redeemed_at: 1_000,
            redeemed_by: Some("gate-a".to_string()),
        }
    );
}

#[test]
fn test_redeem_normalizes_typed_codes() {
    let mut conn = setup_test_db();
    let signer = test_signer();
    let code = issued_codes(&mut conn, 1).remove(0);
    let typed = format!("  {}\n", code.to_lowercase());

    let result = checkin::redeem(&conn, &signer, &typed, "gate-a", now()).unwrap();
    assert!(matches!(result, RedeemResult::Admitted(_)));
}

#[test]
fn test_unknown_and_forged_codes_are_rejected() {
    let mut conn = setup_test_db();
    let signer = test_signer();
    issued_codes(&mut conn, 1);

    // Well-formed and correctly signed, but never issued.
    let never_issued = signer.generate();
    assert_eq!(
        checkin::redeem(&conn, &signer, &never_issued, "gate-a", now()).unwrap(),
        RedeemResult::UnknownCode
    );

    // Signed by someone else.
    let foreign = TicketCodeSigner::new(b"another-secret").unwrap().generate();
    assert_eq!(
        checkin::redeem(&conn, &signer, &foreign, "gate-a", now()).unwrap(),
        RedeemResult::UnknownCode
    );

    assert_eq!(
        checkin::redeem(&conn, &signer, "hello", "gate-a", now()).unwrap(),
        RedeemResult::UnknownCode
    );
}

#[test]
fn test_redeem_requires_operator() {
    let mut conn = setup_test_db();
    let signer = test_signer();
    let code = issued_codes(&mut conn, 1).remove(0);

    let err = checkin::redeem(&conn, &signer, &code, "  ", now()).unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    let ticket = queries::get_ticket_by_code(&conn, &code).unwrap().unwrap();
    assert_eq!(ticket.redemption_state, RedemptionState::Issued);
}

#[test]
fn test_concurrent_scans_admit_once() {
    let db = TestDb::new();
    let code = {
        let mut conn = db.pool.get().unwrap();
        issued_codes(&mut conn, 1).remove(0)
    };

    const SCANNERS: usize = 4;
    let barrier = Arc::new(Barrier::new(SCANNERS));
    let handles: Vec<_> = (0..SCANNERS)
        .map(|i| {
            let pool = db.pool.clone();
            let barrier = barrier.clone();
            let code = code.clone();
            thread::spawn(move || {
                let signer = test_signer();
                let conn = pool.get().unwrap();
                barrier.wait();
                checkin::redeem(&conn, &signer, &code, &format!("gate-{}", i), now()).unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let admitted = results
        .iter()
        .filter(|r| matches!(r, RedeemResult::Admitted(_)))
        .count();
    assert_eq!(admitted, 1, "results: {:?}", results);
}

#[test]
fn test_revert_redemption_writes_audit_row() {
    let mut conn = setup_test_db();
    let signer = test_signer();
    let code = issued_codes(&mut conn, 1).remove(0);
    checkin::redeem(&conn, &signer, &code, "gate-a", 1_000).unwrap();

    let ticket =
        checkin::revert_redemption(&mut conn, &code, "admin-1", "scanned wrong wristband", 2_000)
            .unwrap();

    assert_eq!(ticket.redemption_state, RedemptionState::Issued);
    assert_eq!(ticket.redeemed_at, None);
    assert_eq!(ticket.redeemed_by, None);

    let audit = queries::list_audit_logs_for_resource(&conn, "ticket", &ticket.id).unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, "revert_redemption");
    assert_eq!(audit[0].actor_type, ActorType::Admin);
    assert_eq!(audit[0].actor_id.as_deref(), Some("admin-1"));
    let details = audit[0].details.as_ref().expect("details recorded");
    assert_eq!(details["reason"], "scanned wrong wristband");
    assert_eq!(details["previous_redeemed_by"], "gate-a");
    assert_eq!(details["previous_redeemed_at"], 1_000);

    // The ticket can be admitted again.
    let again = checkin::redeem(&conn, &signer, &code, "gate-b", 3_000).unwrap();
    assert!(matches!(again, RedeemResult::Admitted(_)));
}

#[test]
fn test_revert_unredeemed_or_unknown_ticket_fails() {
    let mut conn = setup_test_db();
    let code = issued_codes(&mut conn, 1).remove(0);

    let err = checkin::revert_redemption(&mut conn, &code, "admin-1", "oops", now()).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = checkin::revert_redemption(&mut conn, "TKT-NOPE", "admin-1", "oops", now())
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let audit: i64 = conn
        .query_row("SELECT COUNT(*) FROM audit_logs", [], |r| r.get(0))
        .unwrap();
    assert_eq!(audit, 0);
}

#[test]
fn test_scan_session_survives_bad_input() {
    let mut conn = setup_test_db();
    let signer = test_signer();
    let codes = issued_codes(&mut conn, 2);
    let mut session = ScanSession::new(&signer, "gate-a");

    let lines = [
        "".to_string(),
        "\u{1b}[2J garbage from the reader".to_string(),
        codes[0].clone(),
        format!("https://tix.example/t/{}", codes[1]),
        codes[0].clone(),
        signer.generate(),
    ];
    for line in &lines {
        session.handle_line(&conn, line, now()).unwrap();
    }

    let stats = session.stats();
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.admitted, 2);
    assert_eq!(stats.already_redeemed, 1);
    assert_eq!(stats.unknown, 1);
}

#[test]
fn test_scan_session_finds_code_behind_lookalike_host() {
    let mut conn = setup_test_db();
    let signer = test_signer();
    let code = issued_codes(&mut conn, 1).remove(0);
    let mut session = ScanSession::new(&signer, "gate-a");

    let line = format!("https://tkt-shop.example.id/t/{}?src=qr", code);
    let result = session.handle_line(&conn, &line, now()).unwrap();

    assert!(matches!(result, Some(RedeemResult::Admitted(_))));
    assert_eq!(session.stats().admitted, 1);
}
