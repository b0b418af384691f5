//! Door check-in: admit each physical ticket exactly once.

use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use serde_json::json;

use crate::crypto::{self, TicketCodeSigner, normalize_code};
use crate::db::queries;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::models::{ActorType, AuditAction, CheckinContext, Ticket};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RedeemResult {
    /// First scan: the holder may enter
    Admitted(CheckinContext),
    /// Scanned before; carries the original redemption
    AlreadyRedeemed {
        redeemed_at: i64,
        redeemed_by: Option<String>,
    },
    /// Not a code we issued
    UnknownCode,
}

/// Redeem a scanned or typed code.
///
/// The `issued -> redeemed` flip is one conditional UPDATE, so two scanners
/// racing on the same ticket admit it once.
pub fn redeem(
    conn: &Connection,
    signer: &TicketCodeSigner,
    raw_code: &str,
    operator: &str,
    now: i64,
) -> Result<RedeemResult> {
    let operator = operator.trim();
    if operator.is_empty() {
        return Err(AppError::BadRequest("operator is required".into()));
    }

    let code = normalize_code(raw_code);
    if !signer.verify(&code) {
        tracing::debug!(code = %code, "Rejected code with bad check characters");
        return Ok(RedeemResult::UnknownCode);
    }

    if queries::try_redeem_ticket(conn, &code, operator, now)? {
        let context = queries::get_checkin_context(conn, &code)?
            .ok_or_else(|| AppError::Internal(format!("Redeemed ticket {} has no context", code)))?;
        tracing::info!(
            ticket_id = %context.ticket_id,
            order_number = %context.order_number,
            operator,
            "Ticket admitted"
        );
        return Ok(RedeemResult::Admitted(context));
    }

    let Some(ticket) = queries::get_ticket_by_code(conn, &code)? else {
        return Ok(RedeemResult::UnknownCode);
    };
    let redeemed_at = ticket.redeemed_at.ok_or_else(|| {
        AppError::Internal(format!("Ticket {} changed state during check-in", ticket.id))
    })?;

    tracing::warn!(
        ticket_id = %ticket.id,
        first_redeemed_at = redeemed_at,
        first_redeemed_by = ?ticket.redeemed_by,
        operator,
        "Ticket scanned again"
    );
    Ok(RedeemResult::AlreadyRedeemed {
        redeemed_at,
        redeemed_by: ticket.redeemed_by,
    })
}

/// Administrative override: put a redeemed ticket back to `issued`.
///
/// Leaves an audit row with who did it, why, and the redemption it undid.
pub fn revert_redemption(
    conn: &mut Connection,
    raw_code: &str,
    admin: &str,
    reason: &str,
    now: i64,
) -> Result<Ticket> {
    let code = normalize_code(raw_code);
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let before = queries::get_ticket_by_code(&tx, &code)?.or_not_found(msg::TICKET_NOT_FOUND)?;
    if !queries::try_unredeem_ticket(&tx, &code)? {
        return Err(AppError::Conflict(msg::TICKET_NOT_REDEEMED.into()));
    }

    queries::create_audit_log(
        &tx,
        ActorType::Admin,
        Some(admin),
        AuditAction::RevertRedemption,
        "ticket",
        &before.id,
        Some(&json!({
            "reason": reason,
            "previous_redeemed_at": before.redeemed_at,
            "previous_redeemed_by": before.redeemed_by,
            "reverted_at": now,
        })),
    )?;

    let after = queries::get_ticket_by_code(&tx, &code)?.or_not_found(msg::TICKET_NOT_FOUND)?;
    tx.commit()?;

    tracing::warn!(ticket_id = %after.id, admin, reason, "Redemption reverted");
    Ok(after)
}

// ============ Scanner input ============

/// One line of raw scanner output, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanLine {
    Blank,
    /// Input with no recognizable ticket code in it
    Undecodable(String),
    Code(String),
}

const CODE_LEN: usize = "TKT-XXXX-XXXX-XXXX-XXXX-CC".len();

/// Pull a ticket code out of a scanner line.
///
/// QR payloads may wrap the code in a URL or other text, and the host name
/// itself can contain `tkt-`. The first well-formed candidate wins; failing
/// that, the first full-length one is passed on to be rejected at lookup.
pub fn decode_line(raw: &str) -> ScanLine {
    let line = raw.trim();
    if line.is_empty() {
        return ScanLine::Blank;
    }
    let upper = line.to_ascii_uppercase();
    let mut candidates = upper
        .match_indices("TKT-")
        .filter_map(|(start, _)| upper.get(start..start + CODE_LEN));
    let Some(first) = candidates.next() else {
        return ScanLine::Undecodable(line.to_string());
    };
    let code = std::iter::once(first)
        .chain(candidates)
        .find(|c| crypto::is_code_shaped(c))
        .unwrap_or(first);
    ScanLine::Code(code.to_string())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub admitted: u64,
    pub already_redeemed: u64,
    pub unknown: u64,
    /// Blank or undecodable lines
    pub skipped: u64,
}

/// A scanning station's session. Bad input never ends the session; only
/// decoded codes reach [`redeem`].
pub struct ScanSession<'a> {
    signer: &'a TicketCodeSigner,
    operator: String,
    stats: ScanStats,
}

impl<'a> ScanSession<'a> {
    pub fn new(signer: &'a TicketCodeSigner, operator: &str) -> Self {
        Self {
            signer,
            operator: operator.to_string(),
            stats: ScanStats::default(),
        }
    }

    /// Handle one raw line. `Ok(None)` means the line was skipped.
    pub fn handle_line(
        &mut self,
        conn: &Connection,
        line: &str,
        now: i64,
    ) -> Result<Option<RedeemResult>> {
        let code = match decode_line(line) {
            ScanLine::Code(code) => code,
            ScanLine::Blank => {
                self.stats.skipped += 1;
                return Ok(None);
            }
            ScanLine::Undecodable(raw) => {
                self.stats.skipped += 1;
                tracing::warn!(input = %raw, "Skipping undecodable scan");
                return Ok(None);
            }
        };

        let result = redeem(conn, self.signer, &code, &self.operator, now)?;
        match &result {
            RedeemResult::Admitted(_) => self.stats.admitted += 1,
            RedeemResult::AlreadyRedeemed { .. } => self.stats.already_redeemed += 1,
            RedeemResult::UnknownCode => self.stats.unknown += 1,
        }
        Ok(Some(result))
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }
}
