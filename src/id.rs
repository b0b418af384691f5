//! Prefixed ID generation for boxoffice entities.
//!
//! Format: `bo_{entity}_{uuid_simple}` (32 hex chars, no hyphens). The brand
//! prefix keeps our ids distinguishable from gateway ids inside callback
//! payloads and external references.

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &[
    "bo_con_", "bo_tier_", "bo_ord_", "bo_item_", "bo_res_", "bo_tkt_", "bo_evt_", "bo_agt_",
    "bo_aud_",
];

/// Validate that a string is a well-formed prefixed ID.
///
/// Cheap check to reject garbage before hitting the database.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Validate a prefixed ID of one specific entity type.
pub fn is_valid_id_of(entity: EntityType, s: &str) -> bool {
    s.strip_prefix(entity.prefix())
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some()
        && is_valid_prefixed_id(s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Concert,
    TicketTier,
    Order,
    OrderItem,
    Reservation,
    Ticket,
    PaymentEvent,
    Agent,
    AuditLog,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Concert => "bo_con",
            Self::TicketTier => "bo_tier",
            Self::Order => "bo_ord",
            Self::OrderItem => "bo_item",
            Self::Reservation => "bo_res",
            Self::Ticket => "bo_tkt",
            Self::PaymentEvent => "bo_evt",
            Self::Agent => "bo_agt",
            Self::AuditLog => "bo_aud",
        }
    }

    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
