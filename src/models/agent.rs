use serde::{Deserialize, Serialize};

pub const AGENT_ROLE: &str = "agent";

/// Active sales agent, created once per user when the registration order is paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub order_id: String,
    pub activated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleGrant {
    pub user_id: String,
    pub role: String,
    pub granted_at: i64,
    pub source_order_id: Option<String>,
}
