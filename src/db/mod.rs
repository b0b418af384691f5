mod from_row;
pub mod queries;
mod schema;

pub use from_row::{FromRow, query_all, query_one};
pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::crypto::TicketCodeSigner;
use crate::payments::{PaymentGateway, RetryPolicy};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Business settings the handlers need at request time.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Seconds an order may stay unpaid before it expires
    pub order_ttl_secs: i64,
    pub agent_registration_fee: i64,
    pub currency: String,
    /// Shared secret the gateway sends in `x-callback-token`
    pub callback_token: String,
    /// Bearer key for administrative overrides
    pub admin_api_key: String,
    pub retry: RetryPolicy,
}

/// Application state holding the database pool, collaborators and settings
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub code_signer: Arc<TicketCodeSigner>,
    pub settings: Arc<Settings>,
}

/// Every pooled connection waits on the write lock instead of failing fast,
/// which is what lets separate processes share the file.
pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch("PRAGMA busy_timeout = 5000; PRAGMA foreign_keys = ON;")
    });
    Pool::builder().max_size(10).build(manager)
}
