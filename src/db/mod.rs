mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::gateway::PaymentGateway;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state carried through every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// None when the process runs without a configured gateway; checkout
    /// and webhook endpoints surface that as unavailable rather than
    /// panicking.
    pub gateway: Option<PaymentGateway>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub success_page_url: String,
    pub http_client: reqwest::Client,
    pub notify_webhook_url: Option<String>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        // Concurrent writers back off instead of failing immediately.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")
    });
    Pool::builder().max_size(10).build(manager)
}
