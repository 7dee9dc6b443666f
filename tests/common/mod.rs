//! Test utilities and fixtures for Scramble integration tests

#![allow(dead_code)]

use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

pub use scramble::db::{init_db, queries, AppState};
pub use scramble::gateway::{PaymentGateway, SessionMetadata, TestGateway};
pub use scramble::models::*;

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

/// Create a test tournament with the given capacity split
pub fn create_test_tournament(
    conn: &Connection,
    name: &str,
    capacity: i64,
    reserved_slots: i64,
) -> Tournament {
    let input = CreateTournament {
        name: name.to_string(),
        capacity,
        reserved_slots,
        entry_fee_cents: 7500,
    };
    queries::create_tournament(conn, &input).expect("Failed to create test tournament")
}

/// Create a test registrant with an already-decided admission status
pub fn create_test_registrant(
    conn: &Connection,
    tournament_id: &str,
    name: &str,
    status: AdmissionStatus,
) -> Registrant {
    let input = RegistrantInput {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        payment_type: PaymentType::Gateway,
    };
    queries::insert_registrant(conn, tournament_id, &input, status)
        .expect("Failed to create test registrant")
}

pub fn test_input(name: &str) -> RegistrantInput {
    RegistrantInput {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        payment_type: PaymentType::Gateway,
    }
}

/// Create an AppState for testing. Single-connection pool so every
/// caller observes the same in-memory database.
pub fn create_test_app_state(
    gateway: Option<PaymentGateway>,
    webhook_secret: Option<&str>,
) -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(1).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        gateway,
        webhook_secret: webhook_secret.map(String::from),
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/thanks".to_string(),
        http_client: reqwest::Client::new(),
        notify_webhook_url: None,
    }
}

/// Create an AppState over a file-backed database so concurrent tasks
/// each get their own connection, the way production does. Callers own
/// the file and remove it afterwards.
pub fn create_file_app_state(db_path: &str, gateway: Option<PaymentGateway>) -> AppState {
    let pool = scramble::db::create_pool(db_path).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        gateway,
        webhook_secret: None,
        base_url: "http://localhost:3000".to_string(),
        success_page_url: "http://localhost:3000/thanks".to_string(),
        http_client: reqwest::Client::new(),
        notify_webhook_url: None,
    }
}

/// Create a Router with all endpoints
pub fn app(state: AppState) -> Router {
    scramble::handlers::router().with_state(state)
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
