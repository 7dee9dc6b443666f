use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::time::Duration;

use scramble::config::{Config, PaymentsMode};
use scramble::db::{create_pool, init_db, queries, AppState};
use scramble::gateway::{PaymentGateway, StripeClient, TestGateway};
use scramble::handlers;
use scramble::models::{CreateGroup, CreateTournament};

#[derive(Parser, Debug)]
#[command(name = "scramble")]
#[command(about = "Tournament registration with capacity-gated admission and payment reconciliation")]
struct Cli {
    /// Seed the database with dev data (tournament, group)
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Seeds the database with a dev tournament so checkout flows can be
/// exercised immediately. Only runs in dev mode and when empty.
fn seed_dev_data(state: &AppState) {
    let conn = state.db.get().expect("Failed to get db connection for seeding");

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM tournaments", [], |row| row.get(0))
        .expect("Failed to count tournaments");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    let tournament = queries::create_tournament(
        &conn,
        &CreateTournament {
            name: "Dev Scramble".to_string(),
            capacity: 72,
            reserved_slots: 8,
            entry_fee_cents: 7500,
        },
    )
    .expect("Failed to create dev tournament");

    let group = queries::create_group(
        &conn,
        &tournament.id,
        &CreateGroup {
            name: "Morning Flight A".to_string(),
        },
    )
    .expect("Failed to create dev group");

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED");
    tracing::info!("Tournament: {} (id: {})", tournament.name, tournament.id);
    tracing::info!(
        "Capacity: {} total, {} public",
        tournament.capacity,
        tournament.public_capacity()
    );
    tracing::info!("Group: {} (id: {})", group.name, group.id);
    tracing::info!("============================================");
}

/// Spawns a background task that periodically removes expired checkout
/// drafts and old webhook dedup rows. Runs every 5 minutes.
fn spawn_cleanup_task(state: AppState) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(5 * 60);

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => {
                    match queries::purge_expired_drafts(&conn) {
                        Ok(count) if count > 0 => {
                            tracing::debug!("Purged {} expired checkout drafts", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("Failed to purge checkout drafts: {}", e);
                        }
                    }
                    match queries::purge_old_webhook_events(&conn, 30) {
                        Ok(count) if count > 0 => {
                            tracing::debug!("Purged {} old webhook event records", count);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!("Failed to purge webhook events: {}", e);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                }
            }
        }
    });

    tracing::info!("Background cleanup task started (runs every 5 minutes)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scramble=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let gateway = match config.payments_mode {
        PaymentsMode::Test => {
            tracing::info!("Payments in TEST mode: in-process gateway, no network calls");
            Some(PaymentGateway::Test(TestGateway::new()))
        }
        PaymentsMode::Live => match &config.stripe_secret_key {
            Some(key) => Some(PaymentGateway::Stripe(StripeClient::new(
                reqwest::Client::new(),
                key.clone(),
            ))),
            None => {
                tracing::warn!(
                    "No STRIPE_SECRET_KEY configured: checkout and webhook endpoints disabled"
                );
                None
            }
        },
    };

    if config.webhook_secret.is_none() {
        tracing::warn!("No STRIPE_WEBHOOK_SECRET configured: webhook signatures NOT verified");
    }

    let state = AppState {
        db: db_pool,
        gateway,
        webhook_secret: config.webhook_secret.clone(),
        base_url: config.base_url.clone(),
        success_page_url: config.success_page_url.clone(),
        http_client: reqwest::Client::new(),
        notify_webhook_url: config.notify_webhook_url.clone(),
    };

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set SCRAMBLE_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    spawn_cleanup_task(state.clone());

    let app = Router::new()
        .merge(handlers::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("Scramble server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
