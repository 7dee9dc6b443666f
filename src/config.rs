use std::env;

/// Which payment backend the process runs against.
///
/// Test mode uses an in-process simulated gateway with synthetic
/// identifiers and no network calls; callers cannot tell the difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentsMode {
    Live,
    Test,
}

/// Process configuration, read once in `main` and passed explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub success_page_url: String,
    pub payments_mode: PaymentsMode,
    pub stripe_secret_key: Option<String>,
    /// Shared secret for webhook signature verification. When absent the
    /// webhook gate accepts unsigned payloads and logs a warning - an
    /// intentional fail-open policy for local/test operation.
    pub webhook_secret: Option<String>,
    pub notify_webhook_url: Option<String>,
    pub dev_mode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("SCRAMBLE_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let payments_mode = match env::var("SCRAMBLE_PAYMENTS_MODE").as_deref() {
            Ok("test") => PaymentsMode::Test,
            _ => PaymentsMode::Live,
        };

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));
        let success_page_url =
            env::var("SUCCESS_PAGE_URL").unwrap_or_else(|_| format!("{}/thanks", base_url));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "scramble.db".to_string()),
            base_url,
            success_page_url,
            payments_mode,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").ok(),
            webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
            notify_webhook_url: env::var("SCRAMBLE_NOTIFY_WEBHOOK_URL").ok(),
            dev_mode,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
