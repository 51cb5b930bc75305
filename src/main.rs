use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use helpmate::config::AppConfig;
use helpmate::db;
use helpmate::handlers;
use helpmate::services::messaging::twilio::TwilioSmsProvider;
use helpmate::services::messaging::MessagingProvider;
use helpmate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    anyhow::ensure!(
        !config.session_secret.is_empty(),
        "SESSION_SECRET must be set"
    );

    let conn = db::init_db(&config.database_url)?;

    let messaging: Option<Arc<dyn MessagingProvider>> = match TwilioSmsProvider::from_config(&config) {
        Some(provider) => {
            tracing::info!("forwarding notifications as SMS via Twilio");
            Some(Arc::new(provider))
        }
        None => {
            tracing::info!("Twilio not configured, notifications stay in-app");
            None
        }
    };

    let state = AppState::new(conn, config.clone(), messaging);
    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
