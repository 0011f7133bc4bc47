//! Question-bank job API server.

use qbank_api::config::ApiConfig;
use qbank_api::server::{self, AppState};
use qbank_jobs::TextQuestionParser;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = ApiConfig::from_env()?;
    let state = AppState::in_memory(cfg.max_jobs, Arc::new(TextQuestionParser::new()));

    if !cfg.purge_interval.is_zero() {
        let tracker = Arc::clone(&state.tracker);
        let retention = cfg.retention;
        let mut ticker = tokio::time::interval(cfg.purge_interval);
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                match tracker.purge_terminal(retention).await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(removed = n, "purged terminal jobs"),
                    Err(e) => tracing::warn!(error = %e, "purge failed"),
                }
            }
        });
    }

    let app = server::router(state);
    tracing::info!(
        max_jobs = cfg.max_jobs,
        "question bank API listening on {}",
        cfg.listen
    );
    axum::serve(
        tokio::net::TcpListener::bind(cfg.listen).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
