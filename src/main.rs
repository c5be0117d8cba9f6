use anyhow::{Context, Result};
use dotenv::dotenv;
use std::sync::Arc;

use pathoscan::web::server::create_router;
use pathoscan::{Config, GeminiService, WoundAnalyzer};

#[tokio::main]
async fn main() -> Result<()> {
    // .env may carry RUST_LOG, so load it before the logger
    dotenv().ok();
    env_logger::init();

    log::info!("🚀 Starting PathoScan...");

    let config = Config::from_env();

    let gemini = GeminiService::new(
        config.api_key.clone(),
        config.model.clone(),
        config.api_base.clone(),
        config.timeout,
    )
    .context("Failed to build Gemini HTTP client")?;
    log::info!("✅ Gemini service initialized with model: {}", config.model);

    let analyzer = Arc::new(WoundAnalyzer::new(Arc::new(gemini), config.timeout));
    log::info!("⏱️ Analysis timeout: {}s", config.timeout.as_secs());

    let app = create_router(analyzer, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    log::info!("🌐 Upload form available on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server stopped unexpectedly")?;

    log::info!("🛑 Shutting down...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("❌ Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
