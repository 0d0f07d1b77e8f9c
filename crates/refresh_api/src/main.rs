use clap::Parser;
use refresh_api::create_app;
use refresh_core::{HeadlessPage, RefresherConfig};
use refresh_engine::Engine;
use std::path::PathBuf;

/// Command line arguments for the station-refresh viewer
#[derive(Parser, Debug)]
#[command(name = "station-refresh")]
#[command(about = "Headless station image viewer with periodic cache-busted refresh")]
struct Args {
    /// Address the station page is served at, e.g. http://host/view/station42
    #[arg(short, long)]
    address: String,

    /// Path to the refresher configuration JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to bind the status server to
    #[arg(short, long, default_value = "3000")]
    port: u16,
}

async fn load_config(path: Option<&PathBuf>) -> Result<RefresherConfig, String> {
    let Some(path) = path else {
        return Ok(RefresherConfig::default());
    };

    let config_content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

    serde_json::from_str(&config_content)
        .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt().pretty().init();

    let config = load_config(args.config.as_ref()).await?;
    tracing::info!(
        "Refreshing element '{}' every {}ms",
        config.element_id,
        config.refresh_interval_ms
    );

    // The headless page exposes the element the refresher writes to
    let mut page = HeadlessPage::new(args.address.clone());
    page.insert_image(config.element_id.clone());

    let engine = Engine::new(config, &page)?;
    engine.start()?;

    let app = create_app(engine.refresher());

    let bind_addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Starting status server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", bind_addr, e))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .map_err(|e| format!("Server error: {}", e))?;

    engine.stop();
    Ok(())
}
