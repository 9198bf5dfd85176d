/// Mediablob Catalog Server
///
/// Publishes the contents of a media directory as `GET /media-list` and serves
/// the raw files under `GET /media/<name>` for LAN clients.
mod address;
mod catalog;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use address::HostAddress;
use catalog::{CatalogService, ExtensionFilter};
use routes::AppState;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env
    dotenvy::dotenv().ok();

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediablob_api=info,tower_http=info".into()),
        )
        .init();

    // Config
    let media_dir = PathBuf::from(
        std::env::var("MEDIA_DIR").unwrap_or_else(|_| "./media".to_string()),
    );
    let api_host = std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let api_port: u16 = std::env::var("API_PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);
    let filter = std::env::var("MEDIA_EXTENSIONS")
        .map(|raw| ExtensionFilter::parse(&raw))
        .unwrap_or_else(|_| ExtensionFilter::supported());
    let public_host = match std::env::var("PUBLIC_HOST") {
        Ok(host) if !host.trim().is_empty() => HostAddress::Fixed(host.trim().to_string()),
        _ => HostAddress::Discover,
    };

    if !media_dir.is_dir() {
        warn!("Media directory {} does not exist yet; /media-list will fail until it does", media_dir.display());
    }
    info!("Media directory: {}", media_dir.display());
    info!("Published extensions: {:?}", filter);

    // Advertised address
    match public_host.resolve() {
        Ok(host) => info!("Media server running at http://{}:{}", host, api_port),
        Err(e) => warn!("{} (catalog listings will fail until an address is available)", e),
    }

    let catalog = CatalogService::new(media_dir, api_port, filter, public_host);
    let state = Arc::new(AppState { catalog });
    let app = routes::router(state);

    // Bind
    let addr = format!("{}:{}", api_host, api_port);
    info!("Mediablob API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
