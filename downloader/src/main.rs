/// Mediablob Downloader - command line client
///
/// Lists the catalog published by a Mediablob server and downloads single assets
/// or the whole catalog into a local directory.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mediablob_downloader::{
    AssetStore, BatchCoordinator, CatalogClient, DownloadManager, DEFAULT_MAX_CONCURRENT,
};
use mediablob_shared::{Asset, DownloadState, MediaBlobError, MediaBlobResult};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "mediablob-downloader", version, about = "Fetch media from a Mediablob server")]
struct Cli {
    /// Base address of the catalog server
    #[arg(long, env = "MEDIABLOB_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Directory downloaded assets are stored in
    #[arg(long, env = "DOWNLOAD_DIR", default_value = "./downloads")]
    dest: PathBuf,

    /// Maximum number of parallel transfers during `grab`
    #[arg(long, env = "MAX_CONCURRENT_TASKS", default_value_t = DEFAULT_MAX_CONCURRENT)]
    concurrency: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the catalog and which assets are already local
    List,
    /// Download one asset by name (Ctrl-C cancels)
    Get { name: String },
    /// Download every asset in the catalog (Ctrl-C cancels)
    Grab,
    /// Delete the local copy of an asset
    Remove { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before clap reads env fallbacks
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediablob_downloader=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let store = AssetStore::new(&cli.dest);
    store.ensure_root()?;
    let http = reqwest::Client::new();
    let catalog = CatalogClient::new(http.clone(), cli.server.clone());
    let manager = DownloadManager::new(http, store);

    let ok = match cli.command {
        Command::List => list(&catalog, &manager).await?,
        Command::Get { name } => get(&catalog, &manager, &name).await?,
        Command::Grab => grab(&catalog, BatchCoordinator::new(manager, cli.concurrency)).await?,
        Command::Remove { name } => remove(&manager, &name)?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn list(catalog: &CatalogClient, manager: &DownloadManager) -> MediaBlobResult<bool> {
    let assets = catalog.fetch_catalog().await?;
    for asset in &assets {
        let mark = if manager.store().exists(&asset.name) { "[x]" } else { "[ ]" };
        println!("{} {:<8} {}", mark, asset.kind, asset.name);
    }
    info!("{} assets on {}", assets.len(), catalog.base_url());
    Ok(true)
}

async fn find_asset(catalog: &CatalogClient, name: &str) -> MediaBlobResult<Asset> {
    catalog
        .fetch_catalog()
        .await?
        .into_iter()
        .find(|asset| asset.name == name)
        .ok_or_else(|| MediaBlobError::NotFound(name.to_string()))
}

async fn get(catalog: &CatalogClient, manager: &DownloadManager, name: &str) -> MediaBlobResult<bool> {
    let asset = find_asset(catalog, name).await?;
    let mut handle = manager.download(&asset).await?;
    let cancel = handle.cancellation_token();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling download");
            cancel.cancel();
        }
    });

    while let Some(state) = handle.next_state().await {
        match &state {
            DownloadState::InProgress(_) => info!("{}: {}", asset.name, state),
            DownloadState::Completed => {
                info!("{} saved to {}", asset.name, manager.store().destination_path(&asset.name).display());
            }
            DownloadState::Failed(e) => error!("{} failed: {}", asset.name, e),
            DownloadState::NotStarted => {}
        }
    }

    Ok(handle.finish().await.is_completed())
}

async fn grab(catalog: &CatalogClient, batch: BatchCoordinator) -> MediaBlobResult<bool> {
    let assets = catalog.fetch_catalog().await?;
    let handle = batch.download_all(assets);
    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling batch");
            cancel.cancel();
        }
    });

    let mut progress = handle.progress();
    let watcher = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            info!(
                "Batch progress {}/{} ({:.0}%)",
                current.completed,
                current.total,
                current.fraction() * 100.0
            );
        }
    });

    let report = handle.finish().await;
    let _ = watcher.await;

    for outcome in report.failed() {
        warn!("{}: {}", outcome.asset.name, outcome.state);
    }
    let retriable = report.retriable();
    if !retriable.is_empty() {
        info!("{} failed assets can be retried with `grab`", retriable.len());
    }
    info!(
        "Downloaded {}/{} assets",
        report.completed().count(),
        report.outcomes.len()
    );
    Ok(report.success())
}

fn remove(manager: &DownloadManager, name: &str) -> MediaBlobResult<bool> {
    if manager.store().remove(name)? {
        Ok(true)
    } else {
        Err(MediaBlobError::NotFound(name.to_string()))
    }
}
