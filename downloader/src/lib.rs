//! Mediablob download engine.
//!
//! Fetches the remote catalog, transfers assets into a local store with observable
//! per-asset state, and drives whole batches with bounded concurrency.
pub mod batch;
pub mod catalog_client;
pub mod manager;
pub mod store;

pub use batch::{AssetOutcome, BatchCoordinator, BatchHandle, BatchReport, DEFAULT_MAX_CONCURRENT};
pub use catalog_client::CatalogClient;
pub use manager::{DownloadHandle, DownloadManager};
pub use store::AssetStore;
