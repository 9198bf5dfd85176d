//! Shared types for the Mediablob catalog server and download client.
pub mod errors;
pub mod models;
pub mod state;

pub use errors::{
    CatalogError, ClientError, DownloadError, MediaBlobError, MediaBlobResult, StoreError,
};
pub use models::{Asset, AssetKind};
pub use state::{BatchProgress, DownloadState};
