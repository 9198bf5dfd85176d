/// HTTP routes for the media catalog server.
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use mediablob_shared::{Asset, CatalogError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::catalog::CatalogService;

/// Shared application state for all handlers.
pub struct AppState {
    pub catalog: CatalogService,
}

/// Build the full router: catalog listing plus static file serving under `/media`.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let media = ServeDir::new(state.catalog.media_dir());

    Router::new()
        .route("/media-list", get(media_list))
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// GET /media-list
pub async fn media_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Asset>>, (StatusCode, String)> {
    match state.catalog.list_assets().await {
        Ok(assets) => {
            info!("Served media list with {} files", assets.len());
            Ok(Json(assets))
        }
        Err(e) => {
            error!("Failed to build media list: {}", e);
            let message = match e {
                CatalogError::Scan { .. } => "Unable to scan media directory.",
                CatalogError::NoReachableAddress => "No reachable network address for media URLs.",
            };
            Err((StatusCode::INTERNAL_SERVER_ERROR, message.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::HostAddress;
    use crate::catalog::ExtensionFilter;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn app(media_dir: &Path) -> Router {
        let catalog = CatalogService::new(
            media_dir,
            3000,
            ExtensionFilter::supported(),
            HostAddress::Fixed("192.168.1.20".to_string()),
        );
        router(Arc::new(AppState { catalog }))
    }

    async fn send_get(app: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, body.to_vec())
    }

    #[tokio::test]
    async fn test_media_list_returns_json_catalog() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("clip.mov"), b"v").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"t").unwrap();

        let (status, content_type, body) = send_get(app(dir.path()), "/media-list").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));

        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{
                "name": "clip.mov",
                "url": "http://192.168.1.20:3000/media/clip.mov",
                "type": "video"
            }])
        );
    }

    #[tokio::test]
    async fn test_media_list_scan_failure_is_500_text() {
        let dir = TempDir::new().unwrap();
        let (status, _, body) = send_get(app(&dir.path().join("missing")), "/media-list").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(String::from_utf8(body).unwrap(), "Unable to scan media directory.");
    }

    #[tokio::test]
    async fn test_media_files_are_served_by_escaped_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("my song.mp3"), b"ID3 bytes").unwrap();

        let (status, content_type, body) = send_get(app(dir.path()), "/media/my%20song.mp3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(body, b"ID3 bytes");
    }

    #[tokio::test]
    async fn test_unknown_media_is_404() {
        let dir = TempDir::new().unwrap();
        let (status, _, _) = send_get(app(dir.path()), "/media/ghost.mp4").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
