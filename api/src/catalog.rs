/// Media directory scanning and classification behind `GET /media-list`.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use mediablob_shared::{Asset, AssetKind, CatalogError};
use tracing::debug;

use crate::address::HostAddress;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "aac", "wav", "m4a"];
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];
pub const DOCUMENT_EXTENSIONS: &[&str] = &["pdf"];

/// Lowercased extension of a filename, without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Classify a file by extension. Video wins over audio, audio over image, and so on.
pub fn classify(filename: &str) -> AssetKind {
    let Some(ext) = extension_of(filename) else {
        return AssetKind::Other;
    };
    let ext = ext.as_str();

    if VIDEO_EXTENSIONS.contains(&ext) {
        AssetKind::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        AssetKind::Audio
    } else if IMAGE_EXTENSIONS.contains(&ext) {
        AssetKind::Image
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        AssetKind::Document
    } else {
        AssetKind::Other
    }
}

/// Which extensions are published in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtensionFilter {
    /// Every visible file is listed; unknown extensions come out as `other`.
    All,
    Only(BTreeSet<String>),
}

impl ExtensionFilter {
    /// The default published set: every extension with a known classification.
    pub fn supported() -> Self {
        let exts = VIDEO_EXTENSIONS
            .iter()
            .chain(AUDIO_EXTENSIONS)
            .chain(IMAGE_EXTENSIONS)
            .chain(DOCUMENT_EXTENSIONS)
            .map(|ext| ext.to_string())
            .collect();
        ExtensionFilter::Only(exts)
    }

    /// Parse a `MEDIA_EXTENSIONS` value: `*` or a comma separated list such as `mp3,.mp4`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "*" {
            return ExtensionFilter::All;
        }
        let exts = raw
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        ExtensionFilter::Only(exts)
    }

    pub fn allows(&self, filename: &str) -> bool {
        match self {
            ExtensionFilter::All => true,
            ExtensionFilter::Only(exts) => extension_of(filename)
                .map(|ext| exts.contains(&ext))
                .unwrap_or(false),
        }
    }
}

/// Builds catalog listings from a media directory.
///
/// Holds no cache: every call rescans the directory, so concurrent callers never
/// see stale data.
#[derive(Debug, Clone)]
pub struct CatalogService {
    media_dir: PathBuf,
    port: u16,
    filter: ExtensionFilter,
    host: HostAddress,
}

impl CatalogService {
    pub fn new(media_dir: impl Into<PathBuf>, port: u16, filter: ExtensionFilter, host: HostAddress) -> Self {
        Self {
            media_dir: media_dir.into(),
            port,
            filter,
            host,
        }
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Scan the media directory and build the full, name-ordered asset list.
    ///
    /// Either every visible entry is returned or an error is; there is no partial listing.
    pub async fn list_assets(&self) -> Result<Vec<Asset>, CatalogError> {
        let names = self.scan().await?;
        let host = self.host.resolve()?;

        let assets = names
            .into_iter()
            .map(|name| {
                let url = self.source_url(&host, &name);
                let kind = classify(&name);
                Asset::new(name, url, kind)
            })
            .collect();
        Ok(assets)
    }

    fn source_url(&self, host: &str, name: &str) -> String {
        format!(
            "http://{}:{}/media/{}",
            host,
            self.port,
            urlencoding::encode(name)
        )
    }

    async fn scan(&self) -> Result<Vec<String>, CatalogError> {
        let scan_error = |source| CatalogError::Scan {
            path: self.media_dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.media_dir)
            .await
            .map_err(scan_error)?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(scan_error)? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    debug!("Skipping non UTF-8 entry {:?}", raw);
                    continue;
                }
            };

            if name.starts_with('.') || !self.filter.allows(&name) {
                continue;
            }

            let file_type = entry.file_type().await.map_err(scan_error)?;
            let is_file = if file_type.is_symlink() {
                // Dangling links are skipped rather than failing the whole listing.
                tokio::fs::metadata(entry.path())
                    .await
                    .map(|meta| meta.is_file())
                    .unwrap_or(false)
            } else {
                file_type.is_file()
            };

            if is_file {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn media_dir(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in files {
            fs::write(dir.path().join(file), b"data").unwrap();
        }
        dir
    }

    fn service(dir: &Path, filter: ExtensionFilter) -> CatalogService {
        CatalogService::new(dir, 3000, filter, HostAddress::Fixed("10.0.0.129".to_string()))
    }

    #[test]
    fn test_classification_priority() {
        assert_eq!(classify("a.mp4"), AssetKind::Video);
        assert_eq!(classify("b.mp3"), AssetKind::Audio);
        assert_eq!(classify("c.png"), AssetKind::Image);
        assert_eq!(classify("d.pdf"), AssetKind::Document);
        assert_eq!(classify("e.xyz"), AssetKind::Other);
        assert_eq!(classify("README"), AssetKind::Other);
        assert_eq!(classify("LOUD.MOV"), AssetKind::Video);
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(ExtensionFilter::parse("*"), ExtensionFilter::All);
        let filter = ExtensionFilter::parse(" mp3, .MP4 ,,");
        assert!(filter.allows("song.mp3"));
        assert!(filter.allows("clip.mp4"));
        assert!(!filter.allows("photo.png"));
        assert!(!filter.allows("noext"));
    }

    #[tokio::test]
    async fn test_list_assets_with_supported_filter() {
        let dir = media_dir(&["a.mp4", "b.mp3", "c.png", "d.pdf", "e.xyz", ".hidden.mp3"]);
        let assets = service(dir.path(), ExtensionFilter::supported())
            .list_assets()
            .await
            .unwrap();

        let listed: Vec<(&str, AssetKind)> =
            assets.iter().map(|a| (a.name.as_str(), a.kind)).collect();
        assert_eq!(
            listed,
            vec![
                ("a.mp4", AssetKind::Video),
                ("b.mp3", AssetKind::Audio),
                ("c.png", AssetKind::Image),
                ("d.pdf", AssetKind::Document),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_assets_without_filter_keeps_other() {
        let dir = media_dir(&["a.mp4", "e.xyz", ".DS_Store"]);
        let assets = service(dir.path(), ExtensionFilter::All)
            .list_assets()
            .await
            .unwrap();

        assert_eq!(assets.len(), 2);
        assert_eq!(assets[1].name, "e.xyz");
        assert_eq!(assets[1].kind, AssetKind::Other);
    }

    #[tokio::test]
    async fn test_source_url_is_escaped() {
        let dir = media_dir(&["my song #1.mp3"]);
        let assets = service(dir.path(), ExtensionFilter::supported())
            .list_assets()
            .await
            .unwrap();

        assert_eq!(
            assets[0].source_url,
            "http://10.0.0.129:3000/media/my%20song%20%231.mp3"
        );
    }

    #[tokio::test]
    async fn test_directories_are_skipped() {
        let dir = media_dir(&["a.mp3"]);
        fs::create_dir(dir.path().join("album.mp4")).unwrap();
        let assets = service(dir.path(), ExtensionFilter::supported())
            .list_assets()
            .await
            .unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].name, "a.mp3");
    }

    #[tokio::test]
    async fn test_missing_directory_is_scan_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        let err = service(&missing, ExtensionFilter::supported())
            .list_assets()
            .await
            .unwrap_err();

        assert!(matches!(err, CatalogError::Scan { .. }));
    }

    #[tokio::test]
    async fn test_repeated_listing_is_stable() {
        let dir = media_dir(&["b.mp3", "a.mp4"]);
        let catalog = service(dir.path(), ExtensionFilter::supported());
        let first = catalog.list_assets().await.unwrap();
        let second = catalog.list_assets().await.unwrap();
        assert_eq!(first, second);
    }
}
