/// Catalog models shared by the media server and the download client.
use serde::{Deserialize, Serialize};

/// Media classification assigned by the catalog when it is built.
///
/// Clients treat this as opaque data and never reclassify a file themselves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Video,
    Audio,
    Image,
    Document,
    Other,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Video => "video",
            AssetKind::Audio => "audio",
            AssetKind::Image => "image",
            AssetKind::Document => "document",
            AssetKind::Other => "other",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// A remote media item as published by `GET /media-list`.
///
/// `name` is unique within one catalog response and doubles as the local storage key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
}

impl Asset {
    pub fn new(name: impl Into<String>, source_url: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            name: name.into(),
            source_url: source_url.into(),
            kind,
        }
    }
}
