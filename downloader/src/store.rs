/// Local asset storage: name to path mapping, existence checks, and atomic commits.
///
/// Transfers are staged in hidden temporary files inside the storage root and renamed
/// into place on success. A staged file that is dropped without being committed is
/// deleted, so no exit path leaves partial data behind.
use std::path::{Path, PathBuf};

use mediablob_shared::StoreError;
use tempfile::NamedTempFile;
use tracing::{debug, info};

const STAGING_PREFIX: &str = ".mediablob-";
const STAGING_SUFFIX: &str = ".part";

/// Map an asset name to a file name inside the storage root.
///
/// Characters that could escape the root or are invalid on common filesystems are
/// percent-encoded, as are `%` itself and a leading `.`. The mapping is injective, so
/// two distinct names never share a file, and [`decode_filename`] reverses it.
pub fn encode_filename(name: &str) -> String {
    if name.is_empty() {
        // A lone `%` is never produced for a non-empty name.
        return "%".to_string();
    }

    let mut encoded = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        let escape = match c {
            '%' | '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => true,
            '.' => i == 0,
            c => c.is_control(),
        };
        if escape {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{:02X}", byte));
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

/// Recover the asset name from a stored file name.
///
/// Returns `None` for file names [`encode_filename`] could not have produced.
pub fn decode_filename(file_name: &str) -> Option<String> {
    if file_name == "%" {
        return Some(String::new());
    }
    let name = urlencoding::decode(file_name).ok()?.into_owned();
    (encode_filename(&name) == file_name).then_some(name)
}

/// Handle on the local download directory.
#[derive(Debug, Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the storage root if it does not exist.
    pub fn ensure_root(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.root).map_err(|source| StoreError::Io {
            path: self.root.clone(),
            source,
        })
    }

    /// Final location for an asset. Pure: the same name always maps to the same path.
    pub fn destination_path(&self, name: &str) -> PathBuf {
        self.root.join(encode_filename(name))
    }

    /// Whether a committed copy of the asset exists.
    pub fn exists(&self, name: &str) -> bool {
        self.destination_path(name).is_file()
    }

    /// Open a hidden temporary file in the storage root for an incoming transfer.
    pub fn stage(&self, name: &str) -> Result<NamedTempFile, StoreError> {
        let prefix = format!("{}{}.", STAGING_PREFIX, encode_filename(name));
        tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(STAGING_SUFFIX)
            .tempfile_in(&self.root)
            .map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })
    }

    /// Atomically move a fully written staged file to the asset's destination.
    ///
    /// On failure the staged file is removed and nothing appears at the destination.
    pub fn commit(&self, staged: NamedTempFile, name: &str) -> Result<PathBuf, StoreError> {
        let destination = self.destination_path(name);
        match staged.persist(&destination) {
            Ok(_) => {
                debug!("Committed {} to {}", name, destination.display());
                Ok(destination)
            }
            Err(err) => {
                // Dropping the returned handle deletes the temporary file.
                drop(err.file);
                Err(StoreError::Commit {
                    name: name.to_string(),
                    source: err.error,
                })
            }
        }
    }

    /// Delete the local copy of an asset. Returns false if there was none.
    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let path = self.destination_path(name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed local copy {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }

    /// Asset names of committed files, sorted. Staging files, hidden entries, and files
    /// whose names do not decode to an asset name are skipped.
    pub fn list_local(&self) -> Result<Vec<String>, StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.root.clone(),
            source,
        };

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root).map_err(io_error)? {
            let entry = entry.map_err(io_error)?;
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if !entry.file_type().map_err(io_error)?.is_file() {
                continue;
            }
            if let Some(name) = decode_filename(&name) {
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
    use std::io::Write;
    use tempfile::TempDir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_destination_path_is_deterministic() {
        let store = AssetStore::new("/data/downloads");
        let first = store.destination_path("clip.mp4");
        let second = store.destination_path("clip.mp4");
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("/data/downloads/clip.mp4"));
    }

    #[test]
    fn test_destination_path_stays_in_root() {
        let store = AssetStore::new("/data/downloads");
        assert_eq!(
            store.destination_path("../etc/passwd"),
            PathBuf::from("/data/downloads/%2E.%2Fetc%2Fpasswd")
        );
        assert_eq!(store.destination_path(".."), PathBuf::from("/data/downloads/%2E."));
        assert_eq!(store.destination_path(".hidden"), PathBuf::from("/data/downloads/%2Ehidden"));
    }

    #[test]
    fn test_encode_filename() {
        assert_eq!(encode_filename("test/file.mp3"), "test%2Ffile.mp3");
        assert_eq!(encode_filename("normal-name.mp3"), "normal-name.mp3");
        assert_eq!(encode_filename("My Song (live).mp3"), "My Song (live).mp3");
        assert_eq!(encode_filename("100%.mp3"), "100%25.mp3");
        assert_eq!(encode_filename(""), "%");
    }

    #[test]
    fn test_distinct_names_map_to_distinct_files() {
        let names = ["a:b.mp3", "a_b.mp3", "a%3Ab.mp3", "a%b.mp3", "", "%", ".", "%2E", "é?.png"];
        let encoded: std::collections::HashSet<String> =
            names.iter().map(|n| encode_filename(n)).collect();
        assert_eq!(encoded.len(), names.len());

        for name in names {
            assert_eq!(decode_filename(&encode_filename(name)).as_deref(), Some(name));
        }
        assert_eq!(decode_filename("a%zz"), None);
        assert_eq!(decode_filename("a%3ab.mp3"), None);
    }

    #[test]
    fn test_commit_moves_staged_file_into_place() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path());
        assert!(!store.exists("song.mp3"));

        let mut staged = store.stage("song.mp3").unwrap();
        staged.write_all(b"audio").unwrap();
        let path = store.commit(staged, "song.mp3").unwrap();

        assert!(store.exists("song.mp3"));
        assert_eq!(std::fs::read(path).unwrap(), b"audio");
        assert_eq!(entries(dir.path()), vec!["song.mp3".to_string()]);
    }

    #[test]
    fn test_dropped_stage_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path());
        {
            let mut staged = store.stage("clip.mp4").unwrap();
            staged.write_all(b"partial").unwrap();
            assert_eq!(entries(dir.path()).len(), 1);
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn test_failed_commit_cleans_up() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path());
        // A directory squatting on the destination makes the rename fail.
        std::fs::create_dir(dir.path().join("clip.mp4")).unwrap();
        std::fs::write(dir.path().join("clip.mp4").join("keep"), b"x").unwrap();

        let staged = store.stage("clip.mp4").unwrap();
        let err = store.commit(staged, "clip.mp4").unwrap_err();

        assert!(matches!(err, StoreError::Commit { .. }));
        assert_eq!(entries(dir.path()), vec!["clip.mp4".to_string()]);
        assert!(!store.exists("clip.mp4"));
    }

    #[test]
    fn test_stage_without_root_fails() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path().join("missing"));
        assert!(matches!(store.stage("a.mp3"), Err(StoreError::Io { .. })));

        store.ensure_root().unwrap();
        assert!(store.stage("a.mp3").is_ok());
    }

    #[test]
    fn test_list_local_and_remove() {
        let dir = TempDir::new().unwrap();
        let store = AssetStore::new(dir.path());
        std::fs::write(dir.path().join("b.mp3"), b"b").unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"a").unwrap();
        std::fs::write(store.destination_path("c:d.png"), b"c").unwrap();
        std::fs::write(dir.path().join("stray%zz"), b"?").unwrap();
        let _staged = store.stage("e.png").unwrap();

        assert_eq!(store.list_local().unwrap(), vec!["a.mp4", "b.mp3", "c:d.png"]);
        assert!(store.remove("c:d.png").unwrap());
        assert!(store.remove("a.mp4").unwrap());
        assert!(!store.remove("a.mp4").unwrap());
        assert_eq!(store.list_local().unwrap(), vec!["b.mp3"]);
    }
}
