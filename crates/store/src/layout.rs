//! File layout of an embedding store directory.
//!
//! ```text
//! <store>/index.json            entity-id -> chunk id
//! <store>/chunk_info_0000.json  chunk metadata (id, entities, features)
//! <store>/chunk_0000.bin        chunk vector matrix
//! <store>/commit.json           write-ahead marker of an in-flight batch
//! <store>/store.yaml            embedding model fingerprint
//! ```

use affinity_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

const INDEX_FILE: &str = "index.json";
const COMMIT_MARKER_FILE: &str = "commit.json";
const FINGERPRINT_FILE: &str = "store.yaml";
const CHUNK_INFO_PREFIX: &str = "chunk_info_";
const CHUNK_VECTORS_PREFIX: &str = "chunk_";

/// Paths inside one store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the store directory if needed.
    pub fn ensure(&self) -> AppResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            AppError::Config(format!(
                "Failed to create store directory {:?}: {}",
                self.root, e
            ))
        })
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn commit_marker_path(&self) -> PathBuf {
        self.root.join(COMMIT_MARKER_FILE)
    }

    pub fn fingerprint_path(&self) -> PathBuf {
        self.root.join(FINGERPRINT_FILE)
    }

    pub fn chunk_info_path(&self, chunk_id: u32) -> PathBuf {
        self.root
            .join(format!("{}{:04}.json", CHUNK_INFO_PREFIX, chunk_id))
    }

    pub fn chunk_vectors_path(&self, chunk_id: u32) -> PathBuf {
        self.root
            .join(format!("{}{:04}.bin", CHUNK_VECTORS_PREFIX, chunk_id))
    }

    /// Chunk ids that have a metadata file on disk, ascending.
    pub fn chunk_ids_on_disk(&self) -> AppResult<Vec<u32>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(id) = name
                .strip_prefix(CHUNK_INFO_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
                .and_then(|digits| digits.parse::<u32>().ok())
            {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    /// Total size of regular files in the store.
    pub fn disk_bytes(&self) -> AppResult<u64> {
        if !self.exists() {
            return Ok(0);
        }
        let mut total = 0;
        for entry in std::fs::read_dir(&self.root)? {
            let metadata = entry?.metadata()?;
            if metadata.is_file() {
                total += metadata.len();
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_chunk_file_names() {
        let layout = StoreLayout::new("/store");
        assert_eq!(
            layout.chunk_info_path(7),
            PathBuf::from("/store/chunk_info_0007.json")
        );
        assert_eq!(
            layout.chunk_vectors_path(12),
            PathBuf::from("/store/chunk_0012.bin")
        );
        assert_eq!(
            layout.chunk_info_path(12345),
            PathBuf::from("/store/chunk_info_12345.json")
        );
    }

    #[test]
    fn test_chunk_ids_on_disk() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path());
        for id in [2u32, 0, 10] {
            std::fs::write(layout.chunk_info_path(id), "{}").unwrap();
            std::fs::write(layout.chunk_vectors_path(id), "").unwrap();
        }
        std::fs::write(layout.index_path(), "{}").unwrap();

        assert_eq!(layout.chunk_ids_on_disk().unwrap(), vec![0, 2, 10]);
    }

    #[test]
    fn test_missing_store_is_empty() {
        let temp = TempDir::new().unwrap();
        let layout = StoreLayout::new(temp.path().join("nope"));
        assert!(!layout.exists());
        assert!(layout.chunk_ids_on_disk().unwrap().is_empty());
        assert_eq!(layout.disk_bytes().unwrap(), 0);
    }
}
