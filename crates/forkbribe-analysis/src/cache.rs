//! Opaque key -> bytes result store backed by a directory tree.
//!
//! Read problems of any kind (absent, truncated, undecodable) degrade to a
//! miss and a recompute; only write failures surface. No coherence is
//! promised across concurrent writers.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

#[derive(Debug, Clone)]
pub struct ResultCache {
    root: PathBuf,
}

impl ResultCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ResultCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Raw bytes for a key, or `None` on any kind of miss.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match fs::read(self.path_of(key)) {
            Ok(bytes) => {
                debug!("cache hit for {key} ({} bytes)", bytes.len());
                Some(bytes)
            }
            Err(error) => {
                debug!("cache miss for {key}: {error}");
                None
            }
        }
    }

    /// Persist bytes under a key, creating parent directories as needed.
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.path_of(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        info!("cached {key} ({} bytes)", bytes.len());
        Ok(())
    }

    /// Decode a cached value; decoding failures degrade to a miss.
    pub fn get_decoded<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get(key)?;
        match bincode::deserialize(&bytes) {
            Ok(value) => Some(value),
            Err(error) => {
                debug!("cache entry {key} is undecodable, recomputing: {error}");
                None
            }
        }
    }

    /// Encode and persist a value.
    pub fn put_encoded<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let bytes =
            bincode::serialize(value).map_err(|error| CacheError::Codec(error.to_string()))?;
        self.put(key, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_and_survives_corruption() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path());

        assert!(cache.get_decoded::<Vec<u64>>("a/b.bin").is_none());
        cache.put_encoded("a/b.bin", &vec![1u64, 2, 3]).unwrap();
        assert_eq!(cache.get_decoded::<Vec<u64>>("a/b.bin"), Some(vec![1, 2, 3]));

        // Truncated entries are a miss, not an error.
        std::fs::write(dir.path().join("a/b.bin"), [0u8; 2]).unwrap();
        assert!(cache.get_decoded::<Vec<u64>>("a/b.bin").is_none());
    }
}
