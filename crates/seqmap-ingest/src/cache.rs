//! Cache directory management
//!
//! Each provider owns one sub directory of the cache root (`pfam/`,
//! `interPro/`, ...). The directory holds the downloaded source files and the
//! JSON index built from them.

use crate::marshal::{export_json, import_json};
use crate::run_blocking;
use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Summary of one provider directory
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CacheEntry {
    pub name: String,
    pub path: PathBuf,
    pub files: usize,
    pub size: u64,
}

/// File-system cache shared by all providers
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn provider_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create the provider directory if needed and return it
    pub fn ensure(&self, name: &str) -> Result<PathBuf> {
        let dir = self.provider_dir(name);
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(dir)
    }

    /// List provider directories, sorted by name
    pub fn list_all(&self) -> Result<Vec<CacheEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(&self.root)? {
            let item = item?;
            if !item.file_type()?.is_dir() {
                continue;
            }
            let path = item.path();
            let (files, size) = dir_usage(&path)?;
            entries.push(CacheEntry {
                name: item.file_name().to_string_lossy().to_string(),
                path,
                files,
                size,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Total bytes under the cache root
    pub fn total_size(&self) -> Result<u64> {
        if !self.root.exists() {
            return Ok(0);
        }
        Ok(dir_usage(&self.root)?.1)
    }

    /// Remove one provider directory. Returns false when it did not exist.
    pub fn remove(&self, name: &str) -> Result<bool> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." || name == "." {
            bail!("Invalid cache name: {:?}", name);
        }

        let dir = self.provider_dir(name);
        if !dir.exists() {
            debug!("Cache {} not present", dir.display());
            return Ok(false);
        }

        fs::remove_dir_all(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
        info!("Cleared cache {}", dir.display());
        Ok(true)
    }

    /// Remove every provider directory. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize> {
        let entries = self.list_all()?;
        for entry in &entries {
            fs::remove_dir_all(&entry.path)
                .with_context(|| format!("Failed to remove {}", entry.path.display()))?;
        }
        info!("Cleared {} cache directories under {}", entries.len(), self.root.display());
        Ok(entries.len())
    }
}

/// Load the JSON index at `path` when caching is allowed and the file exists,
/// otherwise run `build` and save its result for the next run.
///
/// An unreadable cache file is rebuilt rather than reported. A failure to
/// write the new cache is logged; the freshly built index is still returned.
pub async fn load_or_build<T, F, Fut>(path: &Path, use_cache: bool, build: F) -> Result<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if use_cache && path.exists() {
        let cached = path.to_path_buf();
        match run_blocking(move || import_json::<T>(&cached)).await {
            Ok(index) => {
                debug!("Loaded cached index {}", path.display());
                return Ok(index);
            },
            Err(e) => warn!("Ignoring unreadable cache {}: {:#}", path.display(), e),
        }
    }

    let index = build().await?;
    let target = path.to_path_buf();
    let (index, saved) = run_blocking(move || {
        let saved = export_json(&target, &index);
        Ok((index, saved))
    })
    .await?;
    match saved {
        Ok(()) => info!("Cached index in {}", path.display()),
        Err(e) => warn!("Failed to cache index in {}: {:#}", path.display(), e),
    }
    Ok(index)
}

/// Number of files and their total size below `dir`
fn dir_usage(dir: &Path) -> Result<(usize, u64)> {
    let mut files = 0;
    let mut size = 0;
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        for item in fs::read_dir(&current)? {
            let item = item?;
            let file_type = item.file_type()?;
            if file_type.is_dir() {
                stack.push(item.path());
            } else if file_type.is_file() {
                files += 1;
                size += item.metadata()?.len();
            }
        }
    }

    Ok((files, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn populated() -> (tempfile::TempDir, CacheDir) {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheDir::new(dir.path());
        let pfam = cache.ensure("pfam").unwrap();
        fs::write(pfam.join("pfam-data.json"), "{}").unwrap();
        let glycan = cache.ensure("glycan").unwrap();
        fs::create_dir_all(glycan.join("mapped_identifiers")).unwrap();
        fs::write(glycan.join("mapped_identifiers/map.json"), "{\"a\":1}").unwrap();
        (dir, cache)
    }

    #[test]
    fn test_list_and_size() {
        let (_dir, cache) = populated();
        let entries = cache.list_all().unwrap();

        assert_eq!(entries.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), vec!["glycan", "pfam"]);
        assert_eq!(entries[0].files, 1);
        assert_eq!(entries[0].size, 7);
        assert_eq!(cache.total_size().unwrap(), 9);
    }

    #[test]
    fn test_remove_and_clear() {
        let (_dir, cache) = populated();

        assert!(cache.remove("pfam").unwrap());
        assert!(!cache.remove("pfam").unwrap());
        assert!(cache.remove("../etc").is_err());

        assert_eq!(cache.clear_all().unwrap(), 1);
        assert!(cache.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_missing_root() {
        let cache = CacheDir::new("/nonexistent/seqmap-cache");
        assert!(cache.list_all().unwrap().is_empty());
        assert_eq!(cache.total_size().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_or_build_reuses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p/index.json");

        let built: Vec<u32> = load_or_build(&path, true, || async { Ok(vec![1, 2]) }).await.unwrap();
        assert_eq!(built, vec![1, 2]);

        // Second call must not run the builder
        let cached: Vec<u32> = load_or_build(&path, true, || async { anyhow::bail!("rebuilt") })
            .await
            .unwrap();
        assert_eq!(cached, vec![1, 2]);

        let rebuilt: Vec<u32> = load_or_build(&path, false, || async { Ok(vec![3]) }).await.unwrap();
        assert_eq!(rebuilt, vec![3]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_load_or_build_off_runtime_thread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/index.json");

        let built: BTreeMap<String, u32> = load_or_build(&path, true, || async {
            Ok(BTreeMap::from([("PF00001".to_string(), 1)]))
        })
        .await
        .unwrap();
        assert!(path.exists());

        let cached: BTreeMap<String, u32> = load_or_build(&path, true, || async { anyhow::bail!("rebuilt") })
            .await
            .unwrap();
        assert_eq!(cached, built);
    }

    #[tokio::test]
    async fn test_load_or_build_recovers_from_corrupt_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        fs::write(&path, "{not json").unwrap();

        let index: Vec<u32> = load_or_build(&path, true, || async { Ok(vec![7]) }).await.unwrap();
        assert_eq!(index, vec![7]);
    }
}
