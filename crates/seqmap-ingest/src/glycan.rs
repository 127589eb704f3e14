//! Glycan identifiers mapped onto branched entities
//!
//! The index is produced elsewhere and distributed through stash bundles:
//!
//! ```text
//! <cache>/glycan/
//!     mapped_identifiers/branched_entity_glycan_identifier_map.json
//!     stash/entity_glycan_mapped_identifiers.tar.gz
//! ```

use crate::config::ProviderOptions;
use crate::fetch::Fetcher;
use crate::marshal::{export_json, import_json};
use crate::stash::Stash;
use anyhow::Result;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const CACHE_DIR: &str = "glycan";
pub const STASH_SUB_DIR: &str = "mapped_identifiers";
pub const BUNDLE_NAME: &str = "entity_glycan_mapped_identifiers";
const MAPPING_FILE: &str = "branched_entity_glycan_identifier_map.json";
const INDEX_VERSION: &str = "0.50";

/// `{entity_id: {id_type: ids}}` with provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlycanIndex {
    pub version: String,
    pub created: String,
    #[serde(default)]
    pub identifiers: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

impl GlycanIndex {
    pub fn empty() -> Self {
        Self {
            version: INDEX_VERSION.to_string(),
            created: Local::now().format("%Y %m %d %H:%M:%S").to_string(),
            identifiers: BTreeMap::new(),
        }
    }
}

pub struct GlycanProvider {
    dir: PathBuf,
    index: GlycanIndex,
}

impl GlycanProvider {
    /// Read the cached index. Without a cache (or with `use_cache` off) the
    /// provider starts empty until a stash is restored.
    pub fn new(options: &ProviderOptions) -> Self {
        let dir = options.provider_dir(CACHE_DIR);
        let (index, _) = read_index(&mapping_path(&dir), options.use_cache);
        Self { dir, index }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    pub fn mapping_path(&self) -> PathBuf {
        mapping_path(&self.dir)
    }

    pub fn identifiers(&self) -> &BTreeMap<String, BTreeMap<String, serde_json::Value>> {
        &self.index.identifiers
    }

    pub fn index(&self) -> &GlycanIndex {
        &self.index
    }

    /// Re-read the index from the cache file. Returns false when no
    /// readable cache file exists (the index is then empty).
    pub fn reload(&mut self) -> bool {
        let (index, loaded) = read_index(&self.mapping_path(), true);
        self.index = index;
        loaded
    }

    /// `min_count == 0` accepts an empty index
    pub fn test_cache(&self, min_count: usize) -> bool {
        if min_count == 0 {
            return true;
        }
        self.index.identifiers.len() >= min_count
    }

    /// Replace the index and write it to the cache
    pub fn save(&mut self, index: GlycanIndex) -> Result<()> {
        export_json(&self.mapping_path(), &index)?;
        self.index = index;
        Ok(())
    }

    fn stash(&self) -> Stash {
        Stash::new(self.dir.join("stash"), BUNDLE_NAME)
    }

    /// Bundle the mapped identifiers and store them under `remote_dir[/prefix]`
    pub async fn to_stash(&self, remote_dir: &Path, prefix: Option<&str>) -> bool {
        let stash = self.stash();
        let result = async {
            stash.make_bundle(&self.dir, &[STASH_SUB_DIR]).await?;
            stash.store_bundle(remote_dir, prefix).await
        }
        .await;

        match result {
            Ok(path) => {
                info!("Glycan identifiers stashed to {}", path.display());
                true
            },
            Err(e) => {
                error!("Failing with stash dir {}: {:#}", remote_dir.display(), e);
                false
            },
        }
    }

    /// Restore the mapped identifiers from `remote[/prefix]` (a directory or
    /// HTTP base URL). Call [`reload`](Self::reload) afterwards.
    pub async fn from_stash(&self, fetcher: &Fetcher, remote: &str, prefix: Option<&str>) -> bool {
        match self.stash().fetch_bundle(fetcher, &self.dir, remote, prefix).await {
            Ok(_) => true,
            Err(e) => {
                error!("Failing with stash location {}: {:#}", remote, e);
                false
            },
        }
    }
}

fn mapping_path(dir: &Path) -> PathBuf {
    dir.join(STASH_SUB_DIR).join(MAPPING_FILE)
}

fn read_index(path: &Path, use_cache: bool) -> (GlycanIndex, bool) {
    if use_cache && path.exists() {
        info!("Reading cached path {}", path.display());
        match import_json(path) {
            Ok(index) => return (index, true),
            Err(e) => error!("Failed to read {}: {:#}", path.display(), e),
        }
    }
    (GlycanIndex::empty(), false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;
    use serde_json::json;

    fn sample_index() -> GlycanIndex {
        let mut index = GlycanIndex::empty();
        for n in 1..=3 {
            let mut ids = BTreeMap::new();
            ids.insert("glytoucan".to_string(), json!(format!("G0000{}AA", n)));
            ids.insert("wurcs".to_string(), json!(["WURCS=2.0/1,1,0"]));
            index.identifiers.insert(format!("1ABC_{}", n), ids);
        }
        index
    }

    #[test]
    fn test_new_without_cache_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let provider = GlycanProvider::new(&ProviderOptions::new(dir.path(), false));
        assert!(provider.test_cache(0));
        assert!(!provider.test_cache(1));
        assert!(provider.identifiers().is_empty());
        assert_eq!(provider.index().version, "0.50");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let options = ProviderOptions::new(dir.path(), true);
        let mut provider = GlycanProvider::new(&options);
        provider.save(sample_index()).unwrap();

        let mut other = GlycanProvider::new(&options);
        assert!(other.reload());
        assert!(other.test_cache(3));
    }

    #[tokio::test]
    async fn test_stash_roundtrip() {
        let cache = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let options = ProviderOptions::new(cache.path(), true);

        let mut provider = GlycanProvider::new(&options);
        provider.save(sample_index()).unwrap();
        assert!(provider.to_stash(remote.path(), Some("stash-A")).await);

        std::fs::remove_dir_all(cache.path().join(CACHE_DIR).join(STASH_SUB_DIR)).unwrap();
        let mut restored = GlycanProvider::new(&options);
        assert!(!restored.test_cache(1));

        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        assert!(restored.from_stash(&fetcher, remote.path().to_str().unwrap(), Some("stash-A")).await);
        assert!(restored.reload());
        assert!(restored.test_cache(3));
    }

    #[tokio::test]
    async fn test_from_stash_missing_bundle() {
        let cache = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let provider = GlycanProvider::new(&ProviderOptions::new(cache.path(), true));
        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        assert!(!provider.from_stash(&fetcher, remote.path().to_str().unwrap(), None).await);
    }
}
