// Provider configuration
//
// Environment-based source endpoints and cache options shared by every provider.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Read a string variable, falling back to `default`
pub(crate) fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read and parse a variable, falling back to `default` when unset or malformed
pub(crate) fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Where a provider keeps its cache and whether it may reuse it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderOptions {
    /// Root directory shared by all provider caches
    pub cache_path: PathBuf,

    /// Load a cached index when one exists instead of rebuilding from source
    pub use_cache: bool,
}

impl ProviderOptions {
    pub fn new(cache_path: impl Into<PathBuf>, use_cache: bool) -> Self {
        Self {
            cache_path: cache_path.into(),
            use_cache,
        }
    }

    /// Directory owned by one provider, e.g. `<cache>/pfam`
    pub fn provider_dir(&self, name: &str) -> PathBuf {
        self.cache_path.join(name)
    }

    /// `SEQMAP_CACHE_PATH` (default `./CACHE`) with caching enabled
    pub fn from_env() -> Self {
        Self::new(env_string("SEQMAP_CACHE_PATH", "./CACHE"), true)
    }
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self::new("./CACHE", true)
    }
}

/// A remote file with an optional mirror used when the primary fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub primary: String,
    pub fallback: Option<String>,
}

impl Endpoint {
    pub fn new(primary: impl Into<String>, fallback: Option<&str>) -> Self {
        Self {
            primary: primary.into(),
            fallback: fallback.map(str::to_string),
        }
    }

    /// Primary only, no mirror
    pub fn single(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallback: None,
        }
    }

    /// Resolve `file_name` against both primary and fallback base URLs
    pub fn join(&self, file_name: &str) -> Endpoint {
        Endpoint {
            primary: join_url(&self.primary, file_name),
            fallback: self.fallback.as_deref().map(|f| join_url(f, file_name)),
        }
    }
}

/// Append a file name to a base URL or directory, tolerating a trailing slash
pub fn join_url(base: &str, file_name: &str) -> String {
    if base.ends_with('/') {
        format!("{}{}", base, file_name)
    } else {
        format!("{}/{}", base, file_name)
    }
}

const ASSET_FALLBACK: &str =
    "https://github.com/rcsb/py-rcsb_exdb_assets/raw/master/fall_back";

/// Remote locations of every reference dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub pfam_clans: Endpoint,
    pub pfam_mapping: Endpoint,
    pub interpro_entries: Endpoint,
    pub interpro_tree: Endpoint,

    /// Base URLs; individual masterlist file names are appended
    pub glygen: Endpoint,

    pub id_mapping: Endpoint,
    pub id_mapping_legacy: Endpoint,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            pfam_clans: Endpoint::new(
                "https://ftp.ebi.ac.uk/pub/databases/Pfam/current_release/Pfam-A.clans.tsv.gz",
                Some(&format!("{}/Pfam/Pfam-A.clans.tsv.gz", ASSET_FALLBACK)),
            ),
            pfam_mapping: Endpoint::new(
                "https://ftp.ebi.ac.uk/pub/databases/msd/sifts/flatfiles/tsv/pdb_pfam_mapping.tsv.gz",
                Some(&format!("{}/Pfam/pdb_pfam_mapping.tsv.gz", ASSET_FALLBACK)),
            ),
            interpro_entries: Endpoint::new(
                "ftp://ftp.ebi.ac.uk/pub/databases/interpro/current/entry.list",
                Some(&format!("{}/InterPro/entry.list", ASSET_FALLBACK)),
            ),
            interpro_tree: Endpoint::new(
                "ftp://ftp.ebi.ac.uk/pub/databases/interpro/current/ParentChildTreeFile.txt",
                Some(&format!("{}/InterPro/ParentChildTreeFile.txt", ASSET_FALLBACK)),
            ),
            glygen: Endpoint::new(
                "https://data.glygen.org/ln2releases/v-1.8.25/reviewed/",
                Some("https://raw.githubusercontent.com/rcsb/py-rcsb_exdb_assets/master/fall_back/glygen/"),
            ),
            id_mapping: Endpoint::single(
                "ftp://ftp.uniprot.org/pub/databases/uniprot/current_release/knowledgebase/idmapping/idmapping_selected.tab.gz",
            ),
            id_mapping_legacy: Endpoint::single(
                "ftp://ftp.uniprot.org/pub/databases/uniprot/current_release/knowledgebase/idmapping/idmapping_selected.tab.2015_03.gz",
            ),
        }
    }
}

impl SourceConfig {
    /// Load endpoints from environment variables
    ///
    /// Environment variables (primary URL only, mirrors keep their defaults):
    /// - SEQMAP_PFAM_URL
    /// - SEQMAP_PFAM_MAPPING_URL
    /// - SEQMAP_INTERPRO_ENTRY_URL
    /// - SEQMAP_INTERPRO_TREE_URL
    /// - SEQMAP_GLYGEN_BASE_URL
    /// - SEQMAP_GLYGEN_FALLBACK_URL
    /// - SEQMAP_ID_MAPPING_URL
    pub fn from_env() -> Self {
        let mut config = Self::default();

        override_primary(&mut config.pfam_clans, "SEQMAP_PFAM_URL");
        override_primary(&mut config.pfam_mapping, "SEQMAP_PFAM_MAPPING_URL");
        override_primary(&mut config.interpro_entries, "SEQMAP_INTERPRO_ENTRY_URL");
        override_primary(&mut config.interpro_tree, "SEQMAP_INTERPRO_TREE_URL");
        override_primary(&mut config.glygen, "SEQMAP_GLYGEN_BASE_URL");
        override_primary(&mut config.id_mapping, "SEQMAP_ID_MAPPING_URL");

        if let Ok(fallback) = env::var("SEQMAP_GLYGEN_FALLBACK_URL") {
            config.glygen.fallback = Some(fallback);
        }

        config
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        let endpoints = [
            ("pfam_clans", &self.pfam_clans),
            ("pfam_mapping", &self.pfam_mapping),
            ("interpro_entries", &self.interpro_entries),
            ("interpro_tree", &self.interpro_tree),
            ("glygen", &self.glygen),
            ("id_mapping", &self.id_mapping),
            ("id_mapping_legacy", &self.id_mapping_legacy),
        ];

        for (name, endpoint) in endpoints {
            if endpoint.primary.trim().is_empty() {
                return Err(format!("{} URL cannot be empty", name));
            }
            if endpoint.fallback.as_deref().is_some_and(|f| f.trim().is_empty()) {
                return Err(format!("{} fallback URL cannot be empty when set", name));
            }
        }

        Ok(())
    }
}

fn override_primary(endpoint: &mut Endpoint, key: &str) {
    if let Ok(url) = env::var(key) {
        endpoint.primary = url;
    }
}

/// File name component of a URL or path, without query string
pub fn file_name(location: &str) -> String {
    let trimmed = location.split(['?', '#']).next().unwrap_or(location);
    trimmed
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// `dir/<file name of location>`
pub fn local_path_for(dir: &Path, location: &str) -> PathBuf {
    dir.join(file_name(location))
}
