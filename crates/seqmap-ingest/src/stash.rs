//! Backup and restore of provider caches
//!
//! A stash is a `tar.gz` bundle of selected cache sub directories plus a
//! `.sha256` side file. Bundles are stored into a local (or mounted) stash
//! directory and fetched back from a directory path or an HTTP(S) base URL.
//!
//! Any provider cache can be stashed whole with [`backup_provider`] and
//! [`restore_provider`]; the bundle is named after the provider directory
//! and staged in `<cache>/<provider>/stash/`.

use crate::config::join_url;
use crate::decompression::{create_tar_gz, extract_tar_gz};
use crate::fetch::Fetcher;
use crate::uniprot::id_mapping;
use crate::{glycan, glygen, interpro, pfam, sifts};
use anyhow::{bail, Context, Result};
use seqmap_common::checksum::{
    read_side_file, side_file_path, verify_file_checksum, write_side_file, ChecksumAlgorithm,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const ALGORITHM: ChecksumAlgorithm = ChecksumAlgorithm::Sha256;

/// Provider cache directories that can be stashed whole
pub const PROVIDER_DIRS: [&str; 6] = [
    glycan::CACHE_DIR,
    glygen::CACHE_DIR,
    interpro::CACHE_DIR,
    pfam::CACHE_DIR,
    sifts::CACHE_DIR,
    id_mapping::CACHE_DIR,
];

#[derive(Debug, Clone)]
pub struct Stash {
    /// Local working directory holding the bundle
    stash_dir: PathBuf,
    bundle_name: String,
}

impl Stash {
    pub fn new(stash_dir: impl Into<PathBuf>, bundle_name: impl Into<String>) -> Self {
        Self {
            stash_dir: stash_dir.into(),
            bundle_name: bundle_name.into(),
        }
    }

    /// Stash covering the whole `<cache_root>/<provider>` directory
    pub fn for_provider(cache_root: &Path, provider: &str) -> Result<Self> {
        if !PROVIDER_DIRS.contains(&provider) {
            bail!(
                "Unknown provider '{}', expected one of: {}",
                provider,
                PROVIDER_DIRS.join(", ")
            );
        }
        Ok(Self::new(cache_root.join(provider).join("stash"), provider))
    }

    pub fn bundle_file_name(&self) -> String {
        format!("{}.tar.gz", self.bundle_name)
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.stash_dir.join(self.bundle_file_name())
    }

    /// Pack `sub_dirs` of `base_dir` and write the checksum side file
    pub async fn make_bundle(&self, base_dir: &Path, sub_dirs: &[&str]) -> Result<PathBuf> {
        let bundle_path = self.bundle_path();
        let base_dir = base_dir.to_path_buf();
        let sub_dirs: Vec<String> = sub_dirs.iter().map(|s| s.to_string()).collect();
        let target = bundle_path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let dirs: Vec<&str> = sub_dirs.iter().map(String::as_str).collect();
            create_tar_gz(&base_dir, &dirs, &target)?;
            write_side_file(&target, ALGORITHM)?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("Bundle task panicked: {}", e))??;

        info!("Created stash bundle {}", bundle_path.display());
        Ok(bundle_path)
    }

    /// Copy the bundle and its checksum into `remote_dir[/prefix]`
    pub async fn store_bundle(&self, remote_dir: &Path, prefix: Option<&str>) -> Result<PathBuf> {
        let target_dir = match prefix {
            Some(p) if !p.is_empty() => remote_dir.join(p),
            _ => remote_dir.to_path_buf(),
        };
        tokio::fs::create_dir_all(&target_dir)
            .await
            .with_context(|| format!("Failed to create stash directory {}", target_dir.display()))?;

        let bundle = self.bundle_path();
        let target = target_dir.join(self.bundle_file_name());
        tokio::fs::copy(&bundle, &target)
            .await
            .with_context(|| format!("Failed to store {} in {}", bundle.display(), target_dir.display()))?;

        let side = side_file_path(&bundle, ALGORITHM);
        if tokio::fs::try_exists(&side).await.unwrap_or(false) {
            tokio::fs::copy(&side, side_file_path(&target, ALGORITHM)).await?;
        }

        info!("Stored stash bundle {}", target.display());
        Ok(target)
    }

    /// Fetch `remote[/prefix]/<bundle>.tar.gz`, verify it when a checksum is
    /// published beside it, and unpack it into `base_dir`.
    pub async fn fetch_bundle(
        &self,
        fetcher: &Fetcher,
        base_dir: &Path,
        remote: &str,
        prefix: Option<&str>,
    ) -> Result<usize> {
        let remote_dir = match prefix {
            Some(p) if !p.is_empty() => join_url(remote, p),
            _ => remote.to_string(),
        };
        let remote_bundle = join_url(&remote_dir, &self.bundle_file_name());
        let local_bundle = self.bundle_path();

        fetcher
            .get(&remote_bundle, &local_bundle)
            .await
            .with_context(|| format!("Failed to fetch stash bundle {}", remote_bundle))?;

        let remote_side = format!("{}.{}", remote_bundle, ALGORITHM.extension());
        let local_side = side_file_path(&local_bundle, ALGORITHM);
        match fetcher.try_get(&remote_side, &local_side).await {
            Ok(_) => {
                let expected = read_side_file(&local_side)?;
                verify_file_checksum(&local_bundle, &expected, ALGORITHM)
                    .with_context(|| format!("Stash bundle {} failed verification", remote_bundle))?;
            },
            Err(e) => warn!("No checksum for {}, skipping verification: {:#}", remote_bundle, e),
        }

        let base_dir = base_dir.to_path_buf();
        let count = tokio::task::spawn_blocking(move || extract_tar_gz(&local_bundle, &base_dir))
            .await
            .map_err(|e| anyhow::anyhow!("Unpack task panicked: {}", e))??;

        info!("Restored {} entries from {}", count, remote_bundle);
        Ok(count)
    }
}

/// Bundle `<cache_root>/<provider>` and store it under `remote_dir[/prefix]`
pub async fn backup_provider(
    cache_root: &Path,
    provider: &str,
    remote_dir: &Path,
    prefix: Option<&str>,
) -> Result<PathBuf> {
    let stash = Stash::for_provider(cache_root, provider)?;
    let source = cache_root.join(provider);
    if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
        bail!("No {} cache to stash under {}", provider, cache_root.display());
    }
    stash.make_bundle(cache_root, &[provider]).await?;
    stash.store_bundle(remote_dir, prefix).await
}

/// Fetch the `<provider>.tar.gz` bundle from `remote[/prefix]` and unpack it
/// over `<cache_root>/<provider>`
pub async fn restore_provider(
    fetcher: &Fetcher,
    cache_root: &Path,
    provider: &str,
    remote: &str,
    prefix: Option<&str>,
) -> Result<usize> {
    let stash = Stash::for_provider(cache_root, provider)?;
    stash.fetch_bundle(fetcher, cache_root, remote, prefix).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;

    fn seed(base: &Path) {
        let dir = base.join("mapped_identifiers");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("map.json"), r#"{"identifiers":{}}"#).unwrap();
    }

    #[tokio::test]
    async fn test_backup_and_restore_local() {
        let base = tempfile::tempdir().unwrap();
        seed(base.path());
        let remote = tempfile::tempdir().unwrap();

        let stash = Stash::new(base.path().join("stash"), "test_bundle");
        stash.make_bundle(base.path(), &["mapped_identifiers"]).await.unwrap();
        let stored = stash.store_bundle(remote.path(), Some("A")).await.unwrap();
        assert_eq!(stored, remote.path().join("A/test_bundle.tar.gz"));
        assert!(remote.path().join("A/test_bundle.tar.gz.sha256").exists());

        std::fs::remove_dir_all(base.path().join("mapped_identifiers")).unwrap();

        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        let count = stash
            .fetch_bundle(&fetcher, base.path(), remote.path().to_str().unwrap(), Some("A"))
            .await
            .unwrap();
        assert!(count >= 1);
        assert!(base.path().join("mapped_identifiers/map.json").exists());
    }

    #[tokio::test]
    async fn test_provider_roundtrip_pfam() {
        let cache = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let pfam_dir = cache.path().join("pfam");
        std::fs::create_dir_all(&pfam_dir).unwrap();
        std::fs::write(pfam_dir.join("pfam-data.json"), r#"{"PF00001":"GPCR (7tm_1)"}"#).unwrap();

        let stored = backup_provider(cache.path(), "pfam", remote.path(), Some("v34")).await.unwrap();
        assert_eq!(stored, remote.path().join("v34/pfam.tar.gz"));
        assert!(remote.path().join("v34/pfam.tar.gz.sha256").exists());

        std::fs::remove_dir_all(&pfam_dir).unwrap();
        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        restore_provider(&fetcher, cache.path(), "pfam", remote.path().to_str().unwrap(), Some("v34"))
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(pfam_dir.join("pfam-data.json")).unwrap(),
            r#"{"PF00001":"GPCR (7tm_1)"}"#
        );
    }

    #[tokio::test]
    async fn test_provider_stash_rejects_unknown_or_missing() {
        let cache = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();

        assert!(Stash::for_provider(cache.path(), "../pfam").is_err());
        assert!(backup_provider(cache.path(), "nope", remote.path(), None).await.is_err());
        // Known provider without a cache directory
        assert!(backup_provider(cache.path(), "interPro", remote.path(), None).await.is_err());
        assert_eq!(Stash::for_provider(cache.path(), "sifts").unwrap().bundle_file_name(), "sifts.tar.gz");
    }

    #[tokio::test]
    async fn test_restore_rejects_corrupt_bundle() {
        let base = tempfile::tempdir().unwrap();
        seed(base.path());
        let remote = tempfile::tempdir().unwrap();

        let stash = Stash::new(base.path().join("stash"), "test_bundle");
        stash.make_bundle(base.path(), &["mapped_identifiers"]).await.unwrap();
        stash.store_bundle(remote.path(), None).await.unwrap();
        std::fs::write(remote.path().join("test_bundle.tar.gz.sha256"), "00ff\n").unwrap();

        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        let result = stash
            .fetch_bundle(&fetcher, base.path(), remote.path().to_str().unwrap(), None)
            .await;
        assert!(result.is_err());
    }
}
