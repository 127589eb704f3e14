//! Compression helpers for reference files and stash bundles
//!
//! - **Gzip**: reference files are often served as `.gz`; [`open_text`]
//!   detects the gzip magic bytes so callers read plain and compressed files
//!   the same way.
//! - **Tar.gz**: cache directories are packed into and unpacked from
//!   `tar.gz` bundles for backup and restore.

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path};
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// True when the file starts with the gzip magic bytes
pub fn is_gzip(path: &Path) -> Result<bool> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    Ok(read == 2 && magic == GZIP_MAGIC)
}

/// Open a text file for buffered reading, decompressing gzip transparently
pub fn open_text(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if read == 2 && magic == GZIP_MAGIC {
        debug!("Reading gzip stream {}", path.display());
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Pack `sub_dirs` of `base_dir` into a gzip-compressed tar at `bundle_path`.
/// Entries are stored relative to `base_dir`. The directory the bundle is
/// written into is left out when it sits directly inside a packed sub dir.
pub fn create_tar_gz(base_dir: &Path, sub_dirs: &[&str], bundle_path: &Path) -> Result<u64> {
    let bundle_dir = bundle_path.parent();
    if let Some(parent) = bundle_dir {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(bundle_path)
        .with_context(|| format!("Failed to create bundle {}", bundle_path.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for sub_dir in sub_dirs {
        let source = base_dir.join(sub_dir);
        if !source.is_dir() {
            bail!("Bundle source {} is not a directory", source.display());
        }
        builder
            .append_dir(sub_dir, &source)
            .with_context(|| format!("Failed to add {} to bundle", source.display()))?;

        let mut children = std::fs::read_dir(&source)?.collect::<std::io::Result<Vec<_>>>()?;
        children.sort_by_key(|c| c.file_name());
        for child in children {
            let path = child.path();
            if Some(path.as_path()) == bundle_dir {
                continue;
            }
            let name = Path::new(sub_dir).join(child.file_name());
            let added = if child.file_type()?.is_dir() {
                builder.append_dir_all(&name, &path)
            } else {
                builder.append_path_with_name(&path, &name)
            };
            added.with_context(|| format!("Failed to add {} to bundle", path.display()))?;
        }
    }

    builder.into_inner()?.finish()?;
    let size = std::fs::metadata(bundle_path)?.len();
    debug!("Wrote bundle {} ({} bytes)", bundle_path.display(), size);
    Ok(size)
}

/// Unpack a tar.gz bundle into `dest_dir`. Entries that would escape
/// `dest_dir` (absolute paths or `..`) are rejected.
pub fn extract_tar_gz(bundle_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file = File::open(bundle_path)
        .with_context(|| format!("Failed to open bundle {}", bundle_path.display()))?;
    let mut archive = tar::Archive::new(MultiGzDecoder::new(file));
    std::fs::create_dir_all(dest_dir)?;

    let mut count = 0;
    for entry_result in archive.entries().context("Failed to read tar entries")? {
        let mut entry = entry_result.context("Failed to read tar entry")?;
        let entry_path = entry.path().context("Failed to get entry path")?.into_owned();

        if entry_path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            bail!("Refusing to unpack entry outside destination: {}", entry_path.display());
        }

        entry
            .unpack_in(dest_dir)
            .with_context(|| format!("Failed to unpack {}", entry_path.display()))?;
        count += 1;
    }

    debug!("Unpacked {} entries into {}", count, dest_dir.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use std::io::Write;

    #[test]
    fn test_open_text_plain_and_gzip() {
        let dir = tempfile::tempdir().unwrap();

        let plain = dir.path().join("plain.txt");
        std::fs::write(&plain, "line one\nline two\n").unwrap();

        let gz = dir.path().join("packed.bin");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(b"line one\nline two\n").unwrap();
        encoder.finish().unwrap();

        assert!(!is_gzip(&plain).unwrap());
        assert!(is_gzip(&gz).unwrap());

        for path in [&plain, &gz] {
            let lines: Vec<String> = open_text(path).unwrap().lines().map(|l| l.unwrap()).collect();
            assert_eq!(lines, vec!["line one", "line two"]);
        }
    }

    #[test]
    fn test_bundle_and_extract() {
        let src = tempfile::tempdir().unwrap();
        let nested = src.path().join("glycan/mapped_identifiers");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("map.json"), "{}").unwrap();

        let out = tempfile::tempdir().unwrap();
        let bundle = out.path().join("stash/bundle.tar.gz");
        assert!(create_tar_gz(src.path(), &["glycan"], &bundle).unwrap() > 0);

        let dest = tempfile::tempdir().unwrap();
        assert!(extract_tar_gz(&bundle, dest.path()).unwrap() >= 1);
        assert_eq!(
            std::fs::read_to_string(dest.path().join("glycan/mapped_identifiers/map.json")).unwrap(),
            "{}"
        );
    }

    #[test]
    fn test_bundle_skips_its_own_directory() {
        let cache = tempfile::tempdir().unwrap();
        let pfam = cache.path().join("pfam");
        std::fs::create_dir_all(pfam.join("stash")).unwrap();
        std::fs::write(pfam.join("pfam-data.json"), "{}").unwrap();
        std::fs::write(pfam.join("stash/old.tar.gz"), "stale").unwrap();

        let bundle = pfam.join("stash/pfam.tar.gz");
        create_tar_gz(cache.path(), &["pfam"], &bundle).unwrap();

        let dest = tempfile::tempdir().unwrap();
        extract_tar_gz(&bundle, dest.path()).unwrap();
        assert!(dest.path().join("pfam/pfam-data.json").exists());
        assert!(!dest.path().join("pfam/stash").exists());
    }

    #[test]
    fn test_bundle_missing_source_dir() {
        let src = tempfile::tempdir().unwrap();
        let bundle = src.path().join("b.tar.gz");
        assert!(create_tar_gz(src.path(), &["absent"], &bundle).is_err());
    }
}
