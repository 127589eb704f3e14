//! Checksums for stash bundles and downloaded reference files

use crate::error::{Result, SeqmapError};
use sha2::{Digest, Sha256, Sha512};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Digest used for a checksum side file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl ChecksumAlgorithm {
    /// Extension of the side file written next to a checksummed file
    pub fn extension(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Compute checksum for a file
pub fn compute_file_checksum(
    path: impl AsRef<Path>,
    algorithm: ChecksumAlgorithm,
) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    compute_checksum(&mut file, algorithm)
}

/// Compute checksum for any readable source
pub fn compute_checksum<R: Read>(reader: &mut R, algorithm: ChecksumAlgorithm) -> Result<String> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => digest_reader::<Sha256, _>(reader),
        ChecksumAlgorithm::Sha512 => digest_reader::<Sha512, _>(reader),
    }
}

fn digest_reader<D: Digest, R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = D::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify checksum for a file
pub fn verify_file_checksum(
    path: impl AsRef<Path>,
    expected: &str,
    algorithm: ChecksumAlgorithm,
) -> Result<()> {
    let actual = compute_file_checksum(path, algorithm)?;
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(SeqmapError::ChecksumMismatch {
            expected: expected.trim().to_string(),
            actual,
        })
    }
}

/// Path of the side file holding the digest of `path`
/// (`bundle.tar.gz` -> `bundle.tar.gz.sha256`).
pub fn side_file_path(path: &Path, algorithm: ChecksumAlgorithm) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(algorithm.extension());
    PathBuf::from(name)
}

/// Compute the digest of `path` and store it in its side file.
/// Returns the digest.
pub fn write_side_file(path: &Path, algorithm: ChecksumAlgorithm) -> Result<String> {
    let digest = compute_file_checksum(path, algorithm)?;
    std::fs::write(side_file_path(path, algorithm), format!("{}\n", digest))?;
    Ok(digest)
}

/// Read the digest stored in a side file. The file may follow the
/// `sha256sum` layout (`<digest>  <name>`).
pub fn read_side_file(side_path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(side_path)?;
    content
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| SeqmapError::parse(format!("empty checksum file {}", side_path.display())))
}
