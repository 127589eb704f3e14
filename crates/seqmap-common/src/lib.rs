//! Seqmap Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, logging setup and checksum helpers for the
//! seqmap workspace.
//!
//! # Example
//!
//! ```no_run
//! use seqmap_common::checksum::{compute_file_checksum, ChecksumAlgorithm};
//! use seqmap_common::Result;
//!
//! fn digest(path: &str) -> Result<String> {
//!     compute_file_checksum(path, ChecksumAlgorithm::Sha256)
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;

pub use error::{Result, SeqmapError};
