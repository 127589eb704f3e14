//! Seqmap Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Fetches, caches and reformats reference sequence and annotation data
//! for structure annotation pipelines.
//!
//! # Supported Data Sources
//!
//! - **SIFTS**: PDB chain to UniProt, Pfam, InterPro, GO, taxonomy, CATH,
//!   SCOP and EC mappings
//! - **UniProt**: entry XML, FASTA sequences and the id mapping table
//! - **Pfam**: family descriptions and PDB residue mappings
//! - **InterPro**: entry descriptions and the parent/child tree
//! - **GlyGen**: glycan and glycoprotein masterlists
//!
//! # Example
//!
//! ```no_run
//! use seqmap_ingest::config::{ProviderOptions, SourceConfig};
//! use seqmap_ingest::fetch::{FetchConfig, Fetcher};
//! use seqmap_ingest::pfam::PfamProvider;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let fetcher = Fetcher::new(FetchConfig::from_env())?;
//!     let options = ProviderOptions::new("./CACHE", true);
//!     let pfam = PfamProvider::load(&fetcher, &SourceConfig::default(), &options).await?;
//!     println!("{:?}", pfam.description("PF00041"));
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod decompression;
pub mod fetch;
pub mod glycan;
pub mod glygen;
pub mod interpro;
pub mod marshal;
pub mod pfam;
pub mod seq_align;
pub mod sifts;
pub mod stash;
pub mod uniprot;

use anyhow::{Context, Result};

/// Run file parsing or other blocking work off the async runtime
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("Blocking task panicked")?
}
