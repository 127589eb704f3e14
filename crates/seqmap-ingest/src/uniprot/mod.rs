//! UniProt data access
//!
//! - [`client`]: chunked entry and sequence requests with service failover
//! - [`reader`]: UniProt XML to [`UniProtRecord`]
//! - [`reformat`]: records to exchange documents
//! - [`id_mapping`]: cross references from `idmapping_selected.tab`

pub mod client;
pub mod config;
pub mod fasta;
pub mod id_mapping;
pub mod reader;
pub mod reformat;

pub use client::{MatchKind, MatchResult, UniProtClient};
pub use config::UniProtConfig;
pub use id_mapping::{IdMapName, IdMappingOptions, IdMappingProvider};
pub use reader::{UniProtReader, UniProtRecord};
pub use reformat::{reformat, ExchangeFormat, ExchangeRecord};
