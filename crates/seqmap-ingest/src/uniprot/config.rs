// UniProt Configuration
//
// Environment-based configuration for UniProt web service requests

use crate::config::{env_parse, env_string};
use serde::{Deserialize, Serialize};

/// Web service endpoints and batching for UniProt entry requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniProtConfig {
    /// Primary REST service (default: https://rest.uniprot.org)
    pub primary_url: String,

    /// Secondary Proteins API host (default: https://www.ebi.ac.uk)
    pub secondary_url: String,

    /// Accessions per request
    pub max_chunk_size: usize,

    /// Keep the raw XML of every response for `write_xml`
    pub save_text: bool,
}

impl Default for UniProtConfig {
    fn default() -> Self {
        Self {
            primary_url: "https://rest.uniprot.org".to_string(),
            secondary_url: "https://www.ebi.ac.uk".to_string(),
            max_chunk_size: 100,
            save_text: false,
        }
    }
}

impl UniProtConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SEQMAP_UNIPROT_PRIMARY_URL
    /// - SEQMAP_UNIPROT_SECONDARY_URL
    /// - SEQMAP_UNIPROT_CHUNK_SIZE
    /// - SEQMAP_UNIPROT_SAVE_TEXT
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            primary_url: env_string("SEQMAP_UNIPROT_PRIMARY_URL", &defaults.primary_url),
            secondary_url: env_string("SEQMAP_UNIPROT_SECONDARY_URL", &defaults.secondary_url),
            max_chunk_size: env_parse("SEQMAP_UNIPROT_CHUNK_SIZE", defaults.max_chunk_size),
            save_text: env_parse("SEQMAP_UNIPROT_SAVE_TEXT", defaults.save_text),
        }
    }

    pub fn with_urls(mut self, primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        self.primary_url = primary.into();
        self.secondary_url = secondary.into();
        self
    }

    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    pub fn with_save_text(mut self, save_text: bool) -> Self {
        self.save_text = save_text;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.primary_url.is_empty() {
            return Err("UniProt primary URL cannot be empty".to_string());
        }

        if self.secondary_url.is_empty() {
            return Err("UniProt secondary URL cannot be empty".to_string());
        }

        if self.max_chunk_size == 0 {
            return Err("Chunk size must be greater than 0".to_string());
        }

        if self.max_chunk_size > 500 {
            return Err("Chunk size too large (max 500)".to_string());
        }

        Ok(())
    }
}
