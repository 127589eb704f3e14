//! GlyGen glycan and glycoprotein master lists
//!
//! Glycans are keyed by GlyTouCan accession (e.g. `G28882EF`), glycoproteins
//! by UniProt accession (e.g. `Q658T7`). Each species has its own protein
//! master list; a species file missing on both endpoints is skipped.

use crate::cache::load_or_build;
use crate::config::{ProviderOptions, SourceConfig};
use crate::fetch::Fetcher;
use crate::marshal::{read_rows, Delimited};
use crate::run_blocking;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub const CACHE_DIR: &str = "glygen";
const GLYCAN_FILE: &str = "glygen-glycan-list.json";
const GLYCOPROTEIN_FILE: &str = "glygen-glycoprotein-list.json";
const GLYCAN_MASTERLIST: &str = "glycan_masterlist.csv";

pub const PROTEIN_MASTERLISTS: [&str; 7] = [
    "sarscov1_protein_masterlist.csv",
    "sarscov2_protein_masterlist.csv",
    "hcv1b_protein_masterlist.csv",
    "hcv1a_protein_masterlist.csv",
    "human_protein_masterlist.csv",
    "mouse_protein_masterlist.csv",
    "rat_protein_masterlist.csv",
];

pub struct GlyGenProvider {
    glycans: BTreeMap<String, String>,
    glycoproteins: BTreeMap<String, String>,
}

impl GlyGenProvider {
    pub async fn load(fetcher: &Fetcher, sources: &SourceConfig, options: &ProviderOptions) -> Result<Self> {
        let dir = options.provider_dir(CACHE_DIR);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let glycans = load_or_build(&dir.join(GLYCAN_FILE), options.use_cache, || async {
            let endpoint = sources.glygen.join(GLYCAN_MASTERLIST);
            info!("Fetching GlyGen glycan data from {}", endpoint.primary);
            let path = fetcher.get_with_fallback(&endpoint, &dir).await?;
            run_blocking(move || parse_glycans(&path)).await
        })
        .await?;

        let glycoproteins = load_or_build(&dir.join(GLYCOPROTEIN_FILE), options.use_cache, || async {
            let mut merged = BTreeMap::new();
            for file_name in PROTEIN_MASTERLISTS {
                let endpoint = sources.glygen.join(file_name);
                let path = match fetcher.get_with_fallback(&endpoint, &dir).await {
                    Ok(path) => path,
                    Err(e) => {
                        warn!("Skipping GlyGen list {}: {:#}", file_name, e);
                        continue;
                    },
                };
                match run_blocking(move || parse_glycoproteins(&path)).await {
                    Ok(parsed) => merged.extend(parsed),
                    Err(e) => warn!("Failed to parse GlyGen list {}: {:#}", file_name, e),
                }
            }
            Ok(merged)
        })
        .await?;

        info!(
            "GlyGen glycan list ({}) glycoprotein list ({})",
            glycans.len(),
            glycoproteins.len()
        );
        Ok(Self {
            glycans,
            glycoproteins,
        })
    }

    pub fn has_glycan(&self, glytoucan_id: &str) -> bool {
        self.glycans.contains_key(glytoucan_id)
    }

    pub fn has_glycoprotein(&self, uniprot_id: &str) -> bool {
        self.glycoproteins.contains_key(uniprot_id)
    }

    /// GlyTouCan accession -> value of the second master list column
    pub fn glycans(&self) -> &BTreeMap<String, String> {
        &self.glycans
    }

    /// UniProt accession -> isoform suffix
    pub fn glycoproteins(&self) -> &BTreeMap<String, String> {
        &self.glycoproteins
    }

    /// Production data has more than 20000 glycans and 64000 glycoproteins
    pub fn test_cache(&self, min_glycans: usize, min_glycoproteins: usize) -> bool {
        !self.glycans.is_empty()
            && !self.glycoproteins.is_empty()
            && self.glycans.len() >= min_glycans
            && self.glycoproteins.len() >= min_glycoproteins
    }
}

pub fn parse_glycans(path: &Path) -> Result<BTreeMap<String, String>> {
    let rows = read_rows(path, Delimited::CSV)?;
    Ok(rows
        .into_iter()
        .skip(1)
        .filter(|row| row.len() >= 2)
        .map(|row| (row[0].trim().to_string(), row[1].trim().to_string()))
        .collect())
}

/// First column is `<accession>-<isoform>`, e.g. `P14210-1`
pub fn parse_glycoproteins(path: &Path) -> Result<BTreeMap<String, String>> {
    let rows = read_rows(path, Delimited::CSV)?;
    Ok(rows
        .into_iter()
        .skip(1)
        .filter_map(|row| row.into_iter().next())
        .filter(|first| !first.trim().is_empty())
        .map(|first| match first.trim().split_once('-') {
            Some((acc, isoform)) => (acc.to_string(), isoform.to_string()),
            None => (first.trim().to_string(), String::new()),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_glycans() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GLYCAN_MASTERLIST);
        std::fs::write(&path, "glytoucan_ac,glytoucan_type\nG28882EF,Saccharide\nG00012MO,Composition\n").unwrap();

        let g = parse_glycans(&path).unwrap();
        assert_eq!(g.len(), 2);
        assert_eq!(g["G28882EF"], "Saccharide");
    }

    #[test]
    fn test_parse_glycoproteins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("human_protein_masterlist.csv");
        std::fs::write(&path, "uniprotkb_canonical_ac,status\nQ658T7-1,reviewed\nP14210-2,reviewed\nA0A000,reviewed\n").unwrap();

        let g = parse_glycoproteins(&path).unwrap();
        assert_eq!(g["Q658T7"], "1");
        assert_eq!(g["P14210"], "2");
        assert_eq!(g["A0A000"], "");
    }
}
