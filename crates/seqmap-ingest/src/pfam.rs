//! Pfam domain descriptions and PDB residue mappings
//!
//! Two sources feed this provider:
//!
//! - `Pfam-A.clans.tsv.gz`: `PFAM_ACC CLAN_ACC CLAN_ID PFAM_ID DESCRIPTION`
//! - `pdb_pfam_mapping.tsv.gz` (SIFTS): one row per Pfam domain on a PDB chain,
//!   keyed by header (`PDB`, `CHAIN`, `PFAM_ACCESSION`, `AUTH_PDBRES_START`, ...)

use crate::cache::load_or_build;
use crate::config::{ProviderOptions, SourceConfig};
use crate::fetch::Fetcher;
use crate::marshal::{read_records, read_rows, Delimited};
use crate::run_blocking;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const CACHE_DIR: &str = "pfam";
const DESCRIPTION_FILE: &str = "pfam-data.json";
const MAPPING_FILE: &str = "pfam-mapping-data.json";

/// One Pfam domain placed on a PDB chain (author numbering)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PfamMapping {
    pub pfam_id: String,
    pub auth_asym_id: String,
    pub auth_seq_beg: Option<i64>,
    pub auth_seq_end: Option<i64>,
    pub insert_beg: Option<String>,
    pub insert_end: Option<String>,
}

pub struct PfamProvider {
    descriptions: BTreeMap<String, String>,
    mappings: BTreeMap<String, Vec<PfamMapping>>,
    dir: PathBuf,
}

impl PfamProvider {
    pub const VERSION: &'static str = "34.0";

    pub async fn load(fetcher: &Fetcher, sources: &SourceConfig, options: &ProviderOptions) -> Result<Self> {
        let dir = options.provider_dir(CACHE_DIR);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let descriptions = load_or_build(&dir.join(DESCRIPTION_FILE), options.use_cache, || async {
            info!("Fetching Pfam clan data from {}", sources.pfam_clans.primary);
            let path = fetcher.get_with_fallback(&sources.pfam_clans, &dir).await?;
            run_blocking(move || parse_descriptions(&path)).await
        })
        .await?;

        let mappings = load_or_build(&dir.join(MAPPING_FILE), options.use_cache, || {
            rebuild_mappings(fetcher, sources, &dir)
        })
        .await?;

        info!(
            descriptions = descriptions.len(),
            mapped_entries = mappings.len(),
            "Pfam provider ready"
        );
        Ok(Self {
            descriptions,
            mappings,
            dir,
        })
    }

    pub fn version(&self) -> &'static str {
        Self::VERSION
    }

    pub fn cache_dir(&self) -> &Path {
        &self.dir
    }

    /// `"<description> (<id code>)"`, e.g. `"7 transmembrane receptor (rhodopsin family) (7tm_1)"`
    pub fn description(&self, pfam_id: &str) -> Option<&str> {
        self.descriptions.get(&pfam_id.to_uppercase()).map(String::as_str)
    }

    /// Domain assignments for a PDB entry; the id is case insensitive
    pub fn mapping(&self, pdb_id: &str) -> &[PfamMapping] {
        self.mappings
            .get(&pdb_id.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn description_count(&self) -> usize {
        self.descriptions.len()
    }

    pub fn mapped_entry_count(&self) -> usize {
        self.mappings.len()
    }

    /// Production data has more than 19000 families and 150000 mapped entries
    pub fn test_cache(&self, min_descriptions: usize, min_mapped_entries: usize) -> bool {
        info!(
            "Pfam descriptions {} mapped entries {}",
            self.descriptions.len(),
            self.mappings.len()
        );
        self.descriptions.len() >= min_descriptions && self.mappings.len() >= min_mapped_entries
    }
}

/// Use the primary mapping file unless it is missing or parses to nothing
async fn rebuild_mappings(
    fetcher: &Fetcher,
    sources: &SourceConfig,
    dir: &Path,
) -> Result<BTreeMap<String, Vec<PfamMapping>>> {
    let endpoint = &sources.pfam_mapping;
    info!("Fetching Pfam mapping data from {}", endpoint.primary);

    let primary_path = crate::config::local_path_for(dir, &endpoint.primary);
    match fetcher.get(&endpoint.primary, &primary_path).await {
        Ok(_) => {
            let parsed = run_blocking(move || parse_mappings(&primary_path)).await;
            match parsed {
                Ok(map) if !map.is_empty() => return Ok(map),
                Ok(_) => warn!("Primary Pfam mapping file has no usable rows"),
                Err(e) => warn!("Failed to parse primary Pfam mapping: {:#}", e),
            }
        },
        Err(e) => warn!("Primary Pfam mapping source failed: {:#}", e),
    }

    let fallback = endpoint
        .fallback
        .as_deref()
        .context("Pfam mapping has no fallback source")?;
    let fallback_path = crate::config::local_path_for(dir, fallback);
    fetcher.get(fallback, &fallback_path).await?;
    info!("Using fallback Pfam mapping {}", fallback);
    run_blocking(move || parse_mappings(&fallback_path)).await
}

/// Clan file rows: id (col 0), id code (col 3), description (col 4)
pub fn parse_descriptions(path: &Path) -> Result<BTreeMap<String, String>> {
    let mut descriptions = BTreeMap::new();
    for row in read_rows(path, Delimited::TSV)? {
        if row.len() < 5 {
            continue;
        }
        let pfam_id = row[0].trim().to_uppercase();
        let id_code = row[3].trim();
        let descr = row[4].trim();
        descriptions.insert(pfam_id, format!("{} ({})", descr, id_code));
    }
    Ok(descriptions)
}

fn optional(raw: Option<&String>) -> Option<String> {
    raw.map(|s| s.trim())
        .filter(|s| !s.is_empty() && *s != "None")
        .map(str::to_string)
}

fn parse_mapping_row(row: &HashMap<String, String>) -> Result<(String, PfamMapping)> {
    let field = |name: &str| -> Result<String> {
        row.get(name)
            .map(|s| s.trim().to_uppercase())
            .with_context(|| format!("missing column {}", name))
    };
    let number = |name: &str| -> Result<Option<i64>> {
        optional(row.get(name))
            .map(|s| s.parse::<i64>().with_context(|| format!("bad {} value {:?}", name, s)))
            .transpose()
    };

    let pdb_id = field("PDB")?;
    let mapping = PfamMapping {
        pfam_id: field("PFAM_ACCESSION")?,
        auth_asym_id: field("CHAIN")?,
        auth_seq_beg: number("AUTH_PDBRES_START")?,
        auth_seq_end: number("AUTH_PDBRES_END")?,
        insert_beg: optional(row.get("AUTH_PDBRES_START_INS_CODE")),
        insert_end: optional(row.get("AUTH_PDBRES_END_INS_CODE")),
    };
    Ok((pdb_id, mapping))
}

pub fn parse_mappings(path: &Path) -> Result<BTreeMap<String, Vec<PfamMapping>>> {
    let mut mappings: BTreeMap<String, Vec<PfamMapping>> = BTreeMap::new();
    let mut skipped = 0usize;

    for row in read_records(path, Delimited::TSV)? {
        match parse_mapping_row(&row) {
            Ok((pdb_id, mapping)) => mappings.entry(pdb_id).or_default().push(mapping),
            Err(e) => {
                skipped += 1;
                warn!("Skipping Pfam mapping row: {:#}", e);
            },
        }
    }

    info!("Pfam mapping data for {} entries ({} rows skipped)", mappings.len(), skipped);
    Ok(mappings)
}
