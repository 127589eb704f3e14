//! UniProt accession to cross-reference mapping
//!
//! Built from `idmapping_selected.tab.gz`, a 22 column TSV with one row per
//! UniProtKB accession. Only the columns named in [`IdMappingOptions`] are
//! kept, and the reduced table is cached as JSON:
//!
//! ```text
//! <cache>/uniprot-id-mapping/idmapping_selected.tab-map.json
//! ```

use crate::cache::load_or_build;
use crate::config::{file_name, local_path_for, Endpoint, ProviderOptions, SourceConfig};
use crate::decompression::open_text;
use crate::fetch::Fetcher;
use crate::run_blocking;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::str::FromStr;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub const CACHE_DIR: &str = "uniprot-id-mapping";

/// Columns of `idmapping_selected.tab`; the discriminant is the zero-based column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdMapName {
    #[serde(rename = "UniProtKB-AC")]
    UniProtKbAc = 0,
    #[serde(rename = "UniProtKB-ID")]
    UniProtKbId = 1,
    #[serde(rename = "GeneID")]
    GeneId = 2,
    #[serde(rename = "RefSeq")]
    RefSeq = 3,
    #[serde(rename = "GI")]
    Gi = 4,
    #[serde(rename = "PDB")]
    Pdb = 5,
    #[serde(rename = "GO")]
    Go = 6,
    #[serde(rename = "UniRef100")]
    UniRef100 = 7,
    #[serde(rename = "UniRef90")]
    UniRef90 = 8,
    #[serde(rename = "UniRef50")]
    UniRef50 = 9,
    #[serde(rename = "UniParc")]
    UniParc = 10,
    #[serde(rename = "PIR")]
    Pir = 11,
    #[serde(rename = "NCBI-taxon")]
    NcbiTaxon = 12,
    #[serde(rename = "MIM")]
    Mim = 13,
    #[serde(rename = "UniGene")]
    UniGene = 14,
    #[serde(rename = "PubMed")]
    PubMed = 15,
    #[serde(rename = "EMBL")]
    Embl = 16,
    #[serde(rename = "EMBL-CDS")]
    EmblCds = 17,
    #[serde(rename = "Ensembl")]
    Ensembl = 18,
    #[serde(rename = "Ensembl_TRS")]
    EnsemblTrs = 19,
    #[serde(rename = "Ensembl_PRO")]
    EnsemblPro = 20,
    #[serde(rename = "Additional PubMed")]
    AdditionalPubMed = 21,
}

impl IdMapName {
    pub const ALL: [IdMapName; 22] = [
        IdMapName::UniProtKbAc,
        IdMapName::UniProtKbId,
        IdMapName::GeneId,
        IdMapName::RefSeq,
        IdMapName::Gi,
        IdMapName::Pdb,
        IdMapName::Go,
        IdMapName::UniRef100,
        IdMapName::UniRef90,
        IdMapName::UniRef50,
        IdMapName::UniParc,
        IdMapName::Pir,
        IdMapName::NcbiTaxon,
        IdMapName::Mim,
        IdMapName::UniGene,
        IdMapName::PubMed,
        IdMapName::Embl,
        IdMapName::EmblCds,
        IdMapName::Ensembl,
        IdMapName::EnsemblTrs,
        IdMapName::EnsemblPro,
        IdMapName::AdditionalPubMed,
    ];

    /// Zero-based column in the TSV file
    pub fn column(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdMapName::UniProtKbAc => "UniProtKB-AC",
            IdMapName::UniProtKbId => "UniProtKB-ID",
            IdMapName::GeneId => "GeneID",
            IdMapName::RefSeq => "RefSeq",
            IdMapName::Gi => "GI",
            IdMapName::Pdb => "PDB",
            IdMapName::Go => "GO",
            IdMapName::UniRef100 => "UniRef100",
            IdMapName::UniRef90 => "UniRef90",
            IdMapName::UniRef50 => "UniRef50",
            IdMapName::UniParc => "UniParc",
            IdMapName::Pir => "PIR",
            IdMapName::NcbiTaxon => "NCBI-taxon",
            IdMapName::Mim => "MIM",
            IdMapName::UniGene => "UniGene",
            IdMapName::PubMed => "PubMed",
            IdMapName::Embl => "EMBL",
            IdMapName::EmblCds => "EMBL-CDS",
            IdMapName::Ensembl => "Ensembl",
            IdMapName::EnsemblTrs => "Ensembl_TRS",
            IdMapName::EnsemblPro => "Ensembl_PRO",
            IdMapName::AdditionalPubMed => "Additional PubMed",
        }
    }
}

impl std::fmt::Display for IdMapName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdMapName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown id mapping name: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMappingOptions {
    /// Columns to keep
    pub map_names: Vec<IdMapName>,
    /// Stop after this many rows (test builds)
    pub max_limit: Option<usize>,
    /// Also load the 2015_03 legacy mapping
    pub use_legacy: bool,
}

impl Default for IdMappingOptions {
    fn default() -> Self {
        Self {
            map_names: vec![IdMapName::NcbiTaxon],
            max_limit: None,
            use_legacy: false,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdMapTable {
    id_name_list: Vec<IdMapName>,
    uniprot_map_d: HashMap<String, Vec<String>>,
}

impl IdMapTable {
    fn get(&self, accession: &str, name: IdMapName) -> Option<&str> {
        let idx = self.id_name_list.iter().position(|n| *n == name)?;
        self.uniprot_map_d
            .get(accession)
            .and_then(|row| row.get(idx))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}

pub struct IdMappingProvider {
    current: IdMapTable,
    legacy: IdMapTable,
}

static SHARED: OnceCell<IdMappingProvider> = OnceCell::const_new();

impl IdMappingProvider {
    pub async fn load(
        fetcher: &Fetcher,
        sources: &SourceConfig,
        options: &ProviderOptions,
        id_options: &IdMappingOptions,
    ) -> Result<Self> {
        let dir = options.provider_dir(CACHE_DIR);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let current = load_table(fetcher, &sources.id_mapping, &dir, options.use_cache, id_options).await?;
        let legacy = if id_options.use_legacy {
            load_table(fetcher, &sources.id_mapping_legacy, &dir, options.use_cache, id_options).await?
        } else {
            IdMapTable::default()
        };

        Ok(Self { current, legacy })
    }

    /// Process-wide instance; the first caller's settings win
    pub async fn shared(
        fetcher: &Fetcher,
        sources: &SourceConfig,
        options: &ProviderOptions,
        id_options: &IdMappingOptions,
    ) -> Result<&'static IdMappingProvider> {
        SHARED
            .get_or_try_init(|| Self::load(fetcher, sources, options, id_options))
            .await
    }

    pub fn mapped_id(&self, accession: &str, name: IdMapName) -> Option<&str> {
        self.current.get(accession, name)
    }

    pub fn mapped_id_legacy(&self, accession: &str, name: IdMapName) -> Option<&str> {
        self.legacy.get(accession, name)
    }

    pub fn map_names(&self) -> &[IdMapName] {
        &self.current.id_name_list
    }

    pub fn len(&self) -> usize {
        self.current.uniprot_map_d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.uniprot_map_d.is_empty()
    }

    /// Production data maps well over 1000 accessions
    pub fn test_cache(&self, min_count: usize) -> bool {
        info!("Length UniProt mapping for {:?} {}", self.current.id_name_list, self.len());
        self.len() >= min_count
    }
}

/// `idmapping_selected.tab.gz` -> `idmapping_selected.tab-map.json`
fn cache_file_name(location: &str) -> String {
    let name = file_name(location);
    let stem = Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(name);
    format!("{}-map.json", stem)
}

async fn load_table(
    fetcher: &Fetcher,
    endpoint: &Endpoint,
    dir: &Path,
    use_cache: bool,
    id_options: &IdMappingOptions,
) -> Result<IdMapTable> {
    let cache_path = dir.join(cache_file_name(&endpoint.primary));
    load_or_build(&cache_path, use_cache, || async {
        let raw = local_path_for(dir, &endpoint.primary);
        let raw = if raw.is_file() {
            info!("Using downloaded mapping file {}", raw.display());
            raw
        } else {
            info!("Fetch selected idmapping data from {}", endpoint.primary);
            fetcher.get_with_fallback(endpoint, dir).await?
        };

        let names = id_options.map_names.clone();
        let limit = id_options.max_limit;
        run_blocking(move || parse_id_mapping(&raw, &names, limit)).await
    })
    .await
}

fn parse_id_mapping(path: &Path, names: &[IdMapName], max_limit: Option<usize>) -> Result<IdMapTable> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    let mut short_rows = 0usize;

    for line in open_text(path)?.split(b'\n') {
        if max_limit.is_some_and(|limit| map.len() >= limit) {
            break;
        }
        let line = line.with_context(|| format!("Failed reading {}", path.display()))?;
        // Invalid UTF-8 in free text columns is replaced rather than fatal
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 2 {
            short_rows += 1;
            continue;
        }
        let values: Vec<String> = names
            .iter()
            .map(|n| fields.get(n.column()).map(|s| s.trim().to_string()).unwrap_or_default())
            .collect();
        map.insert(fields[0].trim().to_string(), values);

        if map.len() % 50_000_000 == 0 {
            info!("Processing {}", map.len());
        }
    }

    if short_rows > 0 {
        warn!("Skipped {} short id mapping rows in {}", short_rows, path.display());
    }
    Ok(IdMapTable {
        id_name_list: names.to_vec(),
        uniprot_map_d: map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;

    fn row(acc: &str, taxon: &str, go: &str) -> String {
        let mut cols = vec![String::new(); 22];
        cols[0] = acc.to_string();
        cols[1] = format!("{}_HUMAN", acc);
        cols[IdMapName::Go.column()] = go.to_string();
        cols[IdMapName::NcbiTaxon.column()] = taxon.to_string();
        cols.join("\t")
    }

    fn sources_for(dir: &Path) -> SourceConfig {
        let path = dir.join("idmapping_selected.tab");
        let body = [row("P00001", "9606", "GO:0005515; GO:0005737"), row("P00002", "10090", ""), row("P00003", "7227", "")]
            .join("\n");
        std::fs::write(&path, body).unwrap();

        let mut sources = SourceConfig::default();
        sources.id_mapping = Endpoint::single(path.to_string_lossy().to_string());
        sources
    }

    #[test]
    fn test_names() {
        assert_eq!(IdMapName::UniProtKbAc.column(), 0);
        assert_eq!(IdMapName::NcbiTaxon.column(), 12);
        assert_eq!(IdMapName::AdditionalPubMed.column(), 21);
        for (idx, name) in IdMapName::ALL.iter().enumerate() {
            assert_eq!(name.column(), idx, "{}", name.as_str());
        }
        assert_eq!("ncbi-taxon".parse::<IdMapName>(), Ok(IdMapName::NcbiTaxon));
        assert_eq!(serde_json::to_string(&IdMapName::EmblCds).unwrap(), "\"EMBL-CDS\"");
        assert_eq!(cache_file_name("ftp://x/idmapping_selected.tab.gz"), "idmapping_selected.tab-map.json");
    }

    #[tokio::test]
    async fn test_load_and_lookup() {
        let src = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        let id_options = IdMappingOptions {
            map_names: vec![IdMapName::NcbiTaxon, IdMapName::Go],
            ..Default::default()
        };

        let p = IdMappingProvider::load(&fetcher, &sources_for(src.path()), &ProviderOptions::new(cache.path(), true), &id_options)
            .await
            .unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p.mapped_id("P00001", IdMapName::NcbiTaxon), Some("9606"));
        assert_eq!(p.mapped_id("P00001", IdMapName::Go), Some("GO:0005515; GO:0005737"));
        assert_eq!(p.mapped_id("P00002", IdMapName::Go), None);
        assert_eq!(p.mapped_id("P00001", IdMapName::Pdb), None);
        assert_eq!(p.mapped_id_legacy("P00001", IdMapName::NcbiTaxon), None);
        assert!(p.test_cache(3));
        assert!(cache.path().join(CACHE_DIR).join("idmapping_selected-map.json").exists());
    }

    #[tokio::test]
    async fn test_max_limit() {
        let src = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        let id_options = IdMappingOptions {
            max_limit: Some(2),
            ..Default::default()
        };

        let p = IdMappingProvider::load(&fetcher, &sources_for(src.path()), &ProviderOptions::new(cache.path(), false), &id_options)
            .await
            .unwrap();
        assert_eq!(p.len(), 2);
        assert_eq!(p.map_names(), [IdMapName::NcbiTaxon]);
    }
}
