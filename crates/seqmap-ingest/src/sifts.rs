//! SIFTS chain level summary mappings
//!
//! The SIFTS flat files map every PDB chain onto UniProt segments and
//! annotate it with Pfam, InterPro, GO, taxonomy, CATH, SCOP and EC
//! identifiers. All files are CSV with a leading `#` comment line:
//!
//! ```text
//! # 2023/01/04 - 11:22 | PDB: 01.23 | UniProt: 2023.01
//! PDB,CHAIN,SP_PRIMARY,RES_BEG,RES_END,PDB_BEG,PDB_END,SP_BEG,SP_END
//! 101m,A,P02185,1,154,0,153,1,154
//! ```

use crate::cache::load_or_build;
use crate::config::{env_parse, env_string, join_url, ProviderOptions};
use crate::fetch::Fetcher;
use crate::marshal::{read_records, read_rows, Delimited};
use crate::run_blocking;
use crate::seq_align::{split_seq_align_list, SeqAlign};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

pub const CACHE_DIR: &str = "sifts";
const SUMMARY_FILE: &str = "sifts-summary.json";
const DEFAULT_SOURCE: &str = "https://ftp.ebi.ac.uk/pub/databases/msd/sifts/flatfiles/csv";

const UNIPROT_FILE: &str = "pdb_chain_uniprot.csv.gz";
const PFAM_FILE: &str = "pdb_chain_pfam.csv.gz";
const INTERPRO_FILE: &str = "pdb_chain_interpro.csv.gz";
const GO_FILE: &str = "pdb_chain_go.csv.gz";
const TAXONOMY_FILE: &str = "pdb_chain_taxonomy.csv.gz";
const CATH_FILE: &str = "pdb_chain_cath_uniprot.csv.gz";
const SCOP_FILE: &str = "pdb_chain_scop_uniprot.csv.gz";
const ENZYME_FILE: &str = "pdb_chain_enzyme.csv.gz";

/// How many of the SIFTS annotation files are folded into the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AbbreviationLevel {
    /// UniProt alignments and Pfam
    #[default]
    Test,
    /// Adds InterPro and GO
    Prod,
    /// Adds taxonomy, CATH, SCOP and EC
    Full,
}

impl AbbreviationLevel {
    pub fn source_files(self) -> &'static [&'static str] {
        const FILES: [&str; 8] = [
            UNIPROT_FILE,
            PFAM_FILE,
            INTERPRO_FILE,
            GO_FILE,
            TAXONOMY_FILE,
            CATH_FILE,
            SCOP_FILE,
            ENZYME_FILE,
        ];
        match self {
            AbbreviationLevel::Test => &FILES[..2],
            AbbreviationLevel::Prod => &FILES[..4],
            AbbreviationLevel::Full => &FILES,
        }
    }
}

impl FromStr for AbbreviationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "test" => Ok(AbbreviationLevel::Test),
            "prod" => Ok(AbbreviationLevel::Prod),
            "full" => Ok(AbbreviationLevel::Full),
            _ => Err(format!("Invalid SIFTS abbreviation level: {}", s)),
        }
    }
}

/// Identifier lists held per chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiftsIdType {
    UniProt,
    Pfam,
    InterPro,
    GeneOntology,
    Taxonomy,
    Cath,
    Scop,
    Enzyme,
}

impl SiftsIdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiftsIdType::UniProt => "UNPID",
            SiftsIdType::Pfam => "PFAMID",
            SiftsIdType::InterPro => "IPROID",
            SiftsIdType::GeneOntology => "GOID",
            SiftsIdType::Taxonomy => "TAXID",
            SiftsIdType::Cath => "CATHID",
            SiftsIdType::Scop => "SCOPID",
            SiftsIdType::Enzyme => "ECID",
        }
    }
}

impl fmt::Display for SiftsIdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiftsIdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "UNPID" => Ok(SiftsIdType::UniProt),
            "PFAMID" => Ok(SiftsIdType::Pfam),
            "IPROID" => Ok(SiftsIdType::InterPro),
            "GOID" => Ok(SiftsIdType::GeneOntology),
            "TAXID" => Ok(SiftsIdType::Taxonomy),
            "CATHID" => Ok(SiftsIdType::Cath),
            "SCOPID" => Ok(SiftsIdType::Scop),
            "ECID" => Ok(SiftsIdType::Enzyme),
            _ => Err(format!("Unsupported SIFTS identifier type: {}", s)),
        }
    }
}

/// One UniProt segment on a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiftsAlignment {
    #[serde(rename = "UP")]
    pub unp_id: String,
    #[serde(rename = "BG")]
    pub beg: i64,
    #[serde(rename = "LEN")]
    pub len: i64,
    #[serde(rename = "UBG")]
    pub unp_beg: Option<i64>,
    #[serde(rename = "UND")]
    pub unp_end: Option<i64>,
}

/// Everything known about one chain. Annotation lists are absent when the
/// abbreviation level did not include their source file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiftsChain {
    #[serde(rename = "UNPAL", default)]
    pub alignments: Vec<SiftsAlignment>,
    #[serde(rename = "UNPID", default)]
    pub unp_ids: Vec<String>,
    #[serde(rename = "PFAMID", default, skip_serializing_if = "Option::is_none")]
    pub pfam_ids: Option<Vec<String>>,
    #[serde(rename = "IPROID", default, skip_serializing_if = "Option::is_none")]
    pub interpro_ids: Option<Vec<String>>,
    #[serde(rename = "GOID", default, skip_serializing_if = "Option::is_none")]
    pub go_ids: Option<Vec<String>>,
    #[serde(rename = "TAXID", default, skip_serializing_if = "Option::is_none")]
    pub tax_ids: Option<Vec<String>>,
    #[serde(rename = "CATHID", default, skip_serializing_if = "Option::is_none")]
    pub cath_ids: Option<Vec<String>>,
    #[serde(rename = "SCOPID", default, skip_serializing_if = "Option::is_none")]
    pub scop_ids: Option<Vec<String>>,
    #[serde(rename = "ECID", default, skip_serializing_if = "Option::is_none")]
    pub ec_ids: Option<Vec<String>>,
}

impl SiftsChain {
    pub fn identifiers(&self, id_type: SiftsIdType) -> &[String] {
        let ids = match id_type {
            SiftsIdType::UniProt => return &self.unp_ids,
            SiftsIdType::Pfam => &self.pfam_ids,
            SiftsIdType::InterPro => &self.interpro_ids,
            SiftsIdType::GeneOntology => &self.go_ids,
            SiftsIdType::Taxonomy => &self.tax_ids,
            SiftsIdType::Cath => &self.cath_ids,
            SiftsIdType::Scop => &self.scop_ids,
            SiftsIdType::Enzyme => &self.ec_ids,
        };
        ids.as_deref().unwrap_or(&[])
    }
}

/// `entry id (upper case) -> chain id -> chain summary`
pub type SiftsIndex = BTreeMap<String, BTreeMap<String, SiftsChain>>;

type ChainTable = HashMap<String, HashMap<String, Vec<String>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiftsOptions {
    /// Directory or base URL holding the SIFTS CSV files
    pub source: String,
    pub level: AbbreviationLevel,
    /// Keep only the first N entries in the saved summary
    pub entry_save_limit: Option<usize>,
}

impl Default for SiftsOptions {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            level: AbbreviationLevel::default(),
            entry_save_limit: None,
        }
    }
}

impl SiftsOptions {
    /// `SEQMAP_SIFTS_SOURCE`, `SEQMAP_SIFTS_LEVEL`, `SEQMAP_SIFTS_ENTRY_SAVE_LIMIT`
    pub fn from_env() -> Self {
        let limit: usize = env_parse("SEQMAP_SIFTS_ENTRY_SAVE_LIMIT", 0);
        Self {
            source: env_string("SEQMAP_SIFTS_SOURCE", DEFAULT_SOURCE),
            level: env_parse("SEQMAP_SIFTS_LEVEL", AbbreviationLevel::default()),
            entry_save_limit: (limit > 0).then_some(limit),
        }
    }
}

pub struct SiftsSummaryProvider {
    index: SiftsIndex,
}

impl SiftsSummaryProvider {
    pub async fn load(fetcher: &Fetcher, sifts: &SiftsOptions, options: &ProviderOptions) -> Result<Self> {
        let dir = options.provider_dir(CACHE_DIR);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        let index = load_or_build(&dir.join(SUMMARY_FILE), options.use_cache, || async {
            let mut files: Vec<(&'static str, Option<PathBuf>)> = Vec::new();
            for &name in sifts.level.source_files() {
                match source_path(fetcher, &sifts.source, name, &dir).await {
                    Ok(path) => files.push((name, Some(path))),
                    Err(e) if name == UNIPROT_FILE => return Err(e),
                    Err(e) => {
                        warn!("SIFTS file {} unavailable: {:#}", name, e);
                        files.push((name, None));
                    },
                }
            }
            let limit = sifts.entry_save_limit;
            run_blocking(move || build_summary(&files, limit)).await
        })
        .await?;

        info!("SIFTS summary for {} entries", index.len());
        Ok(Self { index })
    }

    pub fn from_index(index: SiftsIndex) -> Self {
        Self { index }
    }

    fn chain(&self, entry_id: &str, chain_id: &str) -> Option<&SiftsChain> {
        self.index.get(&entry_id.to_uppercase())?.get(chain_id)
    }

    pub fn entry_count(&self) -> usize {
        self.index.len()
    }

    pub fn entries(&self) -> Vec<&str> {
        self.index.keys().map(String::as_str).collect()
    }

    /// Sorted distinct identifiers over every chain
    pub fn unique_identifiers(&self, id_type: SiftsIdType) -> Vec<String> {
        self.index
            .values()
            .flat_map(|chains| chains.values())
            .flat_map(|c| c.identifiers(id_type).iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sorted distinct identifiers over the chains of the listed entries
    pub fn entry_unique_identifiers(&self, entry_ids: &[&str], id_type: SiftsIdType) -> Vec<String> {
        entry_ids
            .iter()
            .filter_map(|id| self.index.get(&id.to_uppercase()))
            .flat_map(|chains| chains.values())
            .flat_map(|c| c.identifiers(id_type).iter().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn alignment_count(&self, entry_id: &str, chain_id: &str) -> usize {
        self.alignments(entry_id, chain_id).len()
    }

    pub fn alignments(&self, entry_id: &str, chain_id: &str) -> &[SiftsAlignment] {
        self.chain(entry_id, chain_id)
            .map(|c| c.alignments.as_slice())
            .unwrap_or(&[])
    }

    pub fn seq_align_list(&self, entry_id: &str, chain_id: &str) -> Vec<SeqAlign> {
        self.alignments(entry_id, chain_id)
            .iter()
            .map(SeqAlign::from_sifts)
            .collect()
    }

    /// Longest alignment of each overlapping group, per `(db name, accession)`
    pub fn longest_alignments(&self, entry_id: &str, chain_ids: &[&str]) -> BTreeMap<(String, String), Vec<SeqAlign>> {
        let mut by_ref: BTreeMap<(String, String), Vec<SeqAlign>> = BTreeMap::new();
        for chain_id in chain_ids {
            for al in self.seq_align_list(entry_id, chain_id) {
                let key = (
                    al.db_name.clone().unwrap_or_default(),
                    al.db_accession.clone().unwrap_or_default(),
                );
                by_ref.entry(key).or_default().push(al);
            }
        }

        let mut longest: BTreeMap<(String, String), Vec<SeqAlign>> = BTreeMap::new();
        for (key, alignments) in by_ref {
            let groups = split_seq_align_list(&alignments);
            debug!("SIFTS {} {:?} groups {}", entry_id, key, groups.len());
            for members in groups.into_values() {
                let mut best: Option<SeqAlign> = None;
                for al in members {
                    let len = al.entity_align_length().unwrap_or(0);
                    if best
                        .as_ref()
                        .map_or(true, |b| len > b.entity_align_length().unwrap_or(0))
                    {
                        best = Some(al);
                    }
                }
                if let Some(al) = best {
                    longest.entry(key.clone()).or_default().push(al);
                }
            }
        }
        longest
    }

    pub fn identifiers(&self, entry_id: &str, chain_id: &str, id_type: SiftsIdType) -> &[String] {
        self.chain(entry_id, chain_id)
            .map(|c| c.identifiers(id_type))
            .unwrap_or(&[])
    }

    pub fn tax_ids(&self, entry_id: &str, chain_id: &str) -> &[String] {
        self.identifiers(entry_id, chain_id, SiftsIdType::Taxonomy)
    }

    /// Production data holds more than 140000 entries
    pub fn test_cache(&self, min_count: usize) -> bool {
        info!("SIFTS entry length {}", self.index.len());
        self.index.len() >= min_count
    }
}

/// Local source directories are read in place, anything else is fetched
async fn source_path(fetcher: &Fetcher, source: &str, name: &str, dir: &Path) -> Result<PathBuf> {
    let local = Path::new(source);
    if local.is_dir() {
        let path = local.join(name);
        anyhow::ensure!(path.is_file(), "Missing SIFTS file {}", path.display());
        return Ok(path);
    }
    let dest = dir.join("source").join(name);
    fetcher.get(&join_url(source, name), &dest).await?;
    Ok(dest)
}

fn build_summary(files: &[(&str, Option<PathBuf>)], entry_save_limit: Option<usize>) -> Result<SiftsIndex> {
    let uniprot = files
        .iter()
        .find(|(name, _)| *name == UNIPROT_FILE)
        .and_then(|(_, path)| path.as_deref())
        .context("Missing SIFTS UniProt mapping file")?;
    let mut index = parse_uniprot(uniprot)?;

    for (name, path) in files {
        let Some(path) = path else { continue };
        let parsed = match *name {
            PFAM_FILE => parse_chain_column(path, "PFAM_ID", Some("PF")),
            INTERPRO_FILE => parse_chain_column(path, "INTERPRO_ID", Some("IPR")),
            GO_FILE => parse_go(path),
            TAXONOMY_FILE => parse_chain_column(path, "TAX_ID", None),
            CATH_FILE => parse_chain_column(path, "CATH_ID", None),
            SCOP_FILE => parse_chain_column(path, "SCOP_ID", None),
            ENZYME_FILE => parse_chain_column(path, "EC_NUMBER", None),
            _ => continue,
        };
        let table = match parsed {
            Ok(table) => table,
            Err(e) => {
                warn!("Skipping SIFTS file {}: {:#}", name, e);
                continue;
            },
        };
        info!("SIFTS {} mapping length {}", name, table.len());

        match *name {
            PFAM_FILE => attach(&mut index, table, |c, ids| c.pfam_ids = Some(sorted_unique(ids))),
            INTERPRO_FILE => attach(&mut index, table, |c, ids| c.interpro_ids = Some(sorted_unique(ids))),
            GO_FILE => attach(&mut index, table, |c, ids| c.go_ids = Some(sorted_unique(ids))),
            TAXONOMY_FILE => attach(&mut index, table, |c, ids| c.tax_ids = Some(sorted_unique(ids))),
            CATH_FILE => attach(&mut index, table, |c, ids| c.cath_ids = Some(ids)),
            SCOP_FILE => attach(&mut index, table, |c, ids| c.scop_ids = Some(ids)),
            _ => attach(&mut index, table, |c, ids| c.ec_ids = Some(ids)),
        }
    }

    if let Some(limit) = entry_save_limit {
        index = index.into_iter().take(limit).collect();
    }
    Ok(index)
}

fn sorted_unique(ids: Vec<String>) -> Vec<String> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Give every chain of the index its list from `table` (empty when absent)
fn attach<F>(index: &mut SiftsIndex, mut table: ChainTable, mut set: F)
where
    F: FnMut(&mut SiftsChain, Vec<String>),
{
    for (entry_id, chains) in index.iter_mut() {
        let mut entry_table = table.remove(entry_id);
        for (chain_id, chain) in chains.iter_mut() {
            let ids = entry_table
                .as_mut()
                .and_then(|t| t.remove(chain_id))
                .unwrap_or_default();
            set(chain, ids);
        }
    }
}

fn digits(value: Option<&String>) -> Option<i64> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
}

pub fn parse_uniprot(path: &Path) -> Result<SiftsIndex> {
    let rows = read_records(path, Delimited::CSV)?;
    info!("Length of SIFTS UniProt summary file {} {}", path.display(), rows.len());

    let mut index = SiftsIndex::new();
    let mut skipped = 0usize;
    for row in rows {
        let (Some(entry_id), Some(chain_id), Some(unp_id)) = (row.get("PDB"), row.get("CHAIN"), row.get("SP_PRIMARY"))
        else {
            skipped += 1;
            continue;
        };
        let (Some(beg), Some(end)) = (digits(row.get("RES_BEG")), digits(row.get("RES_END"))) else {
            debug!("Skipping SIFTS row without residue range {} {}", entry_id, chain_id);
            skipped += 1;
            continue;
        };

        let chain = index
            .entry(entry_id.trim().to_uppercase())
            .or_default()
            .entry(chain_id.trim().to_string())
            .or_default();
        chain.alignments.push(SiftsAlignment {
            unp_id: unp_id.trim().to_string(),
            beg,
            len: end - beg + 1,
            unp_beg: digits(row.get("SP_BEG")),
            unp_end: digits(row.get("SP_END")),
        });
        chain.unp_ids.push(unp_id.trim().to_string());
    }

    for chain in index.values_mut().flat_map(|chains| chains.values_mut()) {
        chain.unp_ids = sorted_unique(std::mem::take(&mut chain.unp_ids));
    }
    info!("UniProt mapping for {} entries ({} rows skipped)", index.len(), skipped);
    Ok(index)
}

/// `entry -> chain -> values of column`, keeping only values with `prefix`
fn parse_chain_column(path: &Path, column: &str, prefix: Option<&str>) -> Result<ChainTable> {
    let mut table = ChainTable::new();
    let mut bad = 0usize;
    for row in read_records(path, Delimited::CSV)? {
        let (Some(entry_id), Some(chain_id), Some(value)) = (row.get("PDB"), row.get("CHAIN"), row.get(column)) else {
            bad += 1;
            continue;
        };
        let value = value.trim();
        if prefix.is_some_and(|p| !value.starts_with(p)) {
            warn!("Skipping bad {} {} {} {:?}", column, entry_id, chain_id, value);
            bad += 1;
            continue;
        }
        table
            .entry(entry_id.trim().to_uppercase())
            .or_default()
            .entry(chain_id.trim().to_string())
            .or_default()
            .push(value.to_string());
    }
    info!("{} data for {} entries ({} bad rows)", column, table.len(), bad);
    Ok(table)
}

/// GO rows have a variable number of fields; the GO id is always last
fn parse_go(path: &Path) -> Result<ChainTable> {
    let mut table = ChainTable::new();
    let (mut ok, mut bad) = (0usize, 0usize);
    for row in read_rows(path, Delimited::CSV)? {
        if row.len() < 3 || row[0].trim() == "PDB" {
            continue;
        }
        let go_id = row[row.len() - 1].trim();
        if !go_id.starts_with("GO:") {
            warn!("Skipping bad GO record ({}) {} {} {:?}", row.len(), row[0], row[1], go_id);
            bad += 1;
            continue;
        }
        table
            .entry(row[0].trim().to_uppercase())
            .or_default()
            .entry(row[1].trim().to_string())
            .or_default()
            .push(go_id.to_string());
        ok += 1;
    }
    info!("GO records {} format errors {}", ok, bad);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchConfig;

    const HEADER: &str = "# 2023/01/04 - 11:22 | PDB: 01.23 | UniProt: 2023.01\n";

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), format!("{}{}", HEADER, body)).unwrap();
    }

    fn source_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path();
        write(
            p,
            UNIPROT_FILE,
            "PDB,CHAIN,SP_PRIMARY,RES_BEG,RES_END,PDB_BEG,PDB_END,SP_BEG,SP_END\n\
             101m,A,P02185,1,154,0,153,1,154\n\
             1abc,A,P00001,1,5,1,5,20,24\n\
             1abc,A,P00001,1,100,1,100,1,100\n\
             1abc,A,P00001,50,149,50,149,70,169\n\
             1abc,B,P00002,1,50,1,50,1,50\n\
             1abc,B,P00001,400,449,400,449,20,69\n\
             2bad,A,P00009,?,10,1,10,1,10\n",
        );
        write(
            p,
            PFAM_FILE,
            "PDB,CHAIN,SP_PRIMARY,PFAM_ID,COVERAGE\n\
             101m,A,P02185,PF00042,0.98\n\
             1abc,A,P00001,PF00001,1\n\
             1abc,A,P00001,PF00001,1\n\
             1abc,A,P00001,bad,1\n",
        );
        write(
            p,
            INTERPRO_FILE,
            "PDB,CHAIN,INTERPRO_ID\n101m,A,IPR000971\n101m,A,IPR002335\n101m,A,X1\n",
        );
        write(
            p,
            GO_FILE,
            "PDB,CHAIN,SP_PRIMARY,WITH_STRING,EVIDENCE,GO_ID\n\
             101m,A,IPRO,InterPro:IPR000971,IEA,GO:0020037\n\
             101m,A,IPRO,InterPro:IPR002335,IEA,GO:0015671\n\
             101m,A,IPRO,InterPro:IPR002335,IEA,GO:0020037\n\
             1abc,A,P00001,UniProtKB:Q1,extra,IEA,GO:0005515\n\
             1abc,A,P00001,x,IEA,notgo\n",
        );
        write(
            p,
            TAXONOMY_FILE,
            "PDB,CHAIN,TAX_ID,SCIENTIFIC_NAME\n101m,A,9755,PHYCD\n101m,A,9755,PHYCD\n1abc,A,9606,HUMAN\n",
        );
        write(p, CATH_FILE, "PDB,CHAIN,SP_PRIMARY,CATH_ID\n101m,A,P02185,1.10.490.10\n");
        write(p, SCOP_FILE, "PDB,CHAIN,SP_PRIMARY,SUNID,SCOP_ID\n101m,A,P02185,15125,46463\n");
        dir
    }

    async fn load(source: &Path, cache: &Path, level: AbbreviationLevel, limit: Option<usize>) -> SiftsSummaryProvider {
        let fetcher = Fetcher::new(FetchConfig::no_retry()).unwrap();
        let sifts = SiftsOptions {
            source: source.to_string_lossy().to_string(),
            level,
            entry_save_limit: limit,
        };
        SiftsSummaryProvider::load(&fetcher, &sifts, &ProviderOptions::new(cache, true))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_full_summary() {
        let src = source_dir();
        let cache = tempfile::tempdir().unwrap();
        let p = load(src.path(), cache.path(), AbbreviationLevel::Full, None).await;

        assert_eq!(p.entries(), vec!["101M", "1ABC"]);
        assert!(p.test_cache(2));
        assert_eq!(p.alignment_count("101m", "A"), 1);
        assert_eq!(p.alignment_count("1ABC", "A"), 3);
        assert_eq!(p.alignments("1abc", "A")[0].len, 5);

        assert_eq!(p.identifiers("1abc", "A", SiftsIdType::Pfam), ["PF00001"]);
        assert_eq!(p.identifiers("101m", "A", SiftsIdType::InterPro), ["IPR000971", "IPR002335"]);
        assert_eq!(p.identifiers("101m", "A", SiftsIdType::GeneOntology), ["GO:0015671", "GO:0020037"]);
        assert_eq!(p.identifiers("1abc", "A", SiftsIdType::GeneOntology), ["GO:0005515"]);
        assert_eq!(p.tax_ids("101m", "A"), ["9755"]);
        assert_eq!(p.identifiers("101m", "A", SiftsIdType::Scop), ["46463"]);
        assert!(p.identifiers("1abc", "B", SiftsIdType::Cath).is_empty());
        // pdb_chain_enzyme.csv.gz was never written
        assert!(p.identifiers("101m", "A", SiftsIdType::Enzyme).is_empty());

        assert_eq!(p.unique_identifiers(SiftsIdType::UniProt), ["P00001", "P00002", "P02185"]);
        assert_eq!(p.entry_unique_identifiers(&["1abc"], SiftsIdType::UniProt), ["P00001", "P00002"]);
    }

    #[tokio::test]
    async fn test_abbreviated_summary() {
        let src = source_dir();
        let cache = tempfile::tempdir().unwrap();
        let p = load(src.path(), cache.path(), AbbreviationLevel::Test, Some(1)).await;

        assert_eq!(p.entry_count(), 1);
        assert_eq!(p.identifiers("101m", "A", SiftsIdType::Pfam), ["PF00042"]);
        assert!(p.identifiers("101m", "A", SiftsIdType::GeneOntology).is_empty());

        // Second load comes from the cache even though the source is gone
        drop(src);
        let empty = tempfile::tempdir().unwrap();
        let cached = load(empty.path(), cache.path(), AbbreviationLevel::Test, None).await;
        assert_eq!(cached.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_longest_alignments() {
        let src = source_dir();
        let cache = tempfile::tempdir().unwrap();
        let p = load(src.path(), cache.path(), AbbreviationLevel::Test, None).await;

        let longest = p.longest_alignments("1abc", &["A", "B"]);
        let p1 = &longest[&("UNP".to_string(), "P00001".to_string())];
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[0].entity_seq_beg, Some(1));
        assert_eq!(p1[0].entity_align_length(), Some(100));
        assert_eq!(p1[1].entity_seq_beg, Some(400));
        assert_eq!(longest[&("UNP".to_string(), "P00002".to_string())].len(), 1);
    }

    #[test]
    fn test_parse_uniprot_skips_bad_ranges() {
        let src = source_dir();
        let index = parse_uniprot(&src.path().join(UNIPROT_FILE)).unwrap();
        assert!(!index.contains_key("2BAD"));
        assert_eq!(index["1ABC"]["A"].unp_ids, ["P00001"]);
        assert_eq!(index["1ABC"]["A"].alignments[0].unp_end, Some(24));
    }

    #[test]
    fn test_id_type_names() {
        assert_eq!("pfamid".parse::<SiftsIdType>(), Ok(SiftsIdType::Pfam));
        assert!("UNPAL".parse::<SiftsIdType>().is_err());
        assert_eq!("Prod".parse::<AbbreviationLevel>(), Ok(AbbreviationLevel::Prod));
        assert_eq!(AbbreviationLevel::Prod.source_files().len(), 4);
    }
}
