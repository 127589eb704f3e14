//! UniProt web service client
//!
//! Entries are requested in chunks from the UniProt REST service. A chunk
//! that fails there is retried on the EBI Proteins API. Chunk failures are
//! logged and skipped so one bad batch never loses the rest of the list.

use super::config::UniProtConfig;
use super::fasta::{clean_sequence, parse_header, FastaHeader};
use super::reader::{UniProtReader, UniProtRecord};
use crate::fetch::Fetcher;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, error, info, warn};

const XML: &str = "application/xml";
const FASTA: &str = "text/x-fasta";
const TEXT: &str = "text/plain";

/// How a requested id was found among the fetched records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    /// The search id is a primary accession
    Primary,
    /// The search id is a secondary accession of some entry
    Secondary,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub search_id: String,
    pub matched: MatchKind,
    /// primary accession -> taxonomy id
    pub matched_ids: BTreeMap<String, Option<i64>>,
}

/// FASTA sequence with its parsed header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceResult {
    pub header: FastaHeader,
    pub sequence: String,
}

pub type RecordMap = BTreeMap<String, UniProtRecord>;
pub type MatchMap = BTreeMap<String, MatchResult>;

/// Split variant ids (`P42284-3`) from their searchable accession.
/// Returns the search id for each input, in input order, plus
/// `variant id -> accession`.
pub fn process_id_list(ids: &[String]) -> (Vec<String>, BTreeMap<String, String>) {
    let mut search_ids = Vec::with_capacity(ids.len());
    let mut variants = BTreeMap::new();
    for id in ids {
        match id.split_once('-') {
            Some((acc, _)) => {
                variants.insert(id.clone(), acc.to_string());
                search_ids.push(acc.to_string());
            },
            None => search_ids.push(id.clone()),
        }
    }
    (search_ids, variants)
}

/// Classify every input id against the fetched records
pub fn rebuild_match_index(ids: &[String], records: &RecordMap) -> MatchMap {
    let (search_ids, _) = process_id_list(ids);
    let mut matches = BTreeMap::new();

    for (input_id, search_id) in ids.iter().zip(search_ids) {
        if matches.contains_key(input_id) {
            continue;
        }
        let mut result = MatchResult {
            search_id: search_id.clone(),
            matched: MatchKind::None,
            matched_ids: BTreeMap::new(),
        };

        if let Some(record) = records.get(&search_id) {
            result.matched = MatchKind::Primary;
            result.matched_ids.insert(search_id, record.taxonomy_id);
        } else {
            for record in records.values().filter(|r| r.accessions.contains(&search_id)) {
                let tax_id = records.get(&record.db_accession).and_then(|r| r.taxonomy_id);
                result.matched_ids.insert(record.db_accession.clone(), tax_id);
                result.matched = MatchKind::Secondary;
            }
        }
        matches.insert(input_id.clone(), result);
    }
    matches
}

pub struct UniProtClient {
    config: UniProtConfig,
    fetcher: Fetcher,
    saved_text: Vec<String>,
}

impl UniProtClient {
    pub fn new(config: UniProtConfig, fetcher: Fetcher) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid UniProt configuration: {}", e))?;
        Ok(Self {
            config,
            fetcher,
            saved_text: Vec::new(),
        })
    }

    pub fn config(&self) -> &UniProtConfig {
        &self.config
    }

    /// Fetch and parse the entries for `ids`.
    ///
    /// Variant ids are fetched through their accession and returned under
    /// the variant id with the isoform sequence applied.
    pub async fn fetch_list(&mut self, ids: &[String], use_primary: bool, retry_alt: bool) -> (RecordMap, MatchMap) {
        if self.config.save_text {
            self.saved_text.clear();
        }
        let mut records = RecordMap::new();

        let (search_ids, variants) = process_id_list(ids);
        debug!(?search_ids, ?variants, "Processed UniProt id list");
        if search_ids.is_empty() {
            return (records, MatchMap::new());
        }

        let mut seen = BTreeSet::new();
        let unique: Vec<String> = search_ids.into_iter().filter(|id| seen.insert(id.clone())).collect();

        let mut reader = UniProtReader::new();
        for (variant_id, acc) in &variants {
            reader.add_variant(acc, variant_id);
        }

        let chunks: Vec<&[String]> = unique.chunks(self.config.max_chunk_size).collect();
        for (idx, chunk) in chunks.iter().enumerate() {
            debug!("Fetching UniProt chunk {}/{} ({} ids)", idx + 1, chunks.len(), chunk.len());
            let xml = match self.request_entries(chunk, use_primary, retry_alt).await {
                Ok(xml) => xml,
                Err(e) => {
                    error!("UniProt chunk {} failed: {:#}", idx + 1, e);
                    continue;
                },
            };
            if xml.starts_with("ERROR") {
                info!("UniProt chunk {} returned {:?}", idx + 1, xml.chars().take(80).collect::<String>());
                continue;
            }

            match reader.read_str(&xml) {
                Ok(parsed) if !parsed.is_empty() => records.extend(parsed),
                Ok(_) => warn!("UniProt chunk {} returned no entries", idx + 1),
                Err(e) => error!("UniProt chunk {} has bad XML: {}", idx + 1, e),
            }
            if self.config.save_text {
                self.saved_text.push(xml);
            }
        }

        let matches = rebuild_match_index(ids, &records);
        info!("Fetched {} UniProt records for {} ids", records.len(), ids.len());
        (records, matches)
    }

    async fn request_entries(&self, ids: &[String], use_primary: bool, retry_alt: bool) -> Result<String> {
        let mut last_err = anyhow::anyhow!("No UniProt service enabled");
        if use_primary {
            match self.request_primary(ids).await {
                Ok(text) if !text.is_empty() => return Ok(text),
                Ok(_) => last_err = anyhow::anyhow!("Empty response from primary UniProt service"),
                Err(e) => last_err = e,
            }
        }
        if retry_alt {
            if use_primary {
                info!("Retrying {} ids using secondary service site", ids.len());
            }
            match self.request_secondary(ids).await {
                Ok(text) if !text.is_empty() => return Ok(text),
                Ok(_) => last_err = anyhow::anyhow!("Empty response from secondary UniProt service"),
                Err(e) => last_err = e.context(last_err.to_string()),
            }
        }
        Err(last_err)
    }

    async fn request_primary(&self, ids: &[String]) -> Result<String> {
        let url = format!("{}/uniprotkb/accessions", self.config.primary_url.trim_end_matches('/'));
        let accessions = ids.join(",");
        self.fetcher
            .get_text(&url, &[("accessions", &accessions), ("format", "xml")], XML)
            .await
    }

    async fn request_secondary(&self, ids: &[String]) -> Result<String> {
        let url = format!("{}/proteins/api/proteins", self.config.secondary_url.trim_end_matches('/'));
        let accessions = ids.join(",");
        self.fetcher
            .get_text(&url, &[("size", "-1"), ("accession", &accessions)], XML)
            .await
    }

    /// FASTA sequences keyed by the accession in each response header.
    ///
    /// Ids missing after the primary pass are retried on the secondary
    /// service. The flag is false when any id failed on the last pass.
    pub async fn fetch_sequences(
        &self,
        ids: &[String],
        use_primary: bool,
        retry_alt: bool,
    ) -> (bool, BTreeMap<String, SequenceResult>) {
        let mut ok = false;
        let mut sequences = BTreeMap::new();

        if use_primary {
            let base = self.config.primary_url.trim_end_matches('/');
            ok = self
                .sequence_pass(ids.iter(), |id| format!("{}/uniprotkb/{}.fasta", base, id), &mut sequences)
                .await;
        }

        if retry_alt && !ok {
            let remaining: Vec<&String> = ids.iter().filter(|id| !sequences.contains_key(*id)).collect();
            info!("Retrying using secondary service site for ({}) id codes", remaining.len());
            let base = self.config.secondary_url.trim_end_matches('/');
            ok = self
                .sequence_pass(remaining.into_iter(), |id| format!("{}/proteins/api/proteins/{}", base, id), &mut sequences)
                .await;
        }

        (ok, sequences)
    }

    async fn sequence_pass<'a, I, F>(&self, ids: I, url_for: F, out: &mut BTreeMap<String, SequenceResult>) -> bool
    where
        I: Iterator<Item = &'a String>,
        F: Fn(&str) -> String,
    {
        let mut ok = true;
        for id in ids {
            let url = url_for(id);
            let text = match self.fetcher.get_text(&url, &[], FASTA).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => {
                    debug!("Empty FASTA response for {}", id);
                    ok = false;
                    continue;
                },
                Err(e) => {
                    debug!("FASTA request for {} failed: {:#}", id, e);
                    ok = false;
                    continue;
                },
            };
            match parse_fasta_response(&text) {
                Some(result) => {
                    out.insert(result.header.accession.clone(), result);
                },
                None => error!("Parsing error in sequence data for {}", id),
            }
        }
        ok
    }

    /// Accessions for a gene name within one taxon
    pub async fn gene_lookup(&self, gene: &str, tax_id: i64, reviewed: bool) -> Result<Vec<String>> {
        let mut query = format!("gene:\"{}\" AND taxonomy_id:{}", gene, tax_id);
        if reviewed {
            query.push_str(" AND reviewed:true");
        }
        self.search_list(&query).await
    }

    /// Accessions matching any of `items` in the given search field
    /// (e.g. `gene`, `xref`)
    pub async fn lookup(&self, items: &[String], field: &str) -> Result<Vec<String>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let query = items
            .iter()
            .map(|item| format!("{}:{}", field, item))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.search_list(&query).await
    }

    async fn search_list(&self, query: &str) -> Result<Vec<String>> {
        let url = format!("{}/uniprotkb/search", self.config.primary_url.trim_end_matches('/'));
        let text = self
            .fetcher
            .get_text(&url, &[("query", query), ("format", "list")], TEXT)
            .await
            .with_context(|| format!("UniProt search failed for {}", query))?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Write the XML responses kept from the last `fetch_list`
    pub fn write_xml(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.saved_text.concat())
            .with_context(|| format!("Failed to write UniProt XML to {}", path.display()))
    }
}

fn parse_fasta_response(text: &str) -> Option<SequenceResult> {
    let mut lines = text.lines();
    let header = parse_header(lines.next()?)?;
    let sequence = clean_sequence(&lines.collect::<String>());
    if sequence.is_empty() {
        return None;
    }
    Some(SequenceResult { header, sequence })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(acc: &str, secondary: &[&str], tax: Option<i64>) -> UniProtRecord {
        let mut accessions = vec![acc.to_string()];
        accessions.extend(secondary.iter().map(|s| s.to_string()));
        UniProtRecord {
            db_accession: acc.to_string(),
            accessions,
            taxonomy_id: tax,
            ..Default::default()
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_process_id_list() {
        let (search, variants) = process_id_list(&ids(&["P42284-3", "P69905", "P42284"]));
        assert_eq!(search, ["P42284", "P69905", "P42284"]);
        assert_eq!(variants.len(), 1);
        assert_eq!(variants["P42284-3"], "P42284");
    }

    #[test]
    fn test_match_index() {
        let mut records = RecordMap::new();
        records.insert("P69905".into(), record("P69905", &["P01922", "Q1HDT5"], Some(9606)));
        records.insert("P42284".into(), record("P42284", &[], Some(7227)));

        let input = ids(&["P69905", "Q1HDT5", "P42284-3", "X00000"]);
        let matches = rebuild_match_index(&input, &records);

        assert_eq!(matches["P69905"].matched, MatchKind::Primary);
        assert_eq!(matches["P69905"].matched_ids["P69905"], Some(9606));

        assert_eq!(matches["Q1HDT5"].matched, MatchKind::Secondary);
        assert!(matches["Q1HDT5"].matched_ids.contains_key("P69905"));

        assert_eq!(matches["P42284-3"].search_id, "P42284");
        assert_eq!(matches["P42284-3"].matched, MatchKind::Primary);

        assert_eq!(matches["X00000"].matched, MatchKind::None);
        assert!(matches["X00000"].matched_ids.is_empty());
    }

    #[test]
    fn test_match_kind_serde() {
        assert_eq!(serde_json::to_string(&MatchKind::Secondary).unwrap(), "\"secondary\"");
    }

    #[test]
    fn test_parse_fasta_response() {
        let r = parse_fasta_response(">sp|P12345|X_HUMAN Test OS=Homo sapiens OX=9606\nmkv\nLLA\n").unwrap();
        assert_eq!(r.header.accession, "P12345");
        assert_eq!(r.sequence, "MKVLLA");
        assert!(parse_fasta_response(">sp|P12345|X_HUMAN Test\n").is_none());
    }
}
