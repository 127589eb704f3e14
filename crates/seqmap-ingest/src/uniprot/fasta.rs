//! UniProt FASTA parsing
//!
//! ```text
//! >sp|P69905|HBA_HUMAN Hemoglobin subunit alpha OS=Homo sapiens OX=9606 GN=HBA1 PE=1 SV=2
//! MVLSPADKTNVKAAWGKVGAHAGEYGAEALERMFLSFPTTKTYFPHFDLSHGSAQVKGHGKKVADALTNAVAHV
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FastaError {
    #[error("Line {line}: sequence data before any header")]
    MissingHeader { line: usize },

    #[error("Line {line}: malformed header '{header}'")]
    InvalidHeader { line: usize, header: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FastaHeader {
    /// `sp`, `tr` or empty for non-UniProt headers
    pub db: String,
    pub accession: String,
    pub entry_name: Option<String>,
    pub description: String,
    pub organism: Option<String>,
    pub taxonomy_id: Option<i64>,
    pub gene: Option<String>,
    pub protein_existence: Option<u8>,
    pub sequence_version: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastaRecord {
    pub header: FastaHeader,
    pub sequence: String,
}

/// Keep letters only, upper-cased
pub fn clean_sequence(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

const TAGS: [&str; 5] = ["OS=", "OX=", "GN=", "PE=", "SV="];

/// Parse one header line (with or without the leading `>`)
pub fn parse_header(line: &str) -> Option<FastaHeader> {
    let line = line.trim().trim_start_matches('>');
    let (id_part, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    if id_part.is_empty() {
        return None;
    }

    let mut header = FastaHeader::default();
    let fields: Vec<&str> = id_part.split('|').collect();
    match fields.as_slice() {
        [db, acc, name] => {
            header.db = db.to_string();
            header.accession = acc.to_string();
            header.entry_name = Some(name.to_string());
        },
        [db, acc] => {
            header.db = db.to_string();
            header.accession = acc.to_string();
        },
        [acc] => header.accession = acc.to_string(),
        _ => return None,
    }
    if header.accession.is_empty() {
        return None;
    }

    // Tagged fields follow the free-text description
    let mut positions: Vec<(usize, &str)> = TAGS
        .iter()
        .filter_map(|tag| find_tag(rest, tag).map(|pos| (pos, *tag)))
        .collect();
    positions.sort();

    let desc_end = positions.first().map(|(pos, _)| *pos).unwrap_or(rest.len());
    header.description = rest[..desc_end].trim().to_string();

    for (i, (pos, tag)) in positions.iter().enumerate() {
        let end = positions.get(i + 1).map(|(p, _)| *p).unwrap_or(rest.len());
        let value = rest[pos + tag.len()..end].trim();
        match *tag {
            "OS=" => header.organism = Some(value.to_string()),
            "OX=" => header.taxonomy_id = value.parse().ok(),
            "GN=" => header.gene = Some(value.to_string()),
            "PE=" => header.protein_existence = value.parse().ok(),
            "SV=" => header.sequence_version = value.parse().ok(),
            _ => {},
        }
    }

    Some(header)
}

/// Tag positions at the start of the text or after a space
fn find_tag(text: &str, tag: &str) -> Option<usize> {
    if text.starts_with(tag) {
        return Some(0);
    }
    text.find(&format!(" {}", tag)).map(|pos| pos + 1)
}

/// Parse a multi-record FASTA document
pub fn parse_fasta(text: &str) -> Result<Vec<FastaRecord>, FastaError> {
    let mut records = Vec::new();
    let mut current: Option<FastaRecord> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('>') {
            if let Some(done) = current.take() {
                records.push(done);
            }
            let header = parse_header(trimmed).ok_or_else(|| FastaError::InvalidHeader {
                line: line_no,
                header: trimmed.to_string(),
            })?;
            current = Some(FastaRecord {
                header,
                sequence: String::new(),
            });
        } else {
            let record = current
                .as_mut()
                .ok_or(FastaError::MissingHeader { line: line_no })?;
            record.sequence.push_str(&clean_sequence(trimmed));
        }
    }

    if let Some(done) = current {
        records.push(done);
    }
    Ok(records)
}

/// Cleaned sequences keyed by accession
pub fn sequences_by_accession(text: &str) -> Result<BTreeMap<String, String>, FastaError> {
    Ok(parse_fasta(text)?
        .into_iter()
        .map(|r| (r.header.accession, r.sequence))
        .collect())
}
