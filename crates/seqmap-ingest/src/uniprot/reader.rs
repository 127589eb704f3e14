//! UniProt XML entry parser
//!
//! Reads `<uniprot><entry>...</entry></uniprot>` documents as returned by
//! both the UniProt REST service and the EBI Proteins API. Registered
//! variant ids (e.g. `P42284-3`) produce extra records carrying the isoform
//! sequence, rebuilt from the entry's splice variant features:
//!
//! ```xml
//! <isoform>
//!   <id>P42284-3</id>
//!   <name>H</name>
//!   <sequence type="described" ref="VSP_015404 VSP_015406"/>
//! </isoform>
//! <feature type="splice variant" id="VSP_015404" description="In isoform H.">
//!   <original>DVSTNQ</original>
//!   <variation>DEAGQN</variation>
//!   <location><begin position="455"/><end position="460"/></location>
//! </feature>
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid UniProt XML: {0}")]
    Xml(#[from] quick_xml::DeError),
}

pub type Result<T> = std::result::Result<T, ReaderError>;

// ============================================================================
// Parsed record
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: String,
    pub keyword: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProteinName {
    pub name: String,
    pub is_abbrev: bool,
    /// `recommendedName`, `alternativeName` or `submittedName`
    pub name_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneName {
    pub name: String,
    /// `primary`, `synonym`, `ordered locus` or `ORF`
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbReference {
    pub resource: String,
    pub id_code: String,
    pub evidence: Option<String>,
    /// `<property type=.. value=..>` children, kept for EMBL, GO, RefSeq,
    /// Pfam, InterPro and Ensembl references
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: String,
    pub feature_id: Option<String>,
    pub reference: Option<String>,
    pub description: Option<String>,
    pub evidence: Option<String>,
    pub position: Option<i64>,
    pub begin: Option<i64>,
    pub end: Option<i64>,
    pub original: Option<String>,
    pub variation: Option<String>,
}

/// One splice variant applied to build an isoform sequence (1-based, inclusive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpliceEdit {
    pub id: String,
    pub begin: usize,
    pub end: usize,
    pub variation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UniProtRecord {
    /// `Swiss-Prot` or `TrEMBL`
    pub db_name: String,
    pub version: String,
    pub modification_date: String,
    pub db_code: Option<String>,
    pub db_accession: String,
    pub accessions: Vec<String>,
    pub sequence: Option<String>,
    pub keywords: Vec<Keyword>,
    pub names: Vec<ProteinName>,
    pub gene: Vec<GeneName>,
    pub source_scientific: Option<String>,
    pub source_common: Option<String>,
    pub taxonomy_id: Option<i64>,
    pub taxonomy_evc: Option<String>,
    pub host_source_scientific: Option<String>,
    pub host_source_common: Option<String>,
    pub host_taxonomy_id: Option<i64>,
    pub comments: Vec<Comment>,
    pub db_references: Vec<DbReference>,
    /// evidence key -> ECO code
    pub evidence: BTreeMap<String, String>,
    pub features: Vec<Feature>,
    pub db_isoform: Option<String>,
    pub isoform_names: Vec<String>,
    pub isoform_edits: Vec<SpliceEdit>,
    pub isoform_sequence_updated: Option<bool>,
}

// ============================================================================
// XML document model
// ============================================================================

#[derive(Debug, Deserialize)]
struct XmlUniProt {
    #[serde(rename = "entry", default)]
    entries: Vec<XmlEntry>,
}

#[derive(Debug, Deserialize)]
struct XmlText {
    #[serde(rename = "@evidence")]
    evidence: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct XmlTypedText {
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct XmlEntry {
    #[serde(rename = "@dataset", default)]
    dataset: String,
    #[serde(rename = "@modified", default)]
    modified: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "accession", default)]
    accessions: Vec<String>,
    name: Option<String>,
    protein: Option<XmlProtein>,
    #[serde(rename = "gene", default)]
    genes: Vec<XmlGene>,
    organism: Option<XmlOrganism>,
    #[serde(rename = "organismHost", default)]
    organism_hosts: Vec<XmlOrganism>,
    #[serde(rename = "comment", default)]
    comments: Vec<XmlComment>,
    #[serde(rename = "dbReference", default)]
    db_references: Vec<XmlDbReference>,
    #[serde(rename = "keyword", default)]
    keywords: Vec<XmlKeyword>,
    #[serde(rename = "feature", default)]
    features: Vec<XmlFeature>,
    #[serde(rename = "evidence", default)]
    evidence: Vec<XmlEvidence>,
    sequence: Option<XmlSequence>,
}

#[derive(Debug, Deserialize)]
struct XmlProtein {
    #[serde(rename = "recommendedName")]
    recommended: Option<XmlNameGroup>,
    #[serde(rename = "alternativeName", default)]
    alternative: Vec<XmlNameGroup>,
    #[serde(rename = "submittedName", default)]
    submitted: Vec<XmlNameGroup>,
}

#[derive(Debug, Deserialize)]
struct XmlNameGroup {
    #[serde(rename = "fullName")]
    full_name: Option<XmlText>,
    #[serde(rename = "shortName", default)]
    short_names: Vec<XmlText>,
}

#[derive(Debug, Deserialize)]
struct XmlGene {
    #[serde(rename = "name", default)]
    names: Vec<XmlTypedText>,
}

#[derive(Debug, Deserialize)]
struct XmlOrganism {
    #[serde(rename = "name", default)]
    names: Vec<XmlTypedText>,
    #[serde(rename = "dbReference", default)]
    db_references: Vec<XmlDbReference>,
}

#[derive(Debug, Deserialize)]
struct XmlComment {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "text", default)]
    texts: Vec<XmlText>,
    #[serde(rename = "isoform", default)]
    isoforms: Vec<XmlIsoform>,
}

#[derive(Debug, Deserialize)]
struct XmlIsoform {
    #[serde(rename = "id", default)]
    ids: Vec<String>,
    #[serde(rename = "name", default)]
    names: Vec<XmlText>,
    sequence: Option<XmlIsoformSequence>,
}

#[derive(Debug, Deserialize)]
struct XmlIsoformSequence {
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "@ref")]
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlDbReference {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "@key")]
    key: Option<String>,
    #[serde(rename = "@evidence")]
    evidence: Option<String>,
    #[serde(rename = "property", default)]
    properties: Vec<XmlProperty>,
}

#[derive(Debug, Deserialize)]
struct XmlProperty {
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "@value")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlKeyword {
    #[serde(rename = "@id", default)]
    id: String,
    #[serde(rename = "$text", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct XmlFeature {
    #[serde(rename = "@type", default)]
    kind: String,
    #[serde(rename = "@id")]
    id: Option<String>,
    #[serde(rename = "@ref")]
    reference: Option<String>,
    #[serde(rename = "@description")]
    description: Option<String>,
    #[serde(rename = "@evidence")]
    evidence: Option<String>,
    original: Option<String>,
    #[serde(rename = "variation", default)]
    variations: Vec<String>,
    location: Option<XmlLocation>,
}

#[derive(Debug, Deserialize)]
struct XmlLocation {
    begin: Option<XmlPosition>,
    end: Option<XmlPosition>,
    position: Option<XmlPosition>,
}

#[derive(Debug, Deserialize)]
struct XmlPosition {
    #[serde(rename = "@position")]
    position: Option<String>,
}

impl XmlPosition {
    fn value(pos: &Option<XmlPosition>) -> Option<i64> {
        pos.as_ref()?.position.as_deref()?.trim().parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct XmlEvidence {
    #[serde(rename = "@type")]
    kind: Option<String>,
    #[serde(rename = "@key")]
    key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct XmlSequence {
    #[serde(rename = "$text", default)]
    value: String,
}

// ============================================================================
// Reader
// ============================================================================

/// Isoform description taken from the "alternative products" comment
#[derive(Debug, Clone)]
struct IsoformInfo {
    kind: String,
    names: Vec<String>,
    refs: Option<String>,
}

#[derive(Debug, Default)]
pub struct UniProtReader {
    /// variant id -> accession
    variants: BTreeMap<String, String>,
}

impl UniProtReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a variant id (e.g. `P42284-3`) for an accession
    pub fn add_variant(&mut self, accession: &str, variant_id: &str) {
        self.variants.insert(variant_id.to_string(), accession.to_string());
    }

    pub fn read_file(&self, path: &Path) -> Result<BTreeMap<String, UniProtRecord>> {
        let text = std::fs::read_to_string(path)?;
        self.read_str(&text)
    }

    /// Records keyed by primary accession, plus one per matched variant id
    pub fn read_str(&self, xml: &str) -> Result<BTreeMap<String, UniProtRecord>> {
        let doc: XmlUniProt = quick_xml::de::from_str(xml)?;
        let mut records = BTreeMap::new();

        for entry in doc.entries {
            let isoforms = isoform_index(&entry);
            let splices = splice_index(&entry);
            let Some(record) = convert_entry(entry) else {
                warn!("Skipping UniProt entry without accession");
                continue;
            };

            if record.sequence.is_some() {
                for variant_id in self.variants_of(&record.db_accession) {
                    if let Some(variant) = apply_isoform(&record, variant_id, &isoforms, &splices) {
                        records.insert(variant_id.to_string(), variant);
                    } else {
                        debug!("No isoform {} in entry {}", variant_id, record.db_accession);
                    }
                }
            }
            records.insert(record.db_accession.clone(), record);
        }

        Ok(records)
    }

    fn variants_of<'a>(&'a self, accession: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.variants
            .iter()
            .filter(move |(_, acc)| acc.as_str() == accession)
            .map(|(var, _)| var.as_str())
    }
}

fn strip_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn convert_entry(entry: XmlEntry) -> Option<UniProtRecord> {
    let db_accession = entry.accessions.first()?.trim().to_string();

    let mut record = UniProtRecord {
        db_name: entry.dataset,
        version: entry.version,
        modification_date: entry.modified,
        db_code: entry.name,
        db_accession,
        accessions: entry.accessions.iter().map(|a| a.trim().to_string()).collect(),
        sequence: entry.sequence.map(|s| strip_whitespace(&s.value)),
        ..Default::default()
    };

    if let Some(protein) = entry.protein {
        let groups = protein
            .recommended
            .into_iter()
            .map(|g| ("recommendedName", g))
            .chain(protein.alternative.into_iter().map(|g| ("alternativeName", g)))
            .chain(protein.submitted.into_iter().map(|g| ("submittedName", g)));
        for (name_type, group) in groups {
            let full = group.full_name.into_iter().map(|t| (t, false));
            let short = group.short_names.into_iter().map(|t| (t, true));
            for (text, is_abbrev) in full.chain(short) {
                record.names.push(ProteinName {
                    name: text.value.trim().to_string(),
                    is_abbrev,
                    name_type: name_type.to_string(),
                });
            }
        }
    }

    for gene in entry.genes {
        for name in gene.names {
            record.gene.push(GeneName {
                name: name.value.trim().to_string(),
                kind: name.kind.unwrap_or_default(),
            });
        }
    }

    if let Some(organism) = entry.organism {
        for name in organism.names {
            match name.kind.as_deref() {
                Some("scientific") => record.source_scientific = Some(name.value),
                Some("common") => record.source_common = Some(name.value),
                _ => {},
            }
        }
        if let Some(taxon) = organism.db_references.iter().find(|r| r.kind == "NCBI Taxonomy") {
            record.taxonomy_id = taxon.id.trim().parse().ok();
            record.taxonomy_evc = taxon.key.clone().or_else(|| taxon.evidence.clone());
        }
    }

    for host in entry.organism_hosts {
        for name in host.names {
            match name.kind.as_deref() {
                Some("scientific") => record.host_source_scientific = Some(name.value),
                Some("common") => record.host_source_common = Some(name.value),
                _ => {},
            }
        }
        if let Some(taxon) = host.db_references.iter().find(|r| r.kind == "NCBI Taxonomy") {
            record.host_taxonomy_id = taxon.id.trim().parse().ok();
        }
    }

    for comment in entry.comments {
        if comment.kind == "online information" {
            continue;
        }
        if let Some(text) = comment.texts.into_iter().next() {
            record.comments.push(Comment {
                kind: comment.kind,
                text: text.value,
                evidence: text.evidence,
            });
        }
    }

    for db_ref in entry.db_references {
        let keep_properties = matches!(db_ref.kind.as_str(), "EMBL" | "GO" | "RefSeq" | "Pfam" | "InterPro")
            || db_ref.kind.to_uppercase().starts_with("ENSEMBL");
        if !keep_properties && !matches!(db_ref.kind.as_str(), "EC" | "PIR") {
            continue;
        }
        let properties = if keep_properties {
            db_ref
                .properties
                .into_iter()
                .filter_map(|p| Some((p.kind?, p.value?)))
                .collect()
        } else {
            BTreeMap::new()
        };
        record.db_references.push(DbReference {
            resource: db_ref.kind,
            id_code: db_ref.id,
            evidence: db_ref.evidence,
            properties,
        });
    }

    record.keywords = entry
        .keywords
        .into_iter()
        .map(|k| Keyword {
            id: k.id,
            keyword: k.value,
        })
        .collect();

    for ev in entry.evidence {
        if let (Some(key), Some(kind)) = (ev.key, ev.kind) {
            record.evidence.entry(key).or_insert(kind);
        }
    }

    record.features = entry.features.into_iter().map(convert_feature).collect();
    Some(record)
}

fn convert_feature(f: XmlFeature) -> Feature {
    let mut feature = Feature {
        kind: f.kind,
        feature_id: f.id,
        reference: f.reference,
        description: f.description,
        evidence: f.evidence,
        original: f.original.map(|s| strip_whitespace(&s)),
        variation: f.variations.last().map(|s| strip_whitespace(s)),
        ..Default::default()
    };
    if let Some(loc) = f.location {
        let position = XmlPosition::value(&loc.position);
        let (begin, end) = (XmlPosition::value(&loc.begin), XmlPosition::value(&loc.end));
        if position.is_some() {
            feature.position = position;
        } else if begin.is_some() && end.is_some() {
            feature.begin = begin;
            feature.end = end;
        }
    }
    feature
}

fn isoform_index(entry: &XmlEntry) -> BTreeMap<String, IsoformInfo> {
    let mut index = BTreeMap::new();
    for iso in entry.comments.iter().flat_map(|c| c.isoforms.iter()) {
        let (Some(id), Some(kind)) = (iso.ids.first(), iso.sequence.as_ref().and_then(|s| s.kind.clone())) else {
            continue;
        };
        index.insert(
            id.trim().to_string(),
            IsoformInfo {
                kind,
                names: iso.names.iter().map(|n| n.value.clone()).collect(),
                refs: iso.sequence.as_ref().and_then(|s| s.reference.clone()),
            },
        );
    }
    index
}

fn splice_index(entry: &XmlEntry) -> BTreeMap<String, SpliceEdit> {
    let mut index = BTreeMap::new();
    for f in entry.features.iter().filter(|f| f.kind == "splice variant") {
        let Some(id) = f.id.as_ref() else { continue };
        let Some(loc) = f.location.as_ref() else { continue };
        let (Some(begin), Some(end)) = (XmlPosition::value(&loc.begin), XmlPosition::value(&loc.end)) else {
            continue;
        };
        if begin < 1 || end < begin {
            continue;
        }
        index.insert(
            id.clone(),
            SpliceEdit {
                id: id.clone(),
                begin: begin as usize,
                end: end as usize,
                variation: f.variations.last().map(|s| strip_whitespace(s)),
            },
        );
    }
    index
}

/// `seq[..begin-1] + variation + seq[end..]`
fn splice(seq: &str, edit: &SpliceEdit) -> String {
    let head_end = (edit.begin - 1).min(seq.len());
    let tail_start = edit.end.min(seq.len());
    let mut out = String::with_capacity(seq.len());
    out.push_str(&seq[..head_end]);
    if let Some(variation) = &edit.variation {
        out.push_str(variation);
    }
    out.push_str(&seq[tail_start..]);
    out
}

/// Build the record for one isoform, or `None` when the entry lacks it.
/// Edits run from the C-terminus backwards so earlier positions stay valid.
fn apply_isoform(
    record: &UniProtRecord,
    variant_id: &str,
    isoforms: &BTreeMap<String, IsoformInfo>,
    splices: &BTreeMap<String, SpliceEdit>,
) -> Option<UniProtRecord> {
    let info = isoforms.get(variant_id)?;
    let mut variant = record.clone();
    variant.db_isoform = Some(variant_id.to_string());
    variant.isoform_names = info.names.clone();
    variant.isoform_sequence_updated = Some(false);

    let refs = match info.refs.as_deref() {
        Some(refs) if info.kind != "displayed" && !splices.is_empty() => refs,
        _ => return Some(variant),
    };

    let mut sequence = variant.sequence.take().unwrap_or_default();
    for ref_id in refs.split_whitespace().rev() {
        if let Some(edit) = splices.get(ref_id) {
            sequence = splice(&sequence, edit);
            variant.isoform_edits.push(edit.clone());
        }
    }
    variant.sequence = Some(sequence);
    variant.isoform_sequence_updated = Some(true);
    Some(variant)
}
