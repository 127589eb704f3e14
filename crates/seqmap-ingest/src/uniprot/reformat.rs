//! Reformat parsed UniProt records into exchange documents
//!
//! Exchange documents are the JSON objects consumed by the downstream
//! loader. Evidence keys are resolved through each record's evidence map;
//! assertions without evidence carry the default provenance code.

use super::reader::{Feature, UniProtRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::warn;

/// Inferred from experiment in the same entry
pub const DEFAULT_PROVENANCE: &str = "ECO:0000323";

/// Feature types carried into exchange documents
pub const FEATURE_TYPES: [&str; 39] = [
    "ACTIVE_SITE",
    "BINDING_SITE",
    "CALCIUM_BINDING_REGION",
    "CHAIN",
    "COILED_COIL_REGION",
    "COMPOSITIONALLY_BIASED_REGION",
    "CROSS_LINK",
    "DISULFIDE_BOND",
    "DNA_BINDING_REGION",
    "DOMAIN",
    "GLYCOSYLATION_SITE",
    "HELIX",
    "INITIATOR_METHIONINE",
    "LIPID_MOIETY_BINDING_REGION",
    "METAL_ION_BINDING_SITE",
    "MODIFIED_RESIDUE",
    "MUTAGENESIS_SITE",
    "NON_CONSECUTIVE_RESIDUES",
    "NON_TERMINAL_RESIDUE",
    "NUCLEOTIDE_PHOSPHATE_BINDING_REGION",
    "PEPTIDE",
    "PROPEPTIDE",
    "REGION_OF_INTEREST",
    "REPEAT",
    "NON_STANDARD_AMINO_ACID",
    "SEQUENCE_CONFLICT",
    "SEQUENCE_VARIANT",
    "SHORT_SEQUENCE_MOTIF",
    "SIGNAL_PEPTIDE",
    "SITE",
    "SPLICE_VARIANT",
    "STRAND",
    "TOPOLOGICAL_DOMAIN",
    "TRANSIT_PEPTIDE",
    "TRANSMEMBRANE_REGION",
    "TURN",
    "UNSURE_RESIDUE",
    "ZINC_FINGER_REGION",
    "INTRAMEMBRANE_REGION",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExchangeFormat {
    #[default]
    Exchange,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerIdentifiers {
    pub uniprot_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pfam_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub go_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ensembl_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordValue {
    pub id: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenancedValue {
    pub value: String,
    pub provenance_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneNameValue {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gene {
    pub name: Vec<GeneNameValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub details: String,
    pub provenance_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOrganism {
    pub scientific_name: String,
    pub taxonomy_id: i64,
    pub provenance_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcNumber {
    pub number: String,
    pub provenance_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Protein {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<ProvenancedValue>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub gene: Vec<Gene>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<Function>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_organism: Option<SourceOrganism>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ec: Vec<EcNumber>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRange {
    pub beg_seq_id: i64,
    pub end_seq_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePosition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comp_id: Option<String>,
    pub seq_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeFeature {
    #[serde(rename = "type")]
    pub kind: String,
    pub assignment_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance_code: Option<String>,
    pub reference_scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub feature_ranges: Vec<FeatureRange>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub feature_positions: Vec<FeaturePosition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub rcsb_id: String,
    pub rcsb_uniprot_container_identifiers: ContainerIdentifiers,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rcsb_uniprot_accession: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rcsb_uniprot_entry_name: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rcsb_uniprot_keyword: Vec<KeywordValue>,
    pub rcsb_uniprot_protein: Protein,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rcsb_uniprot_feature: Vec<ExchangeFeature>,
}

/// Features sharing these fields collapse into one exchange feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct FeatureLabel {
    kind: String,
    description: Option<String>,
    id: Option<String>,
    evidence: Option<String>,
    reference: Option<String>,
    original: Option<String>,
    variation: Option<String>,
}

impl FeatureLabel {
    fn of(f: &Feature) -> Self {
        Self {
            kind: f.kind.to_uppercase().replace(' ', "_"),
            description: f.description.clone(),
            id: f.feature_id.clone(),
            evidence: f.evidence.clone(),
            reference: f.reference.clone(),
            original: f.original.clone(),
            variation: f.variation.clone(),
        }
    }
}

/// Reformat records keyed by UniProt id
pub fn reformat(records: &BTreeMap<String, UniProtRecord>, format: ExchangeFormat) -> BTreeMap<String, ExchangeRecord> {
    match format {
        ExchangeFormat::Exchange => records
            .iter()
            .map(|(id, record)| (id.clone(), to_exchange(id, record)))
            .collect(),
    }
}

fn resolve<'a>(evidence: &'a BTreeMap<String, String>, key: Option<&str>) -> &'a str {
    key.filter(|k| !k.is_empty())
        .and_then(|k| evidence.get(k))
        .map(String::as_str)
        .unwrap_or(DEFAULT_PROVENANCE)
}

pub fn to_exchange(id: &str, record: &UniProtRecord) -> ExchangeRecord {
    let ev = &record.evidence;
    let mut out = ExchangeRecord {
        rcsb_id: id.to_string(),
        rcsb_uniprot_container_identifiers: ContainerIdentifiers {
            uniprot_id: id.to_string(),
            ..Default::default()
        },
        rcsb_uniprot_accession: record.accessions.clone(),
        rcsb_uniprot_entry_name: record.db_code.iter().cloned().collect(),
        rcsb_uniprot_keyword: record
            .keywords
            .iter()
            .map(|k| KeywordValue {
                id: k.id.clone(),
                value: k.keyword.clone(),
            })
            .collect(),
        ..Default::default()
    };

    let protein = &mut out.rcsb_uniprot_protein;
    protein.sequence = record.sequence.clone();
    protein.name = record
        .names
        .iter()
        .find(|n| n.name_type == "recommendedName" && !n.is_abbrev)
        .map(|n| ProvenancedValue {
            value: n.name.clone(),
            provenance_code: DEFAULT_PROVENANCE.to_string(),
        });

    if !record.gene.is_empty() {
        protein.gene.push(Gene {
            name: record
                .gene
                .iter()
                .map(|g| GeneNameValue {
                    kind: g.kind.to_uppercase().replace(' ', "_"),
                    value: g.name.clone(),
                })
                .collect(),
        });
    }

    // Last function comment wins
    protein.function = record
        .comments
        .iter()
        .rfind(|c| c.kind == "function")
        .map(|c| Function {
            details: c.text.clone(),
            provenance_code: resolve(ev, c.evidence.as_deref()).to_string(),
        });

    if let (Some(name), Some(tax_id)) = (&record.source_scientific, record.taxonomy_id) {
        protein.source_organism = Some(SourceOrganism {
            scientific_name: name.clone(),
            taxonomy_id: tax_id,
            provenance_code: resolve(ev, record.taxonomy_evc.as_deref()).to_string(),
        });
    }

    let mut pfam = BTreeSet::new();
    let mut go = BTreeSet::new();
    let mut ensembl = BTreeSet::new();
    let mut ec: BTreeMap<String, String> = BTreeMap::new();
    for db_ref in &record.db_references {
        let code = resolve(ev, db_ref.evidence.as_deref());
        match db_ref.resource.as_str() {
            "EC" => {
                ec.insert(db_ref.id_code.clone(), code.to_string());
            },
            "Pfam" => {
                pfam.insert(db_ref.id_code.clone());
            },
            "GO" => {
                go.insert(db_ref.id_code.clone());
            },
            r if r.to_uppercase().starts_with("ENSEMB") => {
                ensembl.insert(db_ref.id_code.clone());
            },
            _ => {},
        }
    }
    let ids = &mut out.rcsb_uniprot_container_identifiers;
    ids.pfam_ids = (!pfam.is_empty()).then(|| pfam.into_iter().collect());
    ids.go_ids = (!go.is_empty()).then(|| go.into_iter().collect());
    ids.ensembl_ids = (!ensembl.is_empty()).then(|| ensembl.into_iter().collect());
    out.rcsb_uniprot_protein.ec = ec
        .into_iter()
        .map(|(number, provenance_code)| EcNumber { number, provenance_code })
        .collect();

    out.rcsb_uniprot_feature = exchange_features(record);
    out
}

fn exchange_features(record: &UniProtRecord) -> Vec<ExchangeFeature> {
    // Groups keep first-seen order; the map points each label at its group
    let mut grouped: Vec<(FeatureLabel, Vec<&Feature>)> = Vec::new();
    let mut slots: HashMap<FeatureLabel, usize> = HashMap::new();
    for f in &record.features {
        let label = FeatureLabel::of(f);
        match slots.get(&label) {
            Some(&slot) => grouped[slot].1.push(f),
            None => {
                slots.insert(label.clone(), grouped.len());
                grouped.push((label, vec![f]));
            },
        }
    }

    let assignment_version = format!("{}_{}", record.db_name, record.version);
    let mut seen = HashSet::new();
    let mut features = Vec::new();

    for (label, members) in grouped {
        if !FEATURE_TYPES.contains(&label.kind.as_str()) {
            continue;
        }

        let provenance_code = label.evidence.as_deref().and_then(|keys| {
            let codes: Option<Vec<&str>> = keys
                .split_whitespace()
                .map(|k| record.evidence.get(k).map(String::as_str))
                .collect();
            if codes.is_none() {
                warn!("Unresolved evidence '{}' in {}", keys, record.db_accession);
            }
            codes.map(|c| c.join(","))
        });

        let mut description = label.description.clone().unwrap_or_default();
        if let (Some(original), Some(variation)) = (&label.original, &label.variation) {
            description.push_str(&format!(" ({} -> {})", original, variation));
        }

        let mut feature = ExchangeFeature {
            kind: label.kind.clone(),
            assignment_version: assignment_version.clone(),
            feature_id: label.id.clone(),
            provenance_code,
            reference_scheme: "UniProt".to_string(),
            description: (!description.is_empty()).then_some(description),
            feature_ranges: Vec::new(),
            feature_positions: Vec::new(),
        };

        for f in members {
            if let (Some(beg), Some(end)) = (f.begin, f.end) {
                feature.feature_ranges.push(FeatureRange {
                    beg_seq_id: beg,
                    end_seq_id: end,
                });
            } else if let Some(pos) = f.position {
                feature.feature_positions.push(FeaturePosition {
                    comp_id: label.original.clone(),
                    seq_id: pos,
                });
            }
        }

        let key = serde_json::to_string(&feature).unwrap_or_default();
        if seen.insert(key) {
            features.push(feature);
        }
    }
    features
}
