//! Sequence alignment segments between a polymer entity and a reference
//! sequence database, and grouping of overlapping segments.

use crate::sifts::SiftsAlignment;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use tracing::warn;

/// One aligned segment. Entity positions are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeqAlign {
    pub entity_seq_beg: Option<i64>,
    pub entity_seq_end: Option<i64>,
    pub entity_align_length: Option<i64>,
    pub db_seq_beg: Option<i64>,
    pub db_seq_end: Option<i64>,
    pub db_name: Option<String>,
    pub db_accession: Option<String>,
    pub db_isoform: Option<String>,
}

impl SeqAlign {
    /// Alignment as recorded in a PDB entry's reference sequence mapping
    #[allow(clippy::too_many_arguments)]
    pub fn from_pdb(
        entity_seq_beg: i64,
        entity_seq_end: i64,
        entity_align_length: Option<i64>,
        db_seq_beg: Option<i64>,
        db_seq_end: Option<i64>,
        db_name: &str,
        db_accession: &str,
        db_isoform: Option<&str>,
    ) -> Self {
        Self {
            entity_seq_beg: Some(entity_seq_beg),
            entity_seq_end: Some(entity_seq_end),
            entity_align_length,
            db_seq_beg,
            db_seq_end,
            db_name: Some(db_name.to_string()),
            db_accession: Some(db_accession.to_string()),
            db_isoform: db_isoform.map(str::to_string),
        }
    }

    /// SIFTS segments carry a start and a length; the database is always UniProt
    pub fn from_sifts(al: &SiftsAlignment) -> Self {
        Self {
            entity_seq_beg: Some(al.beg),
            entity_seq_end: Some(al.beg + al.len - 1),
            entity_align_length: Some(al.len),
            db_seq_beg: al.unp_beg,
            db_seq_end: al.unp_end,
            db_name: Some("UNP".to_string()),
            db_accession: Some(al.unp_id.clone()),
            db_isoform: None,
        }
    }

    /// Half-open range covering the entity positions
    pub fn entity_range(&self) -> Option<Range<i64>> {
        match (self.entity_seq_beg, self.entity_seq_end) {
            (Some(beg), Some(end)) => Some(beg..end + 1),
            _ => None,
        }
    }

    /// Recorded length, or the span of the entity positions
    pub fn entity_align_length(&self) -> Option<i64> {
        match self.entity_align_length {
            Some(len) if len != 0 => Some(len),
            _ => match (self.entity_seq_beg, self.entity_seq_end) {
                (Some(beg), Some(end)) => Some(end - beg + 1),
                _ => None,
            },
        }
    }
}

impl std::fmt::Display for SeqAlign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "DB: {:?} ACC: {:?} ISOFORM {:?} ENTITY BEG: {:?} DB BEG: {:?} LEN: {:?}",
            self.db_name,
            self.db_accession,
            self.db_isoform,
            self.entity_seq_beg,
            self.db_seq_beg,
            self.entity_align_length
        )
    }
}

pub fn ranges_overlap(r1: &Range<i64>, r2: &Range<i64>) -> bool {
    if r1.is_empty() || r2.is_empty() {
        return false;
    }
    r1.start < r2.end && r2.start < r1.end
}

/// Positions shared by two ranges. The upper bound `min(end)` is included,
/// so adjacent ranges report one extra position.
pub fn range_overlap(r1: &Range<i64>, r2: &Range<i64>) -> BTreeSet<i64> {
    if !ranges_overlap(r1, r2) {
        return BTreeSet::new();
    }
    (r1.start.max(r2.start)..=r1.end.min(r2.end)).collect()
}

/// Split alignments into groups (keyed from 1) whose members overlap.
///
/// Longest segments are placed first; each later segment joins the first
/// group holding a segment it overlaps, otherwise it opens a new group.
/// Segments without entity positions are dropped.
pub fn split_seq_align_list(alignments: &[SeqAlign]) -> BTreeMap<usize, Vec<SeqAlign>> {
    let mut ranged: Vec<(Range<i64>, &SeqAlign)> = Vec::with_capacity(alignments.len());
    for al in alignments {
        match al.entity_range() {
            Some(r) => ranged.push((r, al)),
            None => warn!("Skipping alignment without entity range: {}", al),
        }
    }
    ranged.sort_by_key(|(r, _)| Reverse(r.end - r.start));

    let mut groups: BTreeMap<usize, Vec<(Range<i64>, &SeqAlign)>> = BTreeMap::new();
    for (range, al) in ranged {
        let existing = groups
            .iter()
            .find(|(_, members)| members.iter().any(|(r, _)| ranges_overlap(&range, r)))
            .map(|(grp, _)| *grp);
        let grp = existing.unwrap_or(groups.len() + 1);
        groups.entry(grp).or_default().push((range, al));
    }

    groups
        .into_iter()
        .map(|(grp, members)| (grp, members.into_iter().map(|(_, al)| al.clone()).collect()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdb(beg: i64, end: i64, db_beg: i64, db_end: i64) -> SeqAlign {
        SeqAlign::from_pdb(beg, end, Some(5), Some(db_beg), Some(db_end), "UNP", "P000001", None)
    }

    fn sifts(beg: i64, unp_beg: i64, len: i64) -> SeqAlign {
        SeqAlign::from_sifts(&SiftsAlignment {
            unp_id: "P000001".to_string(),
            beg,
            len,
            unp_beg: Some(unp_beg),
            unp_end: None,
        })
    }

    #[test]
    fn test_group_pdb_alignments() {
        let list = vec![
            pdb(1, 5, 20, 25),
            pdb(1, 5, 20, 25),
            pdb(1, 100, 20, 120),
            pdb(200, 300, 1220, 1320),
            pdb(400, 500, 1420, 1520),
        ];
        let groups = split_seq_align_list(&list);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.values().map(Vec::len).sum::<usize>(), 5);

        let sa = &list[0];
        assert_eq!(sa.entity_align_length(), Some(5));
        assert_eq!(sa.entity_seq_beg, Some(1));
        assert_eq!(sa.entity_seq_end, Some(5));
        assert_eq!(sa.db_name.as_deref(), Some("UNP"));
        assert_eq!(sa.db_accession.as_deref(), Some("P000001"));
        assert_eq!(sa.db_seq_beg, Some(20));
        assert_eq!(sa.db_seq_end, Some(25));
    }

    #[test]
    fn test_group_sifts_alignments() {
        let list = vec![
            sifts(1, 20, 5),
            sifts(1, 20, 5),
            sifts(1, 100, 100),
            sifts(50, 70, 100),
            sifts(400, 20, 50),
            sifts(1000, 1200, 500),
        ];
        let groups = split_seq_align_list(&list);
        assert_eq!(groups.len(), 3);
        // Longest segment opens the first group
        assert_eq!(groups[&1][0].entity_seq_beg, Some(1000));
        assert_eq!(groups[&2].len(), 4);
    }

    #[test]
    fn test_range_helpers() {
        assert!(ranges_overlap(&(1..10), &(5..20)));
        assert!(!ranges_overlap(&(1..5), &(5..10)));
        assert!(!ranges_overlap(&(3..3), &(1..10)));
        assert_eq!(range_overlap(&(1..10), &(5..20)), (5..=10).collect());
        assert!(range_overlap(&(1..2), &(8..9)).is_empty());
    }

    #[test]
    fn test_align_length_falls_back_to_span() {
        let al = SeqAlign::from_pdb(10, 19, None, None, None, "UNP", "Q1", Some("Q1-2"));
        assert_eq!(al.entity_align_length(), Some(10));
        assert_eq!(al.entity_range(), Some(10..20));
    }
}
