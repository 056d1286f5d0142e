use std::collections::HashMap;

use serde::{Serialize, Deserialize};

use crate::mapper::MappedRecord;
use crate::transform::TransformedRecord;

/// A transform tool row with its original label re-attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalRecord {
    pub transcript_id: String,
    pub genomic_position: u32,
    pub transcript_position: i64,
    pub feature_type: String,
    pub label: Option<String>,
}

impl FinalRecord {
    fn new(t: &TransformedRecord, label: Option<&str>) -> Self {
        Self {
            transcript_id: t.transcript_id.clone(),
            genomic_position: t.genomic_position,
            transcript_position: t.transcript_position,
            feature_type: t.feature_type.clone(),
            label: label.map(str::to_string),
        }
    }
}

/// Left outer join of tool output onto mapped records by
/// (transcript_id, genomic_position).
///
/// Each transformed row appears once per mapped record sharing its key, or
/// once with `label: None` if there is none. Output is ordered by key;
/// equal keys keep transformed order, then mapped order.
pub fn join(transformed: &[TransformedRecord], mapped: &[MappedRecord]) -> Vec<FinalRecord> {
    let mut labels: HashMap<(&str, u32), Vec<&str>> = HashMap::new();
    for m in mapped {
        labels.entry(m.key()).or_default().push(&m.label);
    }

    let mut rows: Vec<&TransformedRecord> = transformed.iter().collect();
    rows.sort_by(|a, b| {
        (a.transcript_id.as_str(), a.genomic_position).cmp(&(b.transcript_id.as_str(), b.genomic_position))
    });

    let mut out = Vec::with_capacity(rows.len());
    for t in rows {
        match labels.get(&(t.transcript_id.as_str(), t.genomic_position)) {
            Some(found) => out.extend(found.iter().map(|l| FinalRecord::new(t, Some(*l)))),
            None => out.push(FinalRecord::new(t, None)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(tx: &str, pos: u32, tpos: i64) -> TransformedRecord {
        TransformedRecord {
            transcript_id: tx.into(),
            genomic_position: pos,
            transcript_position: tpos,
            feature_type: "exon".into(),
        }
    }

    fn m(tx: &str, pos: u32, label: &str) -> MappedRecord {
        MappedRecord {
            transcript_id: tx.into(),
            genomic_position: pos,
            label: label.into(),
        }
    }

    #[test]
    fn duplicate_labels_fan_out() {
        let out = join(&[t("T1", 1000, 50)], &[m("T1", 1000, "X"), m("T1", 1000, "Y")]);
        assert_eq!(
            out,
            vec![
                FinalRecord {
                    transcript_id: "T1".into(),
                    genomic_position: 1000,
                    transcript_position: 50,
                    feature_type: "exon".into(),
                    label: Some("X".into()),
                },
                FinalRecord {
                    transcript_id: "T1".into(),
                    genomic_position: 1000,
                    transcript_position: 50,
                    feature_type: "exon".into(),
                    label: Some("Y".into()),
                },
            ]
        );
    }

    #[test]
    fn unmatched_rows_are_kept_once_without_label() {
        let out = join(
            &[t("T1", 1000, 50), t("T9", 7, 1)],
            &[m("T1", 1000, "X"), m("T1", 1001, "Z")],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label.as_deref(), Some("X"));
        assert_eq!(out[1].transcript_id, "T9");
        assert_eq!(out[1].label, None);
    }

    #[test]
    fn every_transformed_row_survives() {
        let transformed = vec![t("T2", 5, 1), t("T1", 9, 2), t("T1", 3, 3)];
        let out = join(&transformed, &[]);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|r| r.label.is_none()));
    }

    #[test]
    fn output_is_sorted_by_key_with_stable_ties() {
        let transformed = vec![t("T2", 5, 1), t("T1", 9, 2), t("T1", 3, 3), t("T1", 9, 4)];
        let mapped = vec![m("T1", 9, "b"), m("T1", 9, "a"), m("T2", 5, "c")];
        let out = join(&transformed, &mapped);

        let got: Vec<_> = out
            .iter()
            .map(|r| (r.transcript_id.as_str(), r.genomic_position, r.transcript_position, r.label.as_deref()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("T1", 3, 3, None),
                ("T1", 9, 2, Some("b")),
                ("T1", 9, 2, Some("a")),
                ("T1", 9, 4, Some("b")),
                ("T1", 9, 4, Some("a")),
                ("T2", 5, 1, Some("c")),
            ]
        );
    }

    #[test]
    fn join_is_deterministic() {
        let transformed = vec![t("T2", 5, 1), t("T1", 9, 2)];
        let mapped = vec![m("T1", 9, "b"), m("T2", 5, "c"), m("T1", 9, "a")];
        assert_eq!(join(&transformed, &mapped), join(&transformed, &mapped));
    }
}
