//! Cross-document merge of provisional report records.
//!
//! 1. Group by establishment identity (case/whitespace-insensitive name) and
//!    drop establishments whose every inspection is approved.
//! 2. Collapse exact `(identity, date, outcome)` repeats, keeping the record
//!    with strictly more violations (ties keep the first seen).
//!
//! Output order is first-seen order of the surviving keys.

use std::collections::{HashMap, HashSet};

use crate::ingest::types::ProvisionalRecord;
use crate::model::{establishment_key, Outcome};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MergeKey {
    establishment: String,
    date: String,
    outcome: Outcome,
}

impl MergeKey {
    fn of(rec: &ProvisionalRecord) -> Self {
        Self {
            establishment: establishment_key(&rec.name),
            date: rec.date.trim().to_string(),
            outcome: Outcome::from_report_label(&rec.outcome),
        }
    }
}

/// Merge records from any number of documents.
/// Returns `(kept, dropped_clean, collapsed)`: the merged records, how many
/// records belonged to all-approved establishments, and how many repeats
/// were folded into another record.
pub fn merge_documents<I>(documents: I) -> (Vec<ProvisionalRecord>, usize, usize)
where
    I: IntoIterator<Item = Vec<ProvisionalRecord>>,
{
    let all: Vec<ProvisionalRecord> = documents.into_iter().flatten().collect();

    // (1) establishments with at least one non-approved inspection
    let adverse: HashSet<String> = all
        .iter()
        .filter(|r| Outcome::from_report_label(&r.outcome) != Outcome::Approved)
        .map(|r| establishment_key(&r.name))
        .collect();

    let mut dropped_clean = 0usize;
    let mut collapsed = 0usize;
    let mut kept: Vec<ProvisionalRecord> = Vec::with_capacity(all.len());
    let mut index: HashMap<MergeKey, usize> = HashMap::new();

    for rec in all {
        if !adverse.contains(&establishment_key(&rec.name)) {
            dropped_clean += 1;
            continue;
        }

        // (2) richness-preferring collapse
        let key = MergeKey::of(&rec);
        match index.get(&key) {
            Some(&i) => {
                collapsed += 1;
                if rec.violations.len() > kept[i].violations.len() {
                    kept[i] = rec;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(rec);
            }
        }
    }

    (kept, dropped_clean, collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawViolation;

    fn rec(name: &str, date: &str, outcome: &str, violations: usize) -> ProvisionalRecord {
        ProvisionalRecord {
            name: name.into(),
            address: "1 Main St".into(),
            date: date.into(),
            outcome: outcome.into(),
            operational_status: Some("Open".into()),
            city: "Albuquerque".into(),
            county: "Bernalillo".into(),
            violations: (0..violations)
                .map(|i| RawViolation::Text(format!("v{i}")))
                .collect(),
            pdf_url: None,
        }
    }

    #[test]
    fn all_approved_establishments_are_dropped() {
        let doc = vec![
            rec("Clean Cafe", "2025-01-01", "approved", 0),
            rec("Clean Cafe", "2025-02-01", "pass", 0),
            rec("Dirty Diner", "2025-01-01", "approved", 0),
            rec("Dirty Diner", "2025-02-01", "conditional", 1),
        ];
        let (kept, dropped, collapsed) = merge_documents(vec![doc]);
        assert_eq!(dropped, 2);
        assert_eq!(collapsed, 0);
        // approved history of a retained establishment stays
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|r| r.name == "Dirty Diner"));
    }

    #[test]
    fn identity_ignores_case_and_whitespace() {
        let a = vec![rec("Dirty  Diner", "2025-02-01", "closed", 0)];
        let b = vec![rec("dirty diner ", "2025-02-01", "closed", 2)];
        let (kept, _, collapsed) = merge_documents(vec![a, b]);
        assert_eq!(kept.len(), 1);
        assert_eq!(collapsed, 1);
        assert_eq!(kept[0].violations.len(), 2);
    }

    #[test]
    fn richer_record_wins_and_ties_keep_first() {
        let mut first = rec("Diner", "2025-02-01", "failed", 1);
        first.address = "first".into();
        let mut tie = rec("Diner", "2025-02-01", "failed", 1);
        tie.address = "tie".into();
        let poorer = rec("Diner", "2025-02-01", "failed", 0);
        let (kept, _, collapsed) = merge_documents(vec![vec![first, tie, poorer]]);
        assert_eq!(kept.len(), 1);
        assert_eq!(collapsed, 2);
        assert_eq!(kept[0].address, "first");

        let (kept, _, _) = merge_documents(vec![
            vec![rec("Diner", "2025-02-01", "failed", 1)],
            vec![rec("Diner", "2025-02-01", "failed", 3)],
        ]);
        assert_eq!(kept[0].violations.len(), 3);
    }

    #[test]
    fn distinct_outcomes_same_day_survive() {
        let doc = vec![
            rec("Diner", "2025-02-01", "conditional", 0),
            rec("Diner", "2025-02-01", "closed", 0),
        ];
        let (kept, _, collapsed) = merge_documents(vec![doc]);
        assert_eq!(kept.len(), 2);
        assert_eq!(collapsed, 0);
    }

    #[test]
    fn empty_input_is_empty() {
        let (kept, dropped, collapsed) = merge_documents(Vec::<Vec<ProvisionalRecord>>::new());
        assert!(kept.is_empty());
        assert_eq!((dropped, collapsed), (0, 0));
    }
}
