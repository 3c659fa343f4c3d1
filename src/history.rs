//! history.rs: per-establishment inspection sets for the repeat-adverse rule.
//!
//! Keyed by `(source, establishment identity)`; every inspection of the run is
//! recorded, including the one being scored.

use std::collections::HashMap;

use crate::model::{establishment_key, Inspection, Source};

#[derive(Debug, Default, Clone)]
pub struct HistoryIndex {
    inner: HashMap<(Source, String), Vec<Inspection>>,
}

impl HistoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, source: Source, name: &str, inspection: Inspection) {
        self.inner
            .entry((source, establishment_key(name)))
            .or_default()
            .push(inspection);
    }

    pub fn get(&self, source: Source, name: &str) -> Option<&[Inspection]> {
        self.inner
            .get(&(source, establishment_key(name)))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InspectionType, Outcome};
    use chrono::NaiveDate;

    fn insp(day: u32, outcome: Outcome) -> Inspection {
        Inspection {
            date: NaiveDate::from_ymd_opt(2025, 1, day).unwrap(),
            kind: InspectionType::Routine,
            outcome,
            violations: vec![],
        }
    }

    #[test]
    fn groups_by_source_and_identity() {
        let mut h = HistoryIndex::new();
        h.push(Source::Abq, "Taco Town", insp(1, Outcome::Failed));
        h.push(Source::Abq, "  TACO town", insp(2, Outcome::Closed));
        h.push(Source::Nmed, "Taco Town", insp(3, Outcome::Approved));

        assert_eq!(h.get(Source::Abq, "taco town").map(<[_]>::len), Some(2));
        assert_eq!(h.get(Source::Nmed, "Taco Town").map(<[_]>::len), Some(1));
        assert!(h.get(Source::Nmed, "Burger Barn").is_none());
    }
}
