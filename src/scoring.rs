//! # Severity Scoring
//! Pure, deterministic mapping `(inspection, history?) → Score`.
//! No I/O and no wall clock: the reference date is injected at construction.
//!
//! Rules are additive and evaluated in a fixed order; the order of
//! `reasons` and their exact wording are part of the output contract.
//!
//! | # | condition                                          | +     | reason                                      |
//! |---|----------------------------------------------------|-------|---------------------------------------------|
//! | 1 | closed, ≤ 180 days ago                             | 3.0   | `closure within 180d`                       |
//! | 2 | conditional/failed, ≤ 180 days ago                 | 2.0   | `conditional/failed within 180d`            |
//! | 3 | ≤ 365 days ago, N > 0 critical violations          | min(0.5·N, 2.0) | `N critical violation(s)`         |
//! | 4 | history of ≥ 2 with ≥ 2 adverse ≤ 365 days ago     | 0.5   | `multiple adverse inspections within 365d`  |

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Inspection, Outcome, Score};

const RECENT_WINDOW_DAYS: i64 = 180;
const YEAR_WINDOW_DAYS: i64 = 365;

const CLOSURE_POINTS: f64 = 3.0;
const ADVERSE_POINTS: f64 = 2.0;
const CRITICAL_POINTS_EACH: f64 = 0.5;
const CRITICAL_POINTS_CAP: f64 = 2.0;
const REPEAT_POINTS: f64 = 0.5;

/// Minimum history size before rule 4 is considered at all.
const REPEAT_MIN_HISTORY: usize = 2;
/// Adverse inspections needed within the year for rule 4 to fire.
const REPEAT_MIN_ADVERSE: usize = 2;

pub const HIGH_TIER_MIN: f64 = 3.0;
pub const MEDIUM_TIER_MIN: f64 = 1.5;

/// The fixed scoring rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityRule {
    RecentClosure,
    RecentAdverse,
    CriticalViolations,
    RepeatedAdverse,
}

impl SeverityRule {
    pub const ALL: [SeverityRule; 4] = [
        SeverityRule::RecentClosure,
        SeverityRule::RecentAdverse,
        SeverityRule::CriticalViolations,
        SeverityRule::RepeatedAdverse,
    ];

    /// Contribution and reason when the rule fires.
    fn evaluate(
        &self,
        scorer: &SeverityScorer,
        inspection: &Inspection,
        history: Option<&[Inspection]>,
    ) -> Option<(f64, String)> {
        let days_ago = scorer.days_ago(inspection.date);
        match self {
            SeverityRule::RecentClosure => (inspection.outcome == Outcome::Closed
                && days_ago <= RECENT_WINDOW_DAYS)
                .then(|| (CLOSURE_POINTS, "closure within 180d".to_string())),

            SeverityRule::RecentAdverse => (matches!(
                inspection.outcome,
                Outcome::Conditional | Outcome::Failed
            ) && days_ago <= RECENT_WINDOW_DAYS)
                .then(|| (ADVERSE_POINTS, "conditional/failed within 180d".to_string())),

            SeverityRule::CriticalViolations => {
                if days_ago > YEAR_WINDOW_DAYS {
                    return None;
                }
                let count = inspection.critical_count();
                (count > 0).then(|| {
                    let points = (count as f64 * CRITICAL_POINTS_EACH).min(CRITICAL_POINTS_CAP);
                    (points, format!("{count} critical violation(s)"))
                })
            }

            SeverityRule::RepeatedAdverse => {
                let history = history?;
                if history.len() < REPEAT_MIN_HISTORY {
                    return None;
                }
                let adverse = history
                    .iter()
                    .filter(|h| scorer.days_ago(h.date) <= YEAR_WINDOW_DAYS && h.outcome.is_adverse())
                    .count();
                (adverse >= REPEAT_MIN_ADVERSE).then(|| {
                    (
                        REPEAT_POINTS,
                        "multiple adverse inspections within 365d".to_string(),
                    )
                })
            }
        }
    }
}

/// Scorer pinned to a reference date ("now").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityScorer {
    as_of: NaiveDate,
}

impl SeverityScorer {
    pub fn new(as_of: NaiveDate) -> Self {
        Self { as_of }
    }

    /// Truncating an instant to its date gives the same whole-day ages as
    /// subtracting midnight-based inspection dates from the instant.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self::new(now.date_naive())
    }

    /// Whole days between the reference date and `date` (negative for future dates).
    pub fn days_ago(&self, date: NaiveDate) -> i64 {
        (self.as_of - date).num_days()
    }

    /// Score one inspection. `history`, when given, is the establishment's
    /// inspection set; the caller decides whether it includes `inspection`.
    pub fn score(&self, inspection: &Inspection, history: Option<&[Inspection]>) -> Score {
        let mut total = 0.0f64;
        let mut reasons = Vec::new();

        for rule in SeverityRule::ALL {
            if let Some((points, reason)) = rule.evaluate(self, inspection, history) {
                total += points;
                reasons.push(reason);
            }
        }

        Score {
            severity: round1(total),
            reasons,
        }
    }
}

/// Severity bucket used in the manifest breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTier {
    High,
    Medium,
    Low,
}

impl SeverityTier {
    /// Inclusive lower bounds; the top tier is unbounded above.
    pub fn of(severity: f64) -> Self {
        if severity >= HIGH_TIER_MIN {
            SeverityTier::High
        } else if severity >= MEDIUM_TIER_MIN {
            SeverityTier::Medium
        } else {
            SeverityTier::Low
        }
    }
}

impl Score {
    pub fn tier(&self) -> SeverityTier {
        SeverityTier::of(self.severity)
    }
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}
