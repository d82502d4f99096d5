//! Deterministic quality scoring.
//!
//! Each category starts at 100 and loses a fixed penalty per issue,
//! depending on its severity. The overall score is a weighted sum of the
//! category scores. Weights and penalties are returned with every
//! computation so callers can show how a score was derived.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{IssueCategory, IssueSeverity, Scores};

/// Category weights used for the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoreWeights {
    /// Accessibility weight.
    pub accessibility: f64,
    /// Package structure weight.
    pub scorm: f64,
    /// Content reliability weight.
    pub reliability: f64,
}

/// Points deducted per issue of each severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SeverityPenalties {
    /// Penalty per critical issue.
    pub critical: u32,
    /// Penalty per high issue.
    pub high: u32,
    /// Penalty per medium issue.
    pub medium: u32,
    /// Penalty per low issue.
    pub low: u32,
}

/// Weights as exposed to callers.
pub const CATEGORY_WEIGHTS: ScoreWeights = ScoreWeights {
    accessibility: 0.40,
    scorm: 0.35,
    reliability: 0.25,
};

/// Severity penalties as exposed to callers.
pub const SEVERITY_PENALTIES: SeverityPenalties = SeverityPenalties {
    critical: 20,
    high: 12,
    medium: 6,
    low: 3,
};

// Weights in percent, so the overall score is computed in integers.
const WEIGHT_PERCENT: [(IssueCategory, u32); 3] = [
    (IssueCategory::Accessibility, 40),
    (IssueCategory::Scorm, 35),
    (IssueCategory::Reliability, 25),
];

/// Issue counts and penalty for one category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStat {
    /// Category.
    pub category: IssueCategory,
    /// Total issues in the category.
    pub issue_count: u32,
    /// Critical issues.
    pub critical: u32,
    /// High issues.
    pub high: u32,
    /// Medium issues.
    pub medium: u32,
    /// Low issues.
    pub low: u32,
    /// Points deducted from 100.
    pub penalty: u32,
}

impl CategoryStat {
    fn empty(category: IssueCategory) -> Self {
        Self {
            category,
            issue_count: 0,
            critical: 0,
            high: 0,
            medium: 0,
            low: 0,
            penalty: 0,
        }
    }

    fn record(&mut self, severity: IssueSeverity) {
        self.issue_count += 1;
        match severity {
            IssueSeverity::Critical => self.critical += 1,
            IssueSeverity::High => self.high += 1,
            IssueSeverity::Medium => self.medium += 1,
            IssueSeverity::Low => self.low += 1,
        }
        self.penalty = self.penalty.saturating_add(penalty_for(severity));
    }

    fn score(&self) -> u8 {
        100u32.saturating_sub(self.penalty) as u8
    }
}

/// How a score was derived, rendered next to the score itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreMeta {
    /// Per-category counts in scoring order.
    pub category_stats: Vec<CategoryStat>,
    /// Category weights.
    pub weights: ScoreWeights,
    /// Severity penalties.
    pub penalties: SeverityPenalties,
}

/// Result of a score computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreComputation {
    /// Integer scores.
    pub scores: Scores,
    /// Derivation details.
    pub meta: ScoreMeta,
}

fn penalty_for(severity: IssueSeverity) -> u32 {
    match severity {
        IssueSeverity::Critical => SEVERITY_PENALTIES.critical,
        IssueSeverity::High => SEVERITY_PENALTIES.high,
        IssueSeverity::Medium => SEVERITY_PENALTIES.medium,
        IssueSeverity::Low => SEVERITY_PENALTIES.low,
    }
}

/// Score an issue multiset. Order of the input does not matter.
pub fn compute_quality_score<I>(issues: I) -> ScoreComputation
where
    I: IntoIterator<Item = (IssueCategory, IssueSeverity)>,
{
    let mut stats = IssueCategory::ALL.map(CategoryStat::empty);
    for (category, severity) in issues {
        if let Some(stat) = stats.iter_mut().find(|stat| stat.category == category) {
            stat.record(severity);
        }
    }

    let score_of = |category: IssueCategory| {
        stats
            .iter()
            .find(|stat| stat.category == category)
            .map(CategoryStat::score)
            .unwrap_or(100)
    };

    let weighted: u32 = WEIGHT_PERCENT
        .iter()
        .map(|(category, weight)| u32::from(score_of(*category)) * weight)
        .sum();
    // Round half up.
    let total = ((weighted + 50) / 100).min(100) as u8;

    let scores = Scores {
        total_score: total,
        accessibility_score: score_of(IssueCategory::Accessibility),
        scorm_score: score_of(IssueCategory::Scorm),
        reliability_score: score_of(IssueCategory::Reliability),
    };

    ScoreComputation {
        scores,
        meta: ScoreMeta {
            category_stats: stats.to_vec(),
            weights: CATEGORY_WEIGHTS,
            penalties: SEVERITY_PENALTIES,
        },
    }
}
