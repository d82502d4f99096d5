//! Run history and before/after comparison.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{ScanRun, ScoreSummary};

/// A scan run with its score, if one was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunWithScore {
    /// The run.
    #[serde(flatten)]
    pub run: ScanRun,
    /// Score of the run.
    pub score: Option<ScoreSummary>,
}

/// Score differences, `current - previous`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreDelta {
    /// Overall difference.
    pub total: i32,
    /// Accessibility difference.
    pub accessibility: i32,
    /// Package structure difference.
    pub scorm: i32,
    /// Reliability difference.
    pub reliability: i32,
}

impl ScoreDelta {
    /// Difference between two scores.
    pub fn between(current: &ScoreSummary, previous: &ScoreSummary) -> Self {
        let diff = |now: u8, then: u8| i32::from(now) - i32::from(then);
        Self {
            total: diff(current.total_score, previous.total_score),
            accessibility: diff(current.accessibility_score, previous.accessibility_score),
            scorm: diff(current.scorm_score, previous.scorm_score),
            reliability: diff(current.reliability_score, previous.reliability_score),
        }
    }
}

/// Comparison of the active run against the latest other scored run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunComparison {
    /// The active run.
    pub current: Option<RunWithScore>,
    /// The most recent other run that has a score.
    pub previous: Option<RunWithScore>,
    /// `None` unless both runs are scored.
    pub delta: Option<ScoreDelta>,
}

/// Compare runs listed newest first.
///
/// The active run is `active` when it is found in the history, else the
/// newest run.
pub fn compare_runs(runs: &[RunWithScore], active: Option<&str>) -> RunComparison {
    let current = active
        .and_then(|id| runs.iter().find(|entry| entry.run.id == id))
        .or_else(|| runs.first());
    let Some(current) = current else {
        return RunComparison::default();
    };

    let previous = runs
        .iter()
        .find(|entry| entry.run.id != current.run.id && entry.score.is_some());
    let delta = match (&current.score, previous.and_then(|entry| entry.score.as_ref())) {
        (Some(now), Some(then)) => Some(ScoreDelta::between(now, then)),
        _ => None,
    };

    RunComparison {
        current: Some(current.clone()),
        previous: previous.cloned(),
        delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScanStatus;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(id: &str, minute: i64, total: Option<u8>) -> RunWithScore {
        let created_at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minute);
        RunWithScore {
            run: ScanRun {
                id: id.to_string(),
                project_id: "p1".to_string(),
                status: ScanStatus::Completed,
                started_at: Some(created_at),
                finished_at: Some(created_at),
                error_text: None,
                created_at,
            },
            score: total.map(|total| ScoreSummary {
                scan_run_id: id.to_string(),
                project_id: "p1".to_string(),
                total_score: total,
                accessibility_score: total,
                scorm_score: 100,
                reliability_score: total.saturating_sub(10),
                created_at,
            }),
        }
    }

    #[test]
    fn empty_history_has_no_comparison() {
        assert_eq!(compare_runs(&[], None), RunComparison::default());
    }

    #[test]
    fn single_scored_run_has_undefined_delta() {
        let runs = vec![entry("r1", 0, Some(80))];
        let comparison = compare_runs(&runs, None);
        assert_eq!(comparison.current.map(|entry| entry.run.id), Some("r1".to_string()));
        assert!(comparison.previous.is_none());
        assert!(comparison.delta.is_none());
    }

    #[test]
    fn delta_is_current_minus_previous() {
        let runs = vec![entry("r3", 2, Some(92)), entry("r2", 1, Some(71))];
        let comparison = compare_runs(&runs, None);
        let delta = comparison.delta.expect("delta");
        assert_eq!(delta.total, 21);
        assert_eq!(delta.accessibility, 21);
        assert_eq!(delta.scorm, 0);
        assert_eq!(delta.reliability, 21);
    }

    #[test]
    fn unscored_runs_are_skipped_for_previous() {
        let runs = vec![
            entry("r4", 3, Some(60)),
            entry("r3", 2, None),
            entry("r2", 1, Some(90)),
        ];
        let comparison = compare_runs(&runs, None);
        assert_eq!(comparison.previous.map(|entry| entry.run.id), Some("r2".to_string()));
        assert_eq!(comparison.delta.map(|delta| delta.total), Some(-30));
    }

    #[test]
    fn explicit_selection_compares_against_newest_other_run() {
        let runs = vec![
            entry("r3", 2, Some(90)),
            entry("r2", 1, Some(70)),
            entry("r1", 0, Some(50)),
        ];
        let comparison = compare_runs(&runs, Some("r2"));
        assert_eq!(comparison.current.map(|entry| entry.run.id), Some("r2".to_string()));
        assert_eq!(comparison.previous.map(|entry| entry.run.id), Some("r3".to_string()));
        assert_eq!(comparison.delta.map(|delta| delta.total), Some(-20));
    }

    #[test]
    fn unscored_current_run_has_no_delta() {
        let runs = vec![entry("r2", 1, None), entry("r1", 0, Some(50))];
        let comparison = compare_runs(&runs, None);
        assert!(comparison.previous.is_some());
        assert!(comparison.delta.is_none());
    }

    #[test]
    fn run_fields_are_flattened_in_json() {
        let json = serde_json::to_value(entry("r1", 0, Some(80))).expect("serialize");
        assert_eq!(json["id"], "r1");
        assert_eq!(json["status"], "completed");
        assert_eq!(json["score"]["totalScore"], 80);
    }
}
