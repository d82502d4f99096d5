//! Report formatting for courseqa outputs.

use std::fmt::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::autofix::FixCounts;
use crate::domain::{IssueDraft, IssueSeverity, Scores};
use crate::history::{RunComparison, RunWithScore, ScoreDelta};

/// Outcome of processing one local package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum PackageStatus {
    /// Not processed yet.
    Pending,
    /// Scanned to completion.
    Scanned,
    /// Fixed and written out.
    Fixed,
    /// Failed with an error message.
    Failed(String),
}

/// Scan report for one local package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageReport {
    /// Package path as given.
    pub source: PathBuf,
    /// Processing status.
    pub status: PackageStatus,
    /// Scores of the scan.
    pub scores: Option<Scores>,
    /// Findings of the scan.
    pub issues: Vec<IssueDraft>,
}

impl PackageReport {
    /// Create a pending report.
    pub fn new(source: PathBuf) -> Self {
        Self {
            source,
            status: PackageStatus::Pending,
            scores: None,
            issues: Vec::new(),
        }
    }

    /// Create a report for a package that could not be scanned.
    pub fn failed(source: PathBuf, error: impl Into<String>) -> Self {
        Self {
            status: PackageStatus::Failed(error.into()),
            ..Self::new(source)
        }
    }

    /// Findings per severity, most severe first.
    pub fn severity_counts(&self) -> Vec<(IssueSeverity, usize)> {
        IssueSeverity::ALL
            .iter()
            .map(|severity| {
                let count = self
                    .issues
                    .iter()
                    .filter(|issue| issue.severity == *severity)
                    .count();
                (*severity, count)
            })
            .collect()
    }
}

/// Fix report for one local package.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixReport {
    /// Package path as given.
    pub source: PathBuf,
    /// Where the fixed archive was written.
    pub output: PathBuf,
    /// Where the diff was written, if requested.
    pub diff_output: Option<PathBuf>,
    /// Processing status.
    pub status: PackageStatus,
    /// Documents that changed.
    pub changed_files: usize,
    /// Fixes per rule family.
    pub counts: FixCounts,
}

/// Render scan reports as Markdown.
pub fn render_scan_markdown(reports: &[PackageReport]) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Course QA Scan Report\n");
    for report in reports {
        let _ = writeln!(output, "## {}\n", report.source.display());
        append_status(&mut output, &report.status);
        if let Some(scores) = &report.scores {
            append_scores(&mut output, scores);
        }
        append_issues(&mut output, &report.issues);
    }
    output
}

/// Render a fix report as Markdown.
pub fn render_fix_markdown(report: &FixReport) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Course QA Fix Report\n");
    let _ = writeln!(output, "- Source: `{}`", report.source.display());
    let _ = writeln!(output, "- Output: `{}`", report.output.display());
    if let Some(diff) = &report.diff_output {
        let _ = writeln!(output, "- Diff: `{}`", diff.display());
    }
    append_status(&mut output, &report.status);
    let _ = writeln!(output, "### Fixes");
    let _ = writeln!(output, "- Changed files: {}", report.changed_files);
    let _ = writeln!(output, "- img alt added: {}", report.counts.img_alt_added);
    let _ = writeln!(
        output,
        "- button aria-label added: {}",
        report.counts.button_aria_label_added
    );
    let _ = writeln!(
        output,
        "- input/select/textarea aria-label added: {}",
        report.counts.input_aria_label_added
    );
    let _ = writeln!(output, "- heading adjusted: {}", report.counts.heading_adjusted);
    output
}

/// Render run history and its comparison as Markdown.
pub fn render_history_markdown(runs: &[RunWithScore], comparison: &RunComparison) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Scan History\n");
    if runs.is_empty() {
        let _ = writeln!(output, "No scan runs recorded.");
        return output;
    }
    let _ = writeln!(output, "| Run | Status | Created | Total | A11y | SCORM | Reliability |");
    let _ = writeln!(output, "|---|---|---|---|---|---|---|");
    for entry in runs {
        let score = |pick: fn(&Scores) -> u8| {
            entry
                .score
                .as_ref()
                .map(|summary| pick(&summary.scores()).to_string())
                .unwrap_or_else(|| "-".to_string())
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {} | {} | {} |",
            entry.run.id,
            entry.run.status.as_str(),
            entry.run.created_at.to_rfc3339(),
            score(|s| s.total_score),
            score(|s| s.accessibility_score),
            score(|s| s.scorm_score),
            score(|s| s.reliability_score),
        );
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "### Comparison");
    match &comparison.delta {
        Some(delta) => {
            let _ = writeln!(output, "{}", format_delta(delta));
        }
        None => {
            let _ = writeln!(output, "Fewer than two scored runs; no comparison available.");
        }
    }
    output
}

/// One-line signed score delta.
pub fn format_delta(delta: &ScoreDelta) -> String {
    format!(
        "total {:+}, accessibility {:+}, scorm {:+}, reliability {:+}",
        delta.total, delta.accessibility, delta.scorm, delta.reliability
    )
}

/// Render any serializable report payload as JSON.
pub fn render_json<T: Serialize + ?Sized>(payload: &T) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(payload)
}

fn append_status(output: &mut String, status: &PackageStatus) {
    match status {
        PackageStatus::Pending => {
            let _ = writeln!(output, "- Status: pending");
        }
        PackageStatus::Scanned => {
            let _ = writeln!(output, "- Status: scanned");
        }
        PackageStatus::Fixed => {
            let _ = writeln!(output, "- Status: fixed");
        }
        PackageStatus::Failed(error) => {
            let _ = writeln!(output, "- Status: failed ({error})");
        }
    }
    let _ = writeln!(output);
}

fn append_scores(output: &mut String, scores: &Scores) {
    let _ = writeln!(output, "### Scores");
    let _ = writeln!(output, "- Total: {}", scores.total_score);
    let _ = writeln!(output, "- Accessibility: {}", scores.accessibility_score);
    let _ = writeln!(output, "- SCORM: {}", scores.scorm_score);
    let _ = writeln!(output, "- Reliability: {}\n", scores.reliability_score);
}

fn append_issues(output: &mut String, issues: &[IssueDraft]) {
    if issues.is_empty() {
        let _ = writeln!(output, "### Issues\nNo issues found.\n");
        return;
    }
    let _ = writeln!(output, "### Issues");
    for issue in issues {
        let location = issue
            .file_path
            .as_deref()
            .map(|file| format!(" (`{file}`)"))
            .unwrap_or_default();
        let _ = writeln!(
            output,
            "- [{}] `{}` {}{location}",
            issue.severity, issue.rule_key, issue.title
        );
    }
    let _ = writeln!(output);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{IssueCategory, ScanRun, ScanStatus, ScoreSummary};
    use crate::history::compare_runs;
    use chrono::Utc;

    fn sample_report() -> PackageReport {
        let mut report = PackageReport::new(PathBuf::from("course.zip"));
        report.status = PackageStatus::Scanned;
        report.scores = Some(Scores {
            total_score: 92,
            accessibility_score: 80,
            scorm_score: 100,
            reliability_score: 100,
        });
        report.issues = vec![
            IssueDraft::new(
                IssueCategory::Accessibility,
                IssueSeverity::Critical,
                "axe.image-alt",
                "Images must have alternate text",
                "detail",
            )
            .with_file("index.html"),
        ];
        report
    }

    fn run(id: &str, total: Option<u8>) -> RunWithScore {
        let now = Utc::now();
        RunWithScore {
            run: ScanRun {
                id: id.to_string(),
                project_id: "p1".to_string(),
                status: ScanStatus::Completed,
                started_at: Some(now),
                finished_at: Some(now),
                error_text: None,
                created_at: now,
            },
            score: total.map(|total| ScoreSummary {
                scan_run_id: id.to_string(),
                project_id: "p1".to_string(),
                total_score: total,
                accessibility_score: total,
                scorm_score: 100,
                reliability_score: 100,
                created_at: now,
            }),
        }
    }

    #[test]
    fn renders_scan_markdown() {
        let output = render_scan_markdown(&[
            sample_report(),
            PackageReport::failed(PathBuf::from("broken.zip"), "archive error: bad"),
        ]);
        assert!(output.contains("# Course QA Scan Report"));
        assert!(output.contains("- Total: 92"));
        assert!(output.contains("- [critical] `axe.image-alt` Images must have alternate text (`index.html`)"));
        assert!(output.contains("Status: failed (archive error: bad)"));
        assert!(output.contains("No issues found."));
    }

    #[test]
    fn counts_issues_per_severity() {
        let counts = sample_report().severity_counts();
        assert_eq!(counts[0], (IssueSeverity::Critical, 1));
        assert_eq!(counts[3], (IssueSeverity::Low, 0));
    }

    #[test]
    fn renders_fix_markdown() {
        let report = FixReport {
            source: PathBuf::from("course.zip"),
            output: PathBuf::from("fixed.zip"),
            diff_output: Some(PathBuf::from("fixed.diff.txt")),
            status: PackageStatus::Fixed,
            changed_files: 2,
            counts: FixCounts {
                img_alt_added: 3,
                ..FixCounts::default()
            },
        };
        let output = render_fix_markdown(&report);
        assert!(output.contains("- Diff: `fixed.diff.txt`"));
        assert!(output.contains("- Changed files: 2"));
        assert!(output.contains("- img alt added: 3"));
    }

    #[test]
    fn renders_history_with_delta() {
        let runs = vec![run("r2", Some(90)), run("r1", None), run("r0", Some(70))];
        let output = render_history_markdown(&runs, &compare_runs(&runs, None));
        assert!(output.contains("| r1 | completed |"));
        assert!(output.contains("| - | - | - | - |"));
        assert!(output.contains("total +20, accessibility +20, scorm +0, reliability +0"));

        let single = vec![run("r0", Some(70))];
        let output = render_history_markdown(&single, &compare_runs(&single, None));
        assert!(output.contains("no comparison available"));
    }

    #[test]
    fn renders_json_payload() {
        let json = render_json(&vec![sample_report()]).expect("json");
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed[0]["status"]["status"], "scanned");
        assert_eq!(parsed[0]["scores"]["totalScore"], 92);
    }
}
