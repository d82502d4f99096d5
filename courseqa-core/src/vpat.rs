//! VPAT-style accessibility conformance drafts.
//!
//! The draft is advisory: it maps the accessibility findings of one scan
//! onto conformance levels with a fixed rule and needs human review.

use std::fmt::{self, Write as _};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Issue, IssueCategory, IssueSeverity, ScoreSummary};

const TOP_FINDINGS: usize = 8;

/// Draft conformance level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Conformance {
    /// No findings.
    Supports,
    /// Findings without blockers.
    PartiallySupports,
    /// Critical findings or several high ones.
    DoesNotSupport,
}

impl Conformance {
    /// Label used in the draft table.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Supports => "Supports",
            Self::PartiallySupports => "Partially Supports",
            Self::DoesNotSupport => "Does Not Support",
        }
    }
}

impl fmt::Display for Conformance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Accessibility issue counts per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SeverityCounts {
    /// Critical findings.
    pub critical: u32,
    /// High findings.
    pub high: u32,
    /// Medium findings.
    pub medium: u32,
    /// Low findings.
    pub low: u32,
}

impl SeverityCounts {
    /// Count the accessibility issues of a run.
    pub fn accessibility(issues: &[Issue]) -> Self {
        let mut counts = Self::default();
        for issue in issues
            .iter()
            .filter(|issue| issue.category == IssueCategory::Accessibility)
        {
            match issue.severity {
                IssueSeverity::Critical => counts.critical += 1,
                IssueSeverity::High => counts.high += 1,
                IssueSeverity::Medium => counts.medium += 1,
                IssueSeverity::Low => counts.low += 1,
            }
        }
        counts
    }
}

/// Map finding counts to a conformance level.
pub fn determine_conformance(counts: &SeverityCounts) -> Conformance {
    if counts.critical > 0 || counts.high >= 3 {
        Conformance::DoesNotSupport
    } else if counts.high > 0 || counts.medium > 0 || counts.low > 0 {
        Conformance::PartiallySupports
    } else {
        Conformance::Supports
    }
}

/// Inputs of a draft.
#[derive(Debug, Clone)]
pub struct VpatInput<'a> {
    /// Product name.
    pub project_title: &'a str,
    /// Project id.
    pub project_id: &'a str,
    /// Run the draft is derived from.
    pub scan_run_id: &'a str,
    /// Generation time.
    pub generated_at: DateTime<Utc>,
    /// Score of the run.
    pub score: &'a ScoreSummary,
    /// Issues of the run, most severe first.
    pub issues: &'a [Issue],
}

/// Render the draft as Markdown.
pub fn render_vpat(input: &VpatInput<'_>) -> String {
    let counts = SeverityCounts::accessibility(input.issues);
    let level_a = determine_conformance(&counts);
    let level_aa = determine_conformance(&SeverityCounts { low: 0, ..counts });
    let section_508 = determine_conformance(&SeverityCounts {
        medium: counts.medium.div_ceil(2),
        low: 0,
        ..counts
    });

    let mut out = String::new();
    let _ = writeln!(out, "# VPAT Draft (Auto-generated)\n");
    let _ = writeln!(
        out,
        "> Draft notice: This is an automatically generated draft based on static QA scan results. Human review is required before external sharing.\n"
    );

    let _ = writeln!(out, "## Product Information");
    let _ = writeln!(out, "- Product: {}", input.project_title);
    let _ = writeln!(out, "- Project ID: {}", input.project_id);
    let _ = writeln!(out, "- Source Scan Run ID: {}", input.scan_run_id);
    let _ = writeln!(
        out,
        "- Generated At (UTC): {}",
        input.generated_at.to_rfc3339_opts(SecondsFormat::Millis, true)
    );
    let _ = writeln!(
        out,
        "- Applicable Standards: WCAG 2.1 A/AA, Section 508 (draft mapping)\n"
    );

    let score = input.score;
    let _ = writeln!(out, "## Scan Score Snapshot");
    let _ = writeln!(out, "- Total score: {}", score.total_score);
    let _ = writeln!(out, "- Accessibility score: {}", score.accessibility_score);
    let _ = writeln!(out, "- SCORM score: {}", score.scorm_score);
    let _ = writeln!(out, "- Reliability score: {}\n", score.reliability_score);

    let _ = writeln!(out, "## Accessibility Issue Counts (Latest Scan)");
    let _ = writeln!(out, "- Critical: {}", counts.critical);
    let _ = writeln!(out, "- High: {}", counts.high);
    let _ = writeln!(out, "- Medium: {}", counts.medium);
    let _ = writeln!(out, "- Low: {}\n", counts.low);

    let _ = writeln!(out, "## Conformance Summary (Draft)");
    let _ = writeln!(out, "| Criteria | Conformance | Remarks |");
    let _ = writeln!(out, "|---|---|---|");
    let _ = writeln!(
        out,
        "| WCAG 2.1 Level A | {level_a} | Derived from automated accessibility findings; verify manually for final report. |"
    );
    let _ = writeln!(
        out,
        "| WCAG 2.1 Level AA | {level_aa} | Medium/High/Critical findings influence this draft status. |"
    );
    let _ = writeln!(
        out,
        "| Section 508 (Chapter 5, draft mapping) | {section_508} | Initial mapping from WCAG-oriented scan; legal review recommended. |\n"
    );

    let _ = writeln!(out, "## Top Accessibility Findings");
    let findings: Vec<&Issue> = input
        .issues
        .iter()
        .filter(|issue| issue.category == IssueCategory::Accessibility)
        .take(TOP_FINDINGS)
        .collect();
    if findings.is_empty() {
        let _ = writeln!(out, "- No accessibility findings detected in latest scan.");
    }
    for (index, issue) in findings.iter().enumerate() {
        let _ = writeln!(out, "{}. [{}] {}", index + 1, issue.severity, issue.title);
        let _ = writeln!(out, "   - File: {}", issue.file_path.as_deref().unwrap_or("-"));
        let _ = writeln!(out, "   - Detail: {}", issue.detail);
        let _ = writeln!(
            out,
            "   - Suggested remediation: {}",
            issue.fix_suggestion.as_deref().unwrap_or("Review manually")
        );
    }
    out.push('\n');

    let _ = writeln!(out, "## Assumptions and Limitations");
    let _ = writeln!(
        out,
        "- This draft relies on automated HTML scanning and heuristic scoring."
    );
    let _ = writeln!(
        out,
        "- It does not replace full manual audit, assistive technology testing, or legal review."
    );
    let _ = writeln!(
        out,
        "- Dynamic runtime behavior and context-specific accessibility requirements may not be fully covered."
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IssueDraft;
    use chrono::TimeZone;

    fn counts(critical: u32, high: u32, medium: u32, low: u32) -> SeverityCounts {
        SeverityCounts {
            critical,
            high,
            medium,
            low,
        }
    }

    fn issue(category: IssueCategory, severity: IssueSeverity, title: &str) -> Issue {
        Issue::from_draft(
            title.to_string(),
            "r1",
            "p1",
            IssueDraft::new(category, severity, "axe.image-alt", title, "Missing text")
                .with_file("index.html"),
            Utc::now(),
        )
    }

    fn summary() -> ScoreSummary {
        ScoreSummary {
            scan_run_id: "r1".to_string(),
            project_id: "p1".to_string(),
            total_score: 88,
            accessibility_score: 74,
            scorm_score: 100,
            reliability_score: 97,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn conformance_rule_thresholds() {
        assert_eq!(determine_conformance(&counts(0, 0, 0, 0)), Conformance::Supports);
        assert_eq!(determine_conformance(&counts(0, 0, 0, 1)), Conformance::PartiallySupports);
        assert_eq!(determine_conformance(&counts(0, 2, 5, 0)), Conformance::PartiallySupports);
        assert_eq!(determine_conformance(&counts(0, 3, 0, 0)), Conformance::DoesNotSupport);
        assert_eq!(determine_conformance(&counts(1, 0, 0, 0)), Conformance::DoesNotSupport);
    }

    #[test]
    fn levels_weigh_low_and_medium_findings_differently() {
        let issues = vec![issue(IssueCategory::Accessibility, IssueSeverity::Low, "Minor")];
        let summary = summary();
        let markdown = render_vpat(&VpatInput {
            project_title: "Safety 101",
            project_id: "p1",
            scan_run_id: "r1",
            generated_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            score: &summary,
            issues: &issues,
        });

        assert!(markdown.contains("| WCAG 2.1 Level A | Partially Supports |"));
        assert!(markdown.contains("| WCAG 2.1 Level AA | Supports |"));
        assert!(markdown.contains("| Section 508 (Chapter 5, draft mapping) | Supports |"));
        assert!(markdown.contains("- Generated At (UTC): 2026-01-02T03:04:05.000Z"));
        assert!(markdown.contains("- Total score: 88"));
    }

    #[test]
    fn findings_list_is_capped_and_skips_other_categories() {
        let mut issues = vec![issue(IssueCategory::Scorm, IssueSeverity::Critical, "Manifest")];
        for n in 0..10 {
            issues.push(issue(
                IssueCategory::Accessibility,
                IssueSeverity::Medium,
                &format!("Finding {n}"),
            ));
        }
        let summary = summary();
        let markdown = render_vpat(&VpatInput {
            project_title: "Safety 101",
            project_id: "p1",
            scan_run_id: "r1",
            generated_at: Utc::now(),
            score: &summary,
            issues: &issues,
        });

        assert!(markdown.contains("1. [medium] Finding 0\n   - File: index.html"));
        assert!(markdown.contains("8. [medium] Finding 7"));
        assert!(!markdown.contains("Finding 8"));
        assert!(!markdown.contains("Manifest"));
        assert!(markdown.contains("- Medium: 10"));
        // ceil(10 / 2) = 5 medium findings still only partially support 508.
        assert!(markdown.contains("| Section 508 (Chapter 5, draft mapping) | Partially Supports |"));
    }

    #[test]
    fn empty_findings_are_stated() {
        let summary = summary();
        let markdown = render_vpat(&VpatInput {
            project_title: "Safety 101",
            project_id: "p1",
            scan_run_id: "r1",
            generated_at: Utc::now(),
            score: &summary,
            issues: &[],
        });
        assert!(markdown.contains("- No accessibility findings detected in latest scan."));
        assert!(markdown.ends_with("may not be fully covered.\n"));
    }
}
