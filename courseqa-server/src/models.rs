//! Database models for the courseqa server.

use std::str::FromStr;

use chrono::NaiveDateTime;
use diesel::prelude::*;

use courseqa_core::{
    Asset, AssetKind, CourseQaError, Issue, IssueCategory, IssueSeverity, Project, ScanRun,
    ScanStatus, ScoreSummary,
};

use crate::schema::{assets, issues, projects, scan_runs, score_summaries};

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Selectable)]
#[diesel(table_name = projects)]
/// Project database record.
pub struct ProjectRow {
    /// Project identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            created_at: row.created_at.and_utc(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Selectable)]
#[diesel(table_name = assets)]
/// Stored asset record.
pub struct AssetRow {
    /// Asset identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Asset kind string.
    pub kind: String,
    /// Object storage locator.
    pub file_path: String,
    /// MIME type.
    pub mime_type: String,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

impl TryFrom<AssetRow> for Asset {
    type Error = CourseQaError;

    fn try_from(row: AssetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: AssetKind::from_str(&row.kind)?,
            id: row.id,
            project_id: row.project_id,
            file_path: row.file_path,
            mime_type: row.mime_type,
            created_at: row.created_at.and_utc(),
        })
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Selectable)]
#[diesel(table_name = scan_runs)]
/// Scan run record.
pub struct ScanRunRow {
    /// Run identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Status string.
    pub status: String,
    /// First time the run was running.
    pub started_at: Option<NaiveDateTime>,
    /// Time the run reached a terminal state.
    pub finished_at: Option<NaiveDateTime>,
    /// Failure message.
    pub error_text: Option<String>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

impl TryFrom<ScanRunRow> for ScanRun {
    type Error = CourseQaError;

    fn try_from(row: ScanRunRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: ScanStatus::from_str(&row.status)?,
            id: row.id,
            project_id: row.project_id,
            started_at: row.started_at.map(|at| at.and_utc()),
            finished_at: row.finished_at.map(|at| at.and_utc()),
            error_text: row.error_text,
            created_at: row.created_at.and_utc(),
        })
    }
}

impl From<&ScanRun> for ScanRunRow {
    fn from(run: &ScanRun) -> Self {
        Self {
            id: run.id.clone(),
            project_id: run.project_id.clone(),
            status: run.status.as_str().to_string(),
            started_at: run.started_at.map(|at| at.naive_utc()),
            finished_at: run.finished_at.map(|at| at.naive_utc()),
            error_text: run.error_text.clone(),
            created_at: run.created_at.naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Selectable)]
#[diesel(table_name = issues)]
/// Issue record. `severity_rank` backs severity ordering.
pub struct IssueRow {
    /// Issue identifier.
    pub id: String,
    /// Owning run.
    pub scan_run_id: String,
    /// Owning project.
    pub project_id: String,
    /// Category string.
    pub category: String,
    /// Severity string.
    pub severity: String,
    /// Numeric severity rank.
    pub severity_rank: i32,
    /// Rule identifier.
    pub rule_key: String,
    /// Title.
    pub title: String,
    /// Detail.
    pub detail: String,
    /// Evidence snippet.
    pub evidence: Option<String>,
    /// File within the package.
    pub file_path: Option<String>,
    /// Line within the file.
    pub line_no: Option<i32>,
    /// CSS selector of the node.
    pub selector: Option<String>,
    /// Suggested fix.
    pub fix_suggestion: Option<String>,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

impl TryFrom<IssueRow> for Issue {
    type Error = CourseQaError;

    fn try_from(row: IssueRow) -> Result<Self, Self::Error> {
        Ok(Self {
            category: IssueCategory::from_str(&row.category)?,
            severity: IssueSeverity::from_str(&row.severity)?,
            id: row.id,
            scan_run_id: row.scan_run_id,
            project_id: row.project_id,
            rule_key: row.rule_key,
            title: row.title,
            detail: row.detail,
            evidence: row.evidence,
            file_path: row.file_path,
            line_no: row.line_no,
            selector: row.selector,
            fix_suggestion: row.fix_suggestion,
            created_at: row.created_at.and_utc(),
        })
    }
}

impl From<&Issue> for IssueRow {
    fn from(issue: &Issue) -> Self {
        Self {
            id: issue.id.clone(),
            scan_run_id: issue.scan_run_id.clone(),
            project_id: issue.project_id.clone(),
            category: issue.category.as_str().to_string(),
            severity: issue.severity.as_str().to_string(),
            severity_rank: issue.severity.rank(),
            rule_key: issue.rule_key.clone(),
            title: issue.title.clone(),
            detail: issue.detail.clone(),
            evidence: issue.evidence.clone(),
            file_path: issue.file_path.clone(),
            line_no: issue.line_no,
            selector: issue.selector.clone(),
            fix_suggestion: issue.fix_suggestion.clone(),
            created_at: issue.created_at.naive_utc(),
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Identifiable, Selectable, AsChangeset)]
#[diesel(table_name = score_summaries, primary_key(scan_run_id))]
/// Score summary record, one per run.
pub struct ScoreSummaryRow {
    /// Scored run.
    pub scan_run_id: String,
    /// Owning project.
    pub project_id: String,
    /// Weighted overall score.
    pub total_score: i32,
    /// Accessibility score.
    pub accessibility_score: i32,
    /// Package structure score.
    pub scorm_score: i32,
    /// Reliability score.
    pub reliability_score: i32,
    /// Creation timestamp.
    pub created_at: NaiveDateTime,
}

impl From<ScoreSummaryRow> for ScoreSummary {
    fn from(row: ScoreSummaryRow) -> Self {
        Self {
            scan_run_id: row.scan_run_id,
            project_id: row.project_id,
            total_score: score_value(row.total_score),
            accessibility_score: score_value(row.accessibility_score),
            scorm_score: score_value(row.scorm_score),
            reliability_score: score_value(row.reliability_score),
            created_at: row.created_at.and_utc(),
        }
    }
}

fn score_value(raw: i32) -> u8 {
    raw.clamp(0, 100) as u8
}
