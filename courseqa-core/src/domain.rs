//! Domain entities for courseqa.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CourseQaError;

/// Issue category, one per scanner family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    /// DOM accessibility findings.
    Accessibility,
    /// Package structure and manifest findings.
    Scorm,
    /// Content reliability findings.
    Reliability,
}

impl IssueCategory {
    /// All categories in scoring order.
    pub const ALL: [IssueCategory; 3] = [Self::Accessibility, Self::Scorm, Self::Reliability];

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accessibility => "accessibility",
            Self::Scorm => "scorm",
            Self::Reliability => "reliability",
        }
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueCategory {
    type Err = CourseQaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "accessibility" => Ok(Self::Accessibility),
            "scorm" => Ok(Self::Scorm),
            "reliability" => Ok(Self::Reliability),
            other => Err(CourseQaError::Other(format!("unknown issue category: {other}"))),
        }
    }
}

/// Issue severity, ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    /// Cosmetic or informational.
    Low,
    /// Should be fixed before delivery.
    Medium,
    /// Blocks a good learner experience.
    High,
    /// Blocks delivery.
    Critical,
}

impl IssueSeverity {
    /// All severities from most to least severe.
    pub const ALL: [IssueSeverity; 4] = [Self::Critical, Self::High, Self::Medium, Self::Low];

    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Sort rank used by issue listings, higher is more severe.
    pub fn rank(&self) -> i32 {
        match self {
            Self::Critical => 4,
            Self::High => 3,
            Self::Medium => 2,
            Self::Low => 1,
        }
    }
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueSeverity {
    type Err = CourseQaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(CourseQaError::Other(format!("unknown issue severity: {other}"))),
        }
    }
}

/// A finding produced by a scanner before it is attached to a scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueDraft {
    /// Scanner family.
    pub category: IssueCategory,
    /// Severity bucket.
    pub severity: IssueSeverity,
    /// Stable detector identifier.
    pub rule_key: String,
    /// Short human-readable title.
    pub title: String,
    /// Longer explanation.
    pub detail: String,
    /// Raw evidence, when the detector has any.
    pub evidence: Option<String>,
    /// File inside the package.
    pub file_path: Option<String>,
    /// Line inside `file_path`.
    pub line_no: Option<i32>,
    /// CSS selector of the failing node.
    pub selector: Option<String>,
    /// Remediation hint or reference.
    pub fix_suggestion: Option<String>,
}

impl IssueDraft {
    /// Create a draft with the required fields.
    pub fn new(
        category: IssueCategory,
        severity: IssueSeverity,
        rule_key: impl Into<String>,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            rule_key: rule_key.into(),
            title: title.into(),
            detail: detail.into(),
            evidence: None,
            file_path: None,
            line_no: None,
            selector: None,
            fix_suggestion: None,
        }
    }

    /// Attach evidence.
    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }

    /// Attach a file location.
    pub fn with_file(mut self, file_path: impl Into<String>) -> Self {
        self.file_path = Some(file_path.into());
        self
    }

    /// Attach a node selector.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Attach a remediation hint.
    pub fn with_fix(mut self, fix_suggestion: impl Into<String>) -> Self {
        self.fix_suggestion = Some(fix_suggestion.into());
        self
    }
}

/// Lifecycle state of a scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Created, not started.
    Queued,
    /// Scanners are executing.
    Running,
    /// Issues and score are persisted.
    Completed,
    /// Aborted with an error.
    Failed,
}

impl ScanStatus {
    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed runs are immutable history.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for ScanStatus {
    type Err = CourseQaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CourseQaError::Other(format!("unknown scan status: {other}"))),
        }
    }
}

/// A course project owning packages and scan history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project identifier.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Kind of a stored project asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// A screenshot or other image.
    Image,
    /// Narration audio.
    Audio,
    /// A packaged course archive.
    Zip,
}

impl AssetKind {
    /// Stable storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Zip => "zip",
        }
    }
}

impl FromStr for AssetKind {
    type Err = CourseQaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "zip" => Ok(Self::Zip),
            other => Err(CourseQaError::Other(format!("unknown asset kind: {other}"))),
        }
    }
}

/// A stored project asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Asset identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Asset kind.
    pub kind: AssetKind,
    /// Object storage locator.
    pub file_path: String,
    /// MIME type of the stored bytes.
    pub mime_type: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Input for registering an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    /// Owning project.
    pub project_id: String,
    /// Asset kind.
    pub kind: AssetKind,
    /// Object storage locator.
    pub file_path: String,
    /// MIME type of the stored bytes.
    pub mime_type: String,
}

/// Pick the newest archive asset, the one scans and fixes operate on.
pub fn latest_zip_asset(assets: &[Asset]) -> Option<&Asset> {
    assets
        .iter()
        .filter(|asset| asset.kind == AssetKind::Zip)
        .max_by_key(|asset| asset.created_at)
}

/// One execution of the QA pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanRun {
    /// Run identifier.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Lifecycle state.
    pub status: ScanStatus,
    /// First time the run entered `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Time the run reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure message for failed runs.
    pub error_text: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ScanRun {
    /// Apply a status update. `started_at` is recorded once and never
    /// overwritten; terminal states stamp `finished_at`.
    pub fn transition(&mut self, status: ScanStatus, error_text: Option<String>, now: DateTime<Utc>) {
        if status == ScanStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = status;
        self.error_text = error_text;
    }
}

/// A persisted issue, scoped to one scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// Issue identifier.
    pub id: String,
    /// Owning scan run.
    pub scan_run_id: String,
    /// Owning project.
    pub project_id: String,
    /// Scanner family.
    pub category: IssueCategory,
    /// Severity bucket.
    pub severity: IssueSeverity,
    /// Stable detector identifier.
    pub rule_key: String,
    /// Short human-readable title.
    pub title: String,
    /// Longer explanation.
    pub detail: String,
    /// Raw evidence.
    pub evidence: Option<String>,
    /// File inside the package.
    pub file_path: Option<String>,
    /// Line inside `file_path`.
    pub line_no: Option<i32>,
    /// CSS selector of the failing node.
    pub selector: Option<String>,
    /// Remediation hint or reference.
    pub fix_suggestion: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Issue {
    /// Attach a draft to a run.
    pub fn from_draft(
        id: String,
        scan_run_id: &str,
        project_id: &str,
        draft: IssueDraft,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            scan_run_id: scan_run_id.to_string(),
            project_id: project_id.to_string(),
            category: draft.category,
            severity: draft.severity,
            rule_key: draft.rule_key,
            title: draft.title,
            detail: draft.detail,
            evidence: draft.evidence,
            file_path: draft.file_path,
            line_no: draft.line_no,
            selector: draft.selector,
            fix_suggestion: draft.fix_suggestion,
            created_at,
        }
    }
}

/// Input for persisting an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    /// Owning scan run.
    pub scan_run_id: String,
    /// Owning project.
    pub project_id: String,
    /// The finding.
    pub draft: IssueDraft,
}

/// Integer scores for one run, each in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    /// Weighted overall score.
    pub total_score: u8,
    /// Accessibility category score.
    pub accessibility_score: u8,
    /// Package structure category score.
    pub scorm_score: u8,
    /// Content reliability category score.
    pub reliability_score: u8,
}

/// Persisted scores keyed by scan run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
    /// Scored run.
    pub scan_run_id: String,
    /// Owning project.
    pub project_id: String,
    /// Weighted overall score.
    pub total_score: u8,
    /// Accessibility category score.
    pub accessibility_score: u8,
    /// Package structure category score.
    pub scorm_score: u8,
    /// Content reliability category score.
    pub reliability_score: u8,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ScoreSummary {
    /// The bare scores.
    pub fn scores(&self) -> Scores {
        Scores {
            total_score: self.total_score,
            accessibility_score: self.accessibility_score,
            scorm_score: self.scorm_score,
            reliability_score: self.reliability_score,
        }
    }
}
