//! Storage ports.
//!
//! [`QaStore`] persists projects, assets, scan runs, issues and scores.
//! [`ObjectStorage`] holds the binary artifacts those records point at. The
//! scan, score and fix logic only ever sees these traits.

mod local;
mod memory;

pub use local::LocalObjectStorage;
pub use memory::MemoryStore;

use crate::domain::{
    Asset, Issue, IssueCategory, IssueSeverity, NewAsset, NewIssue, Project, ScanRun, ScanStatus,
    ScoreSummary, Scores,
};
use crate::error::Result;

/// Default page size of issue listings.
pub const DEFAULT_ISSUE_LIMIT: u32 = 50;
/// Largest page size of issue listings.
pub const MAX_ISSUE_LIMIT: u32 = 200;

/// Persistence port for QA records.
pub trait QaStore: Send + Sync {
    /// Prepare the backing schema. Safe to call more than once.
    fn ensure_schema(&self) -> Result<()>;

    /// Create a project.
    fn create_project(&self, title: &str) -> Result<Project>;
    /// Look up a project.
    fn get_project(&self, id: &str) -> Result<Option<Project>>;

    /// Assets of a project, oldest first.
    fn list_assets(&self, project_id: &str) -> Result<Vec<Asset>>;
    /// Register an asset.
    fn add_asset(&self, asset: NewAsset) -> Result<Asset>;
    /// Look up an asset.
    fn get_asset(&self, id: &str) -> Result<Option<Asset>>;

    /// Create a run in the `queued` state.
    fn create_scan_run(&self, project_id: &str) -> Result<ScanRun>;
    /// Move a run to `status`, see [`ScanRun::transition`].
    fn update_scan_run_status(
        &self,
        id: &str,
        status: ScanStatus,
        error_text: Option<String>,
    ) -> Result<ScanRun>;
    /// Fail a run only while it is still `queued` or `running`. The check and
    /// the write are atomic. Returns `None` when the run is missing or
    /// already terminal.
    fn fail_if_active(&self, id: &str, error_text: String) -> Result<Option<ScanRun>>;
    /// Look up a run.
    fn get_scan_run(&self, id: &str) -> Result<Option<ScanRun>>;
    /// Newest run of a project.
    fn latest_scan_run(&self, project_id: &str) -> Result<Option<ScanRun>>;
    /// Runs of a project, newest first.
    fn list_scan_runs(&self, project_id: &str) -> Result<Vec<ScanRun>>;

    /// Persist an issue.
    fn add_issue(&self, issue: NewIssue) -> Result<Issue>;
    /// Delete every issue of one run.
    fn clear_issues_for_run(&self, scan_run_id: &str) -> Result<()>;
    /// Issues of a run, most severe first, then oldest first.
    fn list_issues_for_run(&self, scan_run_id: &str) -> Result<Vec<Issue>>;
    /// One page of filtered issues, most severe first, then newest first.
    fn list_issues_filtered(&self, filter: &IssueFilter) -> Result<Vec<Issue>>;
    /// Number of issues matching a filter, ignoring pagination.
    fn count_issues_filtered(&self, filter: &IssueFilter) -> Result<u64>;

    /// Insert or replace the score of a run.
    fn upsert_score_summary(
        &self,
        project_id: &str,
        scan_run_id: &str,
        scores: Scores,
    ) -> Result<ScoreSummary>;
    /// Score of a run.
    fn get_score_summary(&self, scan_run_id: &str) -> Result<Option<ScoreSummary>>;
}

/// Binary artifact storage.
#[cfg_attr(test, mockall::automock)]
pub trait ObjectStorage: Send + Sync {
    /// Read an object by locator.
    fn read(&self, locator: &str) -> Result<Vec<u8>>;
    /// Store an object and return its locator.
    fn write(
        &self,
        category: &str,
        project_id: &str,
        file_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String>;
    /// Locator a named object would have.
    fn locate(&self, category: &str, project_id: &str, file_name: &str) -> String;
}

/// Issue listing filter with clamped pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFilter {
    /// Owning project.
    pub project_id: String,
    /// Restrict to one run.
    pub scan_run_id: Option<String>,
    /// Restrict to one category.
    pub category: Option<IssueCategory>,
    /// Restrict to one severity.
    pub severity: Option<IssueSeverity>,
    /// Substring of title, detail or rule key.
    pub query: Option<String>,
    limit: u32,
    offset: u32,
}

impl IssueFilter {
    /// Every issue of a project, first page.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            scan_run_id: None,
            category: None,
            severity: None,
            query: None,
            limit: DEFAULT_ISSUE_LIMIT,
            offset: 0,
        }
    }

    /// Set pagination. The limit is clamped to `1..=200`, the offset to `>= 0`.
    pub fn with_page(mut self, limit: Option<i64>, offset: Option<i64>) -> Self {
        self.limit = limit
            .map(|limit| limit.clamp(1, i64::from(MAX_ISSUE_LIMIT)) as u32)
            .unwrap_or(DEFAULT_ISSUE_LIMIT);
        self.offset = offset
            .map(|offset| offset.clamp(0, i64::from(u32::MAX)) as u32)
            .unwrap_or(0);
        self
    }

    /// Page size.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Page start.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// The trimmed query, if non-empty.
    pub fn query_text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|query| !query.is_empty())
    }

    /// Whether an issue passes every filter except pagination.
    pub fn matches(&self, issue: &Issue) -> bool {
        if issue.project_id != self.project_id {
            return false;
        }
        if self
            .scan_run_id
            .as_deref()
            .is_some_and(|run| issue.scan_run_id != run)
        {
            return false;
        }
        if self.category.is_some_and(|category| issue.category != category) {
            return false;
        }
        if self.severity.is_some_and(|severity| issue.severity != severity) {
            return false;
        }
        match self.query_text() {
            None => true,
            Some(query) => {
                let needle = query.to_lowercase();
                [&issue.title, &issue.detail, &issue.rule_key]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }
}
