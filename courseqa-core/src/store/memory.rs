//! In-process key-value backend.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use super::{IssueFilter, QaStore};
use crate::domain::{
    Asset, Issue, NewAsset, NewIssue, Project, ScanRun, ScanStatus, ScoreSummary, Scores,
};
use crate::error::{CourseQaError, Result};

#[derive(Debug, Default)]
struct MemoryState {
    projects: HashMap<String, Project>,
    // Insertion order doubles as creation order.
    assets: Vec<Asset>,
    runs: Vec<ScanRun>,
    issues: Vec<Issue>,
    scores: HashMap<String, ScoreSummary>,
}

/// A [`QaStore`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| CourseQaError::Store("memory store lock poisoned".to_string()))
    }
}

impl QaStore for MemoryStore {
    fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    fn create_project(&self, title: &str) -> Result<Project> {
        let project = Project {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.state()?
            .projects
            .insert(project.id.clone(), project.clone());
        Ok(project)
    }

    fn get_project(&self, id: &str) -> Result<Option<Project>> {
        Ok(self.state()?.projects.get(id).cloned())
    }

    fn list_assets(&self, project_id: &str) -> Result<Vec<Asset>> {
        Ok(self
            .state()?
            .assets
            .iter()
            .filter(|asset| asset.project_id == project_id)
            .cloned()
            .collect())
    }

    fn add_asset(&self, asset: NewAsset) -> Result<Asset> {
        let asset = Asset {
            id: Uuid::new_v4().to_string(),
            project_id: asset.project_id,
            kind: asset.kind,
            file_path: asset.file_path,
            mime_type: asset.mime_type,
            created_at: Utc::now(),
        };
        self.state()?.assets.push(asset.clone());
        Ok(asset)
    }

    fn get_asset(&self, id: &str) -> Result<Option<Asset>> {
        Ok(self
            .state()?
            .assets
            .iter()
            .find(|asset| asset.id == id)
            .cloned())
    }

    fn create_scan_run(&self, project_id: &str) -> Result<ScanRun> {
        let run = ScanRun {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            status: ScanStatus::Queued,
            started_at: None,
            finished_at: None,
            error_text: None,
            created_at: Utc::now(),
        };
        self.state()?.runs.push(run.clone());
        Ok(run)
    }

    fn update_scan_run_status(
        &self,
        id: &str,
        status: ScanStatus,
        error_text: Option<String>,
    ) -> Result<ScanRun> {
        let mut state = self.state()?;
        let run = state
            .runs
            .iter_mut()
            .find(|run| run.id == id)
            .ok_or_else(|| CourseQaError::NotFound(format!("Scan run not found: {id}")))?;
        run.transition(status, error_text, Utc::now());
        Ok(run.clone())
    }

    fn fail_if_active(&self, id: &str, error_text: String) -> Result<Option<ScanRun>> {
        let mut state = self.state()?;
        let Some(run) = state
            .runs
            .iter_mut()
            .find(|run| run.id == id && !run.status.is_terminal())
        else {
            return Ok(None);
        };
        run.transition(ScanStatus::Failed, Some(error_text), Utc::now());
        Ok(Some(run.clone()))
    }

    fn get_scan_run(&self, id: &str) -> Result<Option<ScanRun>> {
        Ok(self.state()?.runs.iter().find(|run| run.id == id).cloned())
    }

    fn latest_scan_run(&self, project_id: &str) -> Result<Option<ScanRun>> {
        Ok(self
            .state()?
            .runs
            .iter()
            .rev()
            .find(|run| run.project_id == project_id)
            .cloned())
    }

    fn list_scan_runs(&self, project_id: &str) -> Result<Vec<ScanRun>> {
        Ok(self
            .state()?
            .runs
            .iter()
            .rev()
            .filter(|run| run.project_id == project_id)
            .cloned()
            .collect())
    }

    fn add_issue(&self, issue: NewIssue) -> Result<Issue> {
        let issue = Issue::from_draft(
            Uuid::new_v4().to_string(),
            &issue.scan_run_id,
            &issue.project_id,
            issue.draft,
            Utc::now(),
        );
        self.state()?.issues.push(issue.clone());
        Ok(issue)
    }

    fn clear_issues_for_run(&self, scan_run_id: &str) -> Result<()> {
        self.state()?
            .issues
            .retain(|issue| issue.scan_run_id != scan_run_id);
        Ok(())
    }

    fn list_issues_for_run(&self, scan_run_id: &str) -> Result<Vec<Issue>> {
        let mut issues: Vec<Issue> = self
            .state()?
            .issues
            .iter()
            .filter(|issue| issue.scan_run_id == scan_run_id)
            .cloned()
            .collect();
        issues.sort_by_key(|issue| std::cmp::Reverse(issue.severity.rank()));
        Ok(issues)
    }

    fn list_issues_filtered(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let mut issues: Vec<Issue> = self
            .state()?
            .issues
            .iter()
            .rev()
            .filter(|issue| filter.matches(issue))
            .cloned()
            .collect();
        issues.sort_by_key(|issue| std::cmp::Reverse(issue.severity.rank()));
        Ok(issues
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect())
    }

    fn count_issues_filtered(&self, filter: &IssueFilter) -> Result<u64> {
        Ok(self
            .state()?
            .issues
            .iter()
            .filter(|issue| filter.matches(issue))
            .count() as u64)
    }

    fn upsert_score_summary(
        &self,
        project_id: &str,
        scan_run_id: &str,
        scores: Scores,
    ) -> Result<ScoreSummary> {
        let summary = ScoreSummary {
            scan_run_id: scan_run_id.to_string(),
            project_id: project_id.to_string(),
            total_score: scores.total_score,
            accessibility_score: scores.accessibility_score,
            scorm_score: scores.scorm_score,
            reliability_score: scores.reliability_score,
            created_at: Utc::now(),
        };
        self.state()?
            .scores
            .insert(scan_run_id.to_string(), summary.clone());
        Ok(summary)
    }

    fn get_score_summary(&self, scan_run_id: &str) -> Result<Option<ScoreSummary>> {
        Ok(self.state()?.scores.get(scan_run_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssetKind, IssueCategory, IssueDraft, IssueSeverity};

    fn draft(severity: IssueSeverity, title: &str) -> IssueDraft {
        IssueDraft::new(IssueCategory::Accessibility, severity, "axe.image-alt", title, "detail")
    }

    fn add(store: &MemoryStore, run: &ScanRun, severity: IssueSeverity, title: &str) -> Issue {
        store
            .add_issue(NewIssue {
                scan_run_id: run.id.clone(),
                project_id: run.project_id.clone(),
                draft: draft(severity, title),
            })
            .expect("add issue")
    }

    #[test]
    fn status_updates_keep_first_start_time() {
        let store = MemoryStore::new();
        let project = store.create_project("Onboarding").expect("project");
        let run = store.create_scan_run(&project.id).expect("run");
        assert_eq!(run.status, ScanStatus::Queued);

        let running = store
            .update_scan_run_status(&run.id, ScanStatus::Running, None)
            .expect("running");
        let started = running.started_at.expect("started");
        let again = store
            .update_scan_run_status(&run.id, ScanStatus::Running, None)
            .expect("running again");
        assert_eq!(again.started_at, Some(started));

        let failed = store
            .update_scan_run_status(&run.id, ScanStatus::Failed, Some("boom".to_string()))
            .expect("failed");
        assert_eq!(failed.started_at, Some(started));
        assert!(failed.finished_at.is_some());
        assert_eq!(failed.error_text.as_deref(), Some("boom"));

        assert!(matches!(
            store.update_scan_run_status("missing", ScanStatus::Running, None),
            Err(CourseQaError::NotFound(_))
        ));
    }

    #[test]
    fn fail_if_active_skips_terminal_runs() {
        let store = MemoryStore::new();
        let done = store.create_scan_run("p1").expect("run");
        store
            .update_scan_run_status(&done.id, ScanStatus::Completed, None)
            .expect("completed");
        assert!(store.fail_if_active(&done.id, "late".to_string()).expect("fail").is_none());
        let stored = store.get_scan_run(&done.id).expect("get").expect("present");
        assert_eq!(stored.status, ScanStatus::Completed);
        assert_eq!(stored.error_text, None);

        let queued = store.create_scan_run("p1").expect("run");
        let failed = store
            .fail_if_active(&queued.id, "boom".to_string())
            .expect("fail")
            .expect("transitioned");
        assert_eq!(failed.status, ScanStatus::Failed);
        assert_eq!(failed.error_text.as_deref(), Some("boom"));
        assert!(failed.finished_at.is_some());

        assert!(store.fail_if_active("missing", "boom".to_string()).expect("fail").is_none());
    }

    #[test]
    fn runs_are_listed_newest_first() {
        let store = MemoryStore::new();
        let first = store.create_scan_run("p1").expect("run");
        let second = store.create_scan_run("p1").expect("run");
        store.create_scan_run("p2").expect("other project");

        let ids: Vec<_> = store
            .list_scan_runs("p1")
            .expect("runs")
            .into_iter()
            .map(|run| run.id)
            .collect();
        assert_eq!(ids, vec![second.id.clone(), first.id]);
        assert_eq!(store.latest_scan_run("p1").expect("latest").map(|run| run.id), Some(second.id));
    }

    #[test]
    fn clearing_one_run_leaves_other_runs_intact() {
        let store = MemoryStore::new();
        let run_a = store.create_scan_run("p1").expect("run");
        let run_b = store.create_scan_run("p1").expect("run");
        let a = add(&store, &run_a, IssueSeverity::Low, "a");
        let b = add(&store, &run_b, IssueSeverity::Low, "b");
        assert_ne!(a.id, b.id);

        store.clear_issues_for_run(&run_a.id).expect("clear");
        assert!(store.list_issues_for_run(&run_a.id).expect("list").is_empty());
        assert_eq!(store.list_issues_for_run(&run_b.id).expect("list"), vec![b]);
    }

    #[test]
    fn issue_ordering_follows_severity_then_creation() {
        let store = MemoryStore::new();
        let run = store.create_scan_run("p1").expect("run");
        add(&store, &run, IssueSeverity::Low, "low-1");
        add(&store, &run, IssueSeverity::Critical, "critical-1");
        add(&store, &run, IssueSeverity::Low, "low-2");
        add(&store, &run, IssueSeverity::Critical, "critical-2");

        let titles = |issues: Vec<Issue>| issues.into_iter().map(|issue| issue.title).collect::<Vec<_>>();
        assert_eq!(
            titles(store.list_issues_for_run(&run.id).expect("list")),
            vec!["critical-1", "critical-2", "low-1", "low-2"]
        );

        let filter = IssueFilter::new("p1").with_page(Some(3), Some(0));
        assert_eq!(
            titles(store.list_issues_filtered(&filter).expect("filtered")),
            vec!["critical-2", "critical-1", "low-2"]
        );
        assert_eq!(store.count_issues_filtered(&filter).expect("count"), 4);

        let next = IssueFilter::new("p1").with_page(Some(3), Some(3));
        assert_eq!(
            titles(store.list_issues_filtered(&next).expect("filtered")),
            vec!["low-1"]
        );
    }

    #[test]
    fn score_summary_is_replaced_on_upsert() {
        let store = MemoryStore::new();
        let scores = |total| Scores {
            total_score: total,
            accessibility_score: 100,
            scorm_score: 100,
            reliability_score: 100,
        };
        store.upsert_score_summary("p1", "r1", scores(80)).expect("upsert");
        store.upsert_score_summary("p1", "r1", scores(95)).expect("upsert");
        let summary = store.get_score_summary("r1").expect("get").expect("summary");
        assert_eq!(summary.total_score, 95);
        assert!(store.get_score_summary("r2").expect("get").is_none());
    }

    #[test]
    fn assets_are_listed_in_creation_order() {
        let store = MemoryStore::new();
        for name in ["a.zip", "b.png"] {
            store
                .add_asset(NewAsset {
                    project_id: "p1".to_string(),
                    kind: if name.ends_with(".zip") { AssetKind::Zip } else { AssetKind::Image },
                    file_path: name.to_string(),
                    mime_type: "application/octet-stream".to_string(),
                })
                .expect("asset");
        }
        let assets = store.list_assets("p1").expect("assets");
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[0].file_path, "a.zip");
        let fetched = store.get_asset(&assets[1].id).expect("get").expect("asset");
        assert_eq!(fetched.kind, AssetKind::Image);
    }
}
