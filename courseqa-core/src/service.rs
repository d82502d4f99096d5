//! Project-scoped QA operations over the storage ports.
//!
//! [`QaService`] drives the scan run state machine, records findings and
//! scores, and produces the fix and VPAT artifacts. Every method blocks.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::autofix::{AutoFixer, FixCounts};
use crate::domain::{
    Asset, AssetKind, Issue, NewAsset, NewIssue, Project, ScanRun, ScanStatus, ScoreSummary,
    latest_zip_asset,
};
use crate::error::{CourseQaError, Result};
use crate::history::{RunComparison, RunWithScore, compare_runs};
use crate::package::CoursePackage;
use crate::scanner::QualityScanner;
use crate::scoring::{ScoreMeta, compute_quality_score};
use crate::store::{IssueFilter, ObjectStorage, QaStore};
use crate::vpat::{VpatInput, render_vpat};

const ZIP_CONTENT_TYPE: &str = "application/zip";
const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Result of a completed scan run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// The run in its final state.
    pub scan_run: ScanRun,
    /// Persisted findings, most severe first.
    pub issues: Vec<Issue>,
    /// Persisted score.
    pub score: ScoreSummary,
    /// How the score was derived.
    pub score_meta: ScoreMeta,
}

/// A stored run with its findings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanSnapshot {
    /// The run, `None` when the project has none.
    pub scan_run: Option<ScanRun>,
    /// Findings of the run.
    pub issues: Vec<Issue>,
    /// Score of the run, if recorded.
    pub score: Option<ScoreSummary>,
    /// Score derivation recomputed from `issues`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_meta: Option<ScoreMeta>,
}

/// One page of filtered issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssuePage {
    /// The page.
    pub issues: Vec<Issue>,
    /// Matches across all pages.
    pub total: u64,
    /// Effective page size.
    pub limit: u32,
    /// Effective page start.
    pub offset: u32,
}

/// Result of an auto-fix invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixRunResult {
    /// Asset registered for the fixed archive.
    pub zip_asset_id: String,
    /// Download path of the fixed archive.
    pub zip_download_url: String,
    /// Download path of the diff document.
    pub diff_download_url: String,
    /// Number of documents that changed.
    pub changed_files: usize,
    /// Fixes per rule family.
    pub total_fixes: FixCounts,
    /// Stored name of the fixed archive.
    pub fixed_zip_name: String,
    /// Stored name of the diff document.
    pub diff_name: String,
}

/// A generated VPAT draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VpatDraft {
    /// Stored name of the draft.
    pub file_name: String,
    /// Download path of the draft.
    pub download_url: String,
}

/// A downloadable stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    /// Base name offered to the client.
    pub file_name: String,
    /// MIME type.
    pub content_type: String,
    /// Contents.
    pub bytes: Vec<u8>,
}

/// QA operations for projects held in a [`QaStore`].
#[derive(Clone)]
pub struct QaService {
    store: Arc<dyn QaStore>,
    storage: Arc<dyn ObjectStorage>,
    scanner: QualityScanner,
    fixer: AutoFixer,
}

impl QaService {
    /// Create a service over the given ports.
    pub fn new(
        store: Arc<dyn QaStore>,
        storage: Arc<dyn ObjectStorage>,
        scanner: QualityScanner,
        fixer: AutoFixer,
    ) -> Self {
        Self {
            store,
            storage,
            scanner,
            fixer,
        }
    }

    /// The record store.
    pub fn store(&self) -> &Arc<dyn QaStore> {
        &self.store
    }

    /// Create a project.
    pub fn create_project(&self, title: &str) -> Result<Project> {
        let title = title.trim();
        if title.is_empty() {
            return Err(CourseQaError::Precondition("title is required".to_string()));
        }
        let project = self.store.create_project(title)?;
        log::info!("created project {}", project.id);
        Ok(project)
    }

    /// Look up a project, failing with "Project not found".
    pub fn require_project(&self, project_id: &str) -> Result<Project> {
        self.store
            .get_project(project_id)?
            .ok_or_else(|| CourseQaError::NotFound("Project not found".to_string()))
    }

    /// Store an uploaded archive and register it as the newest package.
    pub fn upload_package(&self, project_id: &str, bytes: Vec<u8>) -> Result<Asset> {
        self.require_project(project_id)?;
        if let Err(err) = CoursePackage::open(bytes.clone()) {
            return Err(CourseQaError::Precondition(format!(
                "Uploaded file is not a zip archive: {err}"
            )));
        }
        let file_name = format!("package-{}.zip", Utc::now().timestamp_millis());
        let locator =
            self.storage
                .write("assets", project_id, &file_name, &bytes, ZIP_CONTENT_TYPE)?;
        self.store.add_asset(NewAsset {
            project_id: project_id.to_string(),
            kind: AssetKind::Zip,
            file_path: locator,
            mime_type: ZIP_CONTENT_TYPE.to_string(),
        })
    }

    /// Read an asset and its bytes.
    pub fn read_asset(&self, asset_id: &str) -> Result<(Asset, Vec<u8>)> {
        let asset = self
            .store
            .get_asset(asset_id)?
            .ok_or_else(|| CourseQaError::NotFound("Asset not found".to_string()))?;
        let bytes = self.storage.read(&asset.file_path)?;
        Ok((asset, bytes))
    }

    fn latest_package(&self, project_id: &str) -> Result<Option<Vec<u8>>> {
        let assets = self.store.list_assets(project_id)?;
        match latest_zip_asset(&assets) {
            Some(asset) => Ok(Some(self.storage.read(&asset.file_path)?)),
            None => Ok(None),
        }
    }

    /// Run one scan to completion.
    ///
    /// On failure the run is marked `failed` with the error message, unless
    /// it already reached a terminal state, and the error is returned.
    pub fn execute_scan(&self, project_id: &str) -> Result<ScanReport> {
        self.require_project(project_id)?;
        let run = self.store.create_scan_run(project_id)?;
        log::info!("scan run {} queued for project {project_id}", run.id);

        match self.run_scan(&run) {
            Ok(report) => Ok(report),
            Err(err) => {
                log::error!("scan run {} failed: {err}", run.id);
                self.mark_failed(&run.id, &err);
                Err(err)
            }
        }
    }

    fn run_scan(&self, run: &ScanRun) -> Result<ScanReport> {
        self.store
            .update_scan_run_status(&run.id, ScanStatus::Running, None)?;
        self.store.clear_issues_for_run(&run.id)?;

        let archive = self.latest_package(&run.project_id)?;
        let outcome = self.scanner.scan(&run.project_id, archive)?;
        for draft in outcome.issues {
            self.store.add_issue(NewIssue {
                scan_run_id: run.id.clone(),
                project_id: run.project_id.clone(),
                draft,
            })?;
        }
        let score =
            self.store
                .upsert_score_summary(&run.project_id, &run.id, outcome.score.scores)?;
        let scan_run = self
            .store
            .update_scan_run_status(&run.id, ScanStatus::Completed, None)?;
        log::info!(
            "scan run {} completed with total score {}",
            run.id,
            score.total_score
        );

        Ok(ScanReport {
            scan_run,
            issues: self.store.list_issues_for_run(&run.id)?,
            score,
            score_meta: outcome.score.meta,
        })
    }

    fn mark_failed(&self, run_id: &str, err: &CourseQaError) {
        match self.store.fail_if_active(run_id, err.to_string()) {
            Ok(Some(_)) => {}
            Ok(None) => log::debug!("scan run {run_id} already settled, keeping its status"),
            Err(update) => log::warn!("could not mark scan run {run_id} failed: {update}"),
        }
    }

    /// A specific run, or the latest one, with its findings.
    pub fn scan_snapshot(&self, project_id: &str, scan_run_id: Option<&str>) -> Result<ScanSnapshot> {
        self.require_project(project_id)?;
        let run = match scan_run_id.filter(|id| !id.is_empty()) {
            Some(id) => self.store.get_scan_run(id)?,
            None => self.store.latest_scan_run(project_id)?,
        };
        let Some(run) = run else {
            return Ok(ScanSnapshot::default());
        };
        if run.project_id != project_id {
            return Err(CourseQaError::Precondition(
                "Scan run does not belong to this project".to_string(),
            ));
        }

        let issues = self.store.list_issues_for_run(&run.id)?;
        let score = self.store.get_score_summary(&run.id)?;
        let meta = compute_quality_score(issues.iter().map(|issue| (issue.category, issue.severity))).meta;
        Ok(ScanSnapshot {
            scan_run: Some(run),
            issues,
            score,
            score_meta: Some(meta),
        })
    }

    /// Every run of a project with its score, newest first.
    pub fn scan_history(&self, project_id: &str) -> Result<Vec<RunWithScore>> {
        self.require_project(project_id)?;
        self.store
            .list_scan_runs(project_id)?
            .into_iter()
            .map(|run| {
                let score = self.store.get_score_summary(&run.id)?;
                Ok(RunWithScore { run, score })
            })
            .collect()
    }

    /// Compare the active run against the latest other scored run.
    pub fn compare(&self, project_id: &str, active: Option<&str>) -> Result<RunComparison> {
        let history = self.scan_history(project_id)?;
        Ok(compare_runs(&history, active))
    }

    /// One page of filtered issues.
    pub fn list_issues(&self, filter: &IssueFilter) -> Result<IssuePage> {
        self.require_project(&filter.project_id)?;
        Ok(IssuePage {
            issues: self.store.list_issues_filtered(filter)?,
            total: self.store.count_issues_filtered(filter)?,
            limit: filter.limit(),
            offset: filter.offset(),
        })
    }

    /// Fix the newest package and store the fixed archive and its diff.
    pub fn run_auto_fix(&self, project_id: &str) -> Result<FixRunResult> {
        self.require_project(project_id)?;
        let archive = self
            .latest_package(project_id)?
            .ok_or_else(|| CourseQaError::Precondition("No zip asset found to fix".to_string()))?;
        let outcome = self.fixer.fix_archive(archive)?;

        let stamp = Utc::now().timestamp_millis();
        let fixed_zip_name = format!("qa-fix-{project_id}-{stamp}.zip");
        let diff_name = format!("qa-fix-{project_id}-{stamp}.diff.txt");
        let locator = self.storage.write(
            "qa",
            project_id,
            &fixed_zip_name,
            &outcome.archive,
            ZIP_CONTENT_TYPE,
        )?;
        self.storage.write(
            "qa",
            project_id,
            &diff_name,
            outcome.diff.as_bytes(),
            TEXT_CONTENT_TYPE,
        )?;
        let asset = self.store.add_asset(NewAsset {
            project_id: project_id.to_string(),
            kind: AssetKind::Zip,
            file_path: locator,
            mime_type: ZIP_CONTENT_TYPE.to_string(),
        })?;
        log::info!("auto-fix stored {fixed_zip_name} as asset {}", asset.id);

        Ok(FixRunResult {
            zip_download_url: format!("/api/assets/{}", asset.id),
            diff_download_url: format!(
                "/api/projects/{project_id}/fix?download=1&file={}",
                urlencoding::encode(&diff_name)
            ),
            zip_asset_id: asset.id,
            changed_files: outcome.changed_files,
            total_fixes: outcome.counts,
            fixed_zip_name,
            diff_name,
        })
    }

    /// Read a stored fix artifact by name.
    pub fn resolve_fix_artifact(&self, project_id: &str, file: &str) -> Result<StoredArtifact> {
        let file_name = base_name(file);
        if !file_name.starts_with(&format!("qa-fix-{project_id}-")) {
            return Err(CourseQaError::Precondition("Invalid artifact filename".to_string()));
        }
        let content_type = if file_name.ends_with(".zip") {
            ZIP_CONTENT_TYPE
        } else {
            TEXT_CONTENT_TYPE
        };
        let bytes = self
            .storage
            .read(&self.storage.locate("qa", project_id, file_name))?;
        Ok(StoredArtifact {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        })
    }

    /// Render and store a VPAT draft for the latest run.
    pub fn generate_vpat(&self, project_id: &str) -> Result<VpatDraft> {
        let project = self.require_project(project_id)?;
        let run = self.store.latest_scan_run(project_id)?.ok_or_else(|| {
            CourseQaError::Precondition("No scan run found. Run QA scan first.".to_string())
        })?;
        let score = self.store.get_score_summary(&run.id)?.ok_or_else(|| {
            CourseQaError::Precondition("No score summary found for latest scan.".to_string())
        })?;
        let issues = self.store.list_issues_for_run(&run.id)?;

        let generated_at = Utc::now();
        let markdown = render_vpat(&VpatInput {
            project_title: &project.title,
            project_id,
            scan_run_id: &run.id,
            generated_at,
            score: &score,
            issues: &issues,
        });
        let file_name = format!("vpat-{project_id}-{}.md", generated_at.timestamp_millis());
        self.storage.write(
            "vpat",
            project_id,
            &file_name,
            markdown.as_bytes(),
            MARKDOWN_CONTENT_TYPE,
        )?;

        Ok(VpatDraft {
            download_url: format!(
                "/api/projects/{project_id}/vpat?download=1&file={}",
                urlencoding::encode(&file_name)
            ),
            file_name,
        })
    }

    /// Read a stored VPAT draft by name.
    pub fn read_vpat(&self, project_id: &str, file: &str) -> Result<StoredArtifact> {
        let file_name = base_name(file);
        if !file_name.starts_with(&format!("vpat-{project_id}-")) || !file_name.ends_with(".md") {
            return Err(CourseQaError::Precondition("Invalid VPAT filename".to_string()));
        }
        let bytes = self
            .storage
            .read(&self.storage.locate("vpat", project_id, file_name))?;
        Ok(StoredArtifact {
            file_name: file_name.to_string(),
            content_type: MARKDOWN_CONTENT_TYPE.to_string(),
            bytes,
        })
    }
}

fn base_name(raw: &str) -> &str {
    raw.rsplit(['/', '\\']).next().unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessibility::{AccessibilityScanner, BuiltinEngine};
    use crate::config::ScanLimits;
    use crate::domain::{IssueCategory, IssueSeverity};
    use crate::fs::StdFileSystem;
    use crate::package::ScratchSpace;
    use crate::package::test_support::{valid_package, zip_bytes};
    use crate::reliability::ReliabilityScanner;
    use crate::store::{LocalObjectStorage, MemoryStore, MockObjectStorage};
    use tempfile::TempDir;

    const BROKEN_PAGE: &str = r#"<html><body><h3>Intro</h3><img src="a.png"><button></button></body></html>"#;

    struct Harness {
        service: QaService,
        store: Arc<MemoryStore>,
        scratch: TempDir,
        _objects: TempDir,
    }

    fn scanner(scratch: &ScratchSpace) -> QualityScanner {
        let limits = ScanLimits::default();
        QualityScanner::new(
            AccessibilityScanner::new(Arc::new(BuiltinEngine), limits),
            ReliabilityScanner::new(None, Arc::new(StdFileSystem::new()), limits),
            scratch.clone(),
        )
    }

    fn harness_with(storage: Option<Arc<dyn ObjectStorage>>) -> Harness {
        let scratch = tempfile::tempdir().expect("scratch");
        let objects = tempfile::tempdir().expect("objects");
        let space = ScratchSpace::within(scratch.path());
        let store = Arc::new(MemoryStore::new());
        let storage =
            storage.unwrap_or_else(|| Arc::new(LocalObjectStorage::new(objects.path())));
        let service = QaService::new(
            store.clone(),
            storage,
            scanner(&space),
            AutoFixer::new(space),
        );
        Harness {
            service,
            store,
            scratch,
            _objects: objects,
        }
    }

    fn harness() -> Harness {
        harness_with(None)
    }

    fn scratch_is_empty(harness: &Harness) -> bool {
        std::fs::read_dir(harness.scratch.path())
            .map(|entries| entries.count() == 0)
            .unwrap_or(true)
    }

    #[test]
    fn scan_without_package_completes_with_missing_package_issue() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");

        let report = h.service.execute_scan(&project.id).expect("scan");
        assert_eq!(report.scan_run.status, ScanStatus::Completed);
        assert!(report.scan_run.started_at.is_some());
        assert!(report.scan_run.finished_at.is_some());
        assert_eq!(report.issues[0].rule_key, "scorm.package.missing");
        assert_eq!(report.score.scan_run_id, report.scan_run.id);
        assert_eq!(report.score.scorm_score, 88);
    }

    #[test]
    fn unknown_projects_are_not_found() {
        let h = harness();
        let err = h.service.execute_scan("nope").expect_err("missing project");
        assert!(matches!(err, CourseQaError::NotFound(_)));
        assert_eq!(err.to_string(), "Project not found");
        assert!(h.store.list_scan_runs("nope").expect("runs").is_empty());
    }

    #[test]
    fn blank_titles_are_rejected() {
        let h = harness();
        assert!(matches!(
            h.service.create_project("   "),
            Err(CourseQaError::Precondition(_))
        ));
    }

    #[test]
    fn uploads_must_be_archives() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        assert!(matches!(
            h.service.upload_package(&project.id, b"plain text".to_vec()),
            Err(CourseQaError::Precondition(_))
        ));

        let asset = h
            .service
            .upload_package(&project.id, valid_package("<html lang=\"en\"></html>"))
            .expect("upload");
        let (stored, bytes) = h.service.read_asset(&asset.id).expect("read asset");
        assert_eq!(stored.kind, AssetKind::Zip);
        assert!(!bytes.is_empty());
    }

    #[test]
    fn corrupt_package_marks_run_failed() {
        let objects = tempfile::tempdir().expect("objects");
        let storage = Arc::new(LocalObjectStorage::new(objects.path()));
        let h = harness_with(Some(storage.clone()));
        let project = h.service.create_project("Safety 101").expect("project");
        let locator = storage
            .write("assets", &project.id, "bad.zip", b"not a zip", ZIP_CONTENT_TYPE)
            .expect("write");
        h.store
            .add_asset(NewAsset {
                project_id: project.id.clone(),
                kind: AssetKind::Zip,
                file_path: locator,
                mime_type: ZIP_CONTENT_TYPE.to_string(),
            })
            .expect("asset");

        let err = h.service.execute_scan(&project.id).expect_err("corrupt archive");
        assert!(matches!(err, CourseQaError::Archive(_)));

        let run = h
            .store
            .latest_scan_run(&project.id)
            .expect("latest")
            .expect("run");
        assert_eq!(run.status, ScanStatus::Failed);
        assert_eq!(run.error_text, Some(err.to_string()));
        assert!(h.store.get_score_summary(&run.id).expect("score").is_none());
        assert!(scratch_is_empty(&h));
    }

    #[test]
    fn late_failure_does_not_overwrite_completed_run() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        let run = h.store.create_scan_run(&project.id).expect("run");
        h.store
            .update_scan_run_status(&run.id, ScanStatus::Completed, None)
            .expect("completed");

        h.service
            .mark_failed(&run.id, &CourseQaError::Store("late".to_string()));
        let stored = h.store.get_scan_run(&run.id).expect("get").expect("run");
        assert_eq!(stored.status, ScanStatus::Completed);
        assert_eq!(stored.error_text, None);
    }

    #[test]
    fn storage_read_failures_mark_run_failed() {
        let mut storage = MockObjectStorage::new();
        storage
            .expect_read()
            .returning(|_| Err(CourseQaError::Store("bucket offline".to_string())));
        let h = harness_with(Some(Arc::new(storage)));
        let project = h.service.create_project("Safety 101").expect("project");
        h.store
            .add_asset(NewAsset {
                project_id: project.id.clone(),
                kind: AssetKind::Zip,
                file_path: "assets/p/x.zip".to_string(),
                mime_type: ZIP_CONTENT_TYPE.to_string(),
            })
            .expect("asset");

        assert!(h.service.execute_scan(&project.id).is_err());
        let run = h
            .store
            .latest_scan_run(&project.id)
            .expect("latest")
            .expect("run");
        assert_eq!(run.status, ScanStatus::Failed);
        assert_eq!(run.error_text.as_deref(), Some("store error: bucket offline"));
    }

    #[test]
    fn snapshot_handles_missing_and_foreign_runs() {
        let h = harness();
        let project = h.service.create_project("A").expect("project");
        let other = h.service.create_project("B").expect("project");

        let empty = h.service.scan_snapshot(&project.id, None).expect("snapshot");
        assert_eq!(empty, ScanSnapshot::default());
        let json = serde_json::to_value(&empty).expect("json");
        assert_eq!(json, serde_json::json!({"scanRun": null, "issues": [], "score": null}));

        let foreign = h.service.execute_scan(&other.id).expect("scan");
        assert!(matches!(
            h.service
                .scan_snapshot(&project.id, Some(&foreign.scan_run.id)),
            Err(CourseQaError::Precondition(_))
        ));

        let own = h.service.execute_scan(&project.id).expect("scan");
        let snapshot = h.service.scan_snapshot(&project.id, None).expect("snapshot");
        assert_eq!(snapshot.scan_run.map(|run| run.id), Some(own.scan_run.id));
        assert_eq!(snapshot.issues, own.issues);
        assert_eq!(snapshot.score_meta, Some(own.score_meta));
    }

    #[test]
    fn fix_then_rescan_improves_accessibility() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        h.service
            .upload_package(&project.id, valid_package(BROKEN_PAGE))
            .expect("upload");
        let before = h.service.execute_scan(&project.id).expect("first scan");

        let fix = h.service.run_auto_fix(&project.id).expect("fix");
        assert_eq!(fix.changed_files, 1);
        assert_eq!(fix.total_fixes.img_alt_added, 1);
        assert_eq!(fix.total_fixes.button_aria_label_added, 1);
        assert_eq!(fix.total_fixes.heading_adjusted, 1);
        assert_eq!(fix.zip_download_url, format!("/api/assets/{}", fix.zip_asset_id));
        assert!(fix.diff_download_url.ends_with(&fix.diff_name));
        assert!(scratch_is_empty(&h));

        let diff = h
            .service
            .resolve_fix_artifact(&project.id, &format!("../../{}", fix.diff_name))
            .expect("diff");
        assert_eq!(diff.content_type, TEXT_CONTENT_TYPE);
        assert!(String::from_utf8_lossy(&diff.bytes).starts_with("# Auto Fix Summary"));
        let zip = h
            .service
            .resolve_fix_artifact(&project.id, &fix.fixed_zip_name)
            .expect("zip");
        assert_eq!(zip.content_type, ZIP_CONTENT_TYPE);

        let after = h.service.execute_scan(&project.id).expect("rescan");
        assert!(after.score.accessibility_score > before.score.accessibility_score);

        let comparison = h.service.compare(&project.id, None).expect("compare");
        assert_eq!(
            comparison.current.map(|entry| entry.run.id),
            Some(after.scan_run.id)
        );
        let delta = comparison.delta.expect("delta");
        assert_eq!(
            delta.total,
            i32::from(after.score.total_score) - i32::from(before.score.total_score)
        );
    }

    #[test]
    fn fix_preconditions_are_client_errors() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        let err = h.service.run_auto_fix(&project.id).expect_err("no package");
        assert_eq!(err.to_string(), "No zip asset found to fix");
        assert!(err.is_client_error());

        h.service
            .upload_package(&project.id, zip_bytes(&[("readme.txt", b"hello")]))
            .expect("upload");
        let err = h.service.run_auto_fix(&project.id).expect_err("no markup");
        assert_eq!(err.to_string(), "No HTML files in zip. Nothing to auto-fix.");
        assert!(scratch_is_empty(&h));
    }

    #[test]
    fn artifact_names_are_scoped_to_the_project() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        for name in ["qa-fix-other-1.zip", "secrets.txt"] {
            let err = h
                .service
                .resolve_fix_artifact(&project.id, name)
                .expect_err("invalid");
            assert_eq!(err.to_string(), "Invalid artifact filename");
        }
        let missing = format!("qa-fix-{}-1.zip", project.id);
        assert!(matches!(
            h.service.resolve_fix_artifact(&project.id, &missing),
            Err(CourseQaError::NotFound(_))
        ));
        assert!(matches!(
            h.service
                .read_vpat(&project.id, &format!("vpat-{}-1.txt", project.id)),
            Err(CourseQaError::Precondition(_))
        ));
    }

    #[test]
    fn vpat_requires_a_scored_run() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        let err = h.service.generate_vpat(&project.id).expect_err("no run");
        assert_eq!(err.to_string(), "No scan run found. Run QA scan first.");

        h.store.create_scan_run(&project.id).expect("run");
        let err = h.service.generate_vpat(&project.id).expect_err("no score");
        assert_eq!(err.to_string(), "No score summary found for latest scan.");
    }

    #[test]
    fn vpat_draft_is_stored_and_readable() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        h.service
            .upload_package(&project.id, valid_package(BROKEN_PAGE))
            .expect("upload");
        h.service.execute_scan(&project.id).expect("scan");

        let draft = h.service.generate_vpat(&project.id).expect("vpat");
        assert!(draft.file_name.starts_with(&format!("vpat-{}-", project.id)));
        assert_eq!(
            draft.download_url,
            format!(
                "/api/projects/{}/vpat?download=1&file={}",
                project.id, draft.file_name
            )
        );

        let stored = h.service.read_vpat(&project.id, &draft.file_name).expect("read");
        let text = String::from_utf8(stored.bytes).expect("utf8");
        assert!(text.contains("- Product: Safety 101"));
        assert!(text.contains("| WCAG 2.1 Level A | Does Not Support |"));
    }

    #[test]
    fn issue_listing_is_filtered_and_paginated() {
        let h = harness();
        let project = h.service.create_project("Safety 101").expect("project");
        h.service
            .upload_package(&project.id, valid_package(BROKEN_PAGE))
            .expect("upload");
        let report = h.service.execute_scan(&project.id).expect("scan");

        let mut filter = IssueFilter::new(&project.id).with_page(Some(1), Some(0));
        filter.category = Some(IssueCategory::Accessibility);
        let page = h.service.list_issues(&filter).expect("page");
        let accessibility = report
            .issues
            .iter()
            .filter(|issue| issue.category == IssueCategory::Accessibility)
            .count() as u64;
        assert_eq!(page.total, accessibility);
        assert_eq!(page.issues.len(), 1);
        assert_eq!(page.limit, 1);
        assert_eq!(page.issues[0].severity, IssueSeverity::Critical);

        let history = h.service.scan_history(&project.id).expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].score.as_ref().map(|s| s.total_score), Some(report.score.total_score));
    }
}
