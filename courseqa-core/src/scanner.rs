//! One pass of every scanner over a course archive.

use std::sync::Arc;

use crate::accessibility::{AccessibilityScanner, engine_for};
use crate::config::ScanConfig;
use crate::domain::{IssueCategory, IssueDraft, IssueSeverity};
use crate::error::Result;
use crate::fs::StdFileSystem;
use crate::manifest::validate_package;
use crate::package::{CoursePackage, ScratchSpace};
use crate::reliability::{OpenAiAuditor, ReliabilityAuditor, ReliabilityScanner};
use crate::scoring::{ScoreComputation, compute_quality_score};

/// Findings and score of one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    /// Findings in scanner order: manifest, accessibility, reliability.
    pub issues: Vec<IssueDraft>,
    /// Score derived from `issues`.
    pub score: ScoreComputation,
}

/// Runs the manifest, accessibility and reliability scanners.
#[derive(Clone)]
pub struct QualityScanner {
    accessibility: AccessibilityScanner,
    reliability: ReliabilityScanner,
    scratch: ScratchSpace,
}

impl QualityScanner {
    /// Assemble a scanner from its parts.
    pub fn new(
        accessibility: AccessibilityScanner,
        reliability: ReliabilityScanner,
        scratch: ScratchSpace,
    ) -> Self {
        Self {
            accessibility,
            reliability,
            scratch,
        }
    }

    /// Build the configured engine and auditor.
    ///
    /// Creates a blocking HTTP client when an auditor is configured, so it
    /// must not be called from inside an async runtime.
    pub fn from_config(config: &ScanConfig) -> Self {
        let auditor = config
            .auditor
            .clone()
            .map(|settings| Arc::new(OpenAiAuditor::new(settings)) as Arc<dyn ReliabilityAuditor>);
        let accessibility = AccessibilityScanner::new(engine_for(&config.engine), config.limits);
        let reliability =
            ReliabilityScanner::new(auditor, Arc::new(StdFileSystem::new()), config.limits);
        Self::new(accessibility, reliability, config.scratch.clone())
    }

    /// Scan an archive. `None` scans a project with no package.
    ///
    /// Scanner failures become issues. Archive errors are returned.
    pub fn scan(&self, project_id: &str, archive: Option<Vec<u8>>) -> Result<ScanOutcome> {
        let (mut issues, extracted) = match archive {
            Some(bytes) => {
                let mut package = CoursePackage::open(bytes)?;
                let listing = package.listing();
                let issues = validate_package(Some(&listing));
                let extracted = package.extract(&self.scratch, "courseqa-scan-")?;
                (issues, Some(extracted))
            }
            None => (validate_package(None), None),
        };
        let markup = extracted
            .as_ref()
            .map(|package| package.markup_files())
            .unwrap_or_default();

        match self.accessibility.scan(markup) {
            Ok(found) => issues.extend(found),
            Err(err) => {
                log::warn!("accessibility scan failed for {project_id}: {err}");
                issues.push(IssueDraft::new(
                    IssueCategory::Accessibility,
                    IssueSeverity::Medium,
                    "a11y.scan.engine_failed",
                    "Accessibility scan engine failed",
                    err.to_string(),
                ));
            }
        }

        match self.reliability.scan(project_id, markup) {
            Ok(found) => issues.extend(found),
            Err(err) => {
                log::warn!("reliability scan failed for {project_id}: {err}");
                issues.push(IssueDraft::new(
                    IssueCategory::Reliability,
                    IssueSeverity::Medium,
                    "reliability.scan.failed",
                    "Reliability scan failed",
                    err.to_string(),
                ));
            }
        }
        drop(extracted);

        let score = compute_quality_score(issues.iter().map(|issue| (issue.category, issue.severity)));
        log::info!(
            "scan of {project_id} found {} issues, total score {}",
            issues.len(),
            score.scores.total_score
        );
        Ok(ScanOutcome { issues, score })
    }
}
