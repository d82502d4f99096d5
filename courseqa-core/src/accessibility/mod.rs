//! Accessibility analysis of package markup.
//!
//! An [`AccessibilityEngine`] opens one [`EvaluationSandbox`] per scan. The
//! [`AccessibilityScanner`] feeds it a bounded number of markup files,
//! normalizes the reported violations into issues and always closes the
//! sandbox before returning.

mod builtin;
mod command;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use builtin::BuiltinEngine;
pub use command::{CommandEngine, CommandSpec};

use crate::config::{EngineChoice, ScanLimits};
use crate::domain::{IssueCategory, IssueDraft, IssueSeverity};
use crate::error::{CourseQaError, Result};

/// Standards tiers the engine is restricted to.
pub const WCAG_TAGS: [&str; 2] = ["wcag2a", "wcag2aa"];

/// A rule violation as reported by an accessibility engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Rule identifier.
    #[serde(default)]
    pub id: String,
    /// Impact level: critical, serious, moderate or minor.
    #[serde(default)]
    pub impact: Option<String>,
    /// Short help text.
    #[serde(default)]
    pub help: Option<String>,
    /// Rule description.
    #[serde(default)]
    pub description: Option<String>,
    /// Link to remediation guidance.
    #[serde(default)]
    pub help_url: Option<String>,
    /// Failing nodes.
    #[serde(default)]
    pub nodes: Vec<ViolationNode>,
}

/// One failing node of a violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationNode {
    /// Why the node fails.
    #[serde(default)]
    pub failure_summary: Option<String>,
    /// Selectors locating the node.
    #[serde(default)]
    pub target: Vec<serde_json::Value>,
}

/// Starts evaluation sandboxes.
#[cfg_attr(test, mockall::automock)]
pub trait AccessibilityEngine: Send + Sync {
    /// Open a sandbox. Returns [`CourseQaError::EngineUnavailable`] when the
    /// engine cannot run at all.
    fn launch(&self) -> Result<Box<dyn EvaluationSandbox>>;
}

/// An isolated environment evaluating one document at a time.
pub trait EvaluationSandbox {
    /// Evaluate one markup document against rules tagged with `tags`.
    fn evaluate(&mut self, document: &Path, tags: &[String]) -> Result<Vec<Violation>>;
    /// Release the sandbox.
    fn close(&mut self) -> Result<()>;
}

/// Build the engine selected by configuration.
pub fn engine_for(choice: &EngineChoice) -> Arc<dyn AccessibilityEngine> {
    match choice {
        EngineChoice::Builtin => Arc::new(BuiltinEngine::new()),
        EngineChoice::Command(spec) => Arc::new(CommandEngine::new(spec.clone())),
    }
}

/// Map an engine impact level onto the internal severity scale.
pub fn severity_for_impact(impact: Option<&str>) -> IssueSeverity {
    match impact {
        Some("critical") => IssueSeverity::Critical,
        Some("serious") => IssueSeverity::High,
        Some("moderate") => IssueSeverity::Medium,
        _ => IssueSeverity::Low,
    }
}

/// Drives an accessibility engine over package markup.
#[derive(Clone)]
pub struct AccessibilityScanner {
    engine: Arc<dyn AccessibilityEngine>,
    limits: ScanLimits,
}

impl AccessibilityScanner {
    /// Create a scanner over an engine.
    pub fn new(engine: Arc<dyn AccessibilityEngine>, limits: ScanLimits) -> Self {
        Self { engine, limits }
    }

    /// Scan markup files. Per-file failures become issues; only failures
    /// outside any single file are returned as errors.
    pub fn scan(&self, files: &[PathBuf]) -> Result<Vec<IssueDraft>> {
        if files.is_empty() {
            return Ok(vec![a11y_issue(
                "a11y.html.missing",
                "No HTML files to evaluate",
                "Accessibility scan skipped because no HTML files were found in package.",
            )]);
        }

        let mut sandbox = match self.engine.launch() {
            Ok(sandbox) => sandbox,
            Err(CourseQaError::EngineUnavailable(reason)) => {
                log::warn!("accessibility engine unavailable: {reason}");
                return Ok(vec![
                    a11y_issue(
                        "a11y.scan.engine_source_missing",
                        "Accessibility engine source unavailable",
                        "The accessibility rule engine could not be started in this runtime.",
                    )
                    .with_evidence(reason),
                ]);
            }
            Err(err) => return Err(err),
        };

        let tags: Vec<String> = WCAG_TAGS.iter().map(|tag| tag.to_string()).collect();
        let mut issues = Vec::new();
        for file in files.iter().take(self.limits.max_files) {
            let file_name = base_name(file);
            match sandbox.evaluate(file, &tags) {
                Ok(violations) => issues.extend(
                    violations
                        .iter()
                        .take(self.limits.max_violations)
                        .map(|violation| violation_issue(violation, &file_name)),
                ),
                Err(err) => {
                    log::warn!("accessibility scan failed for {file_name}: {err}");
                    issues.push(
                        a11y_issue(
                            "a11y.scan.file_failed",
                            "Failed to scan HTML file",
                            "Accessibility scan failed for one HTML file.",
                        )
                        .with_file(file_name)
                        .with_evidence(err.to_string()),
                    );
                }
            }
        }

        if let Err(err) = sandbox.close() {
            log::warn!("failed to close accessibility sandbox: {err}");
        }
        Ok(issues)
    }
}

fn violation_issue(violation: &Violation, file_name: &str) -> IssueDraft {
    let rule_id = if violation.id.is_empty() {
        "unknown"
    } else {
        violation.id.as_str()
    };
    let title = violation
        .help
        .clone()
        .or_else(|| (!violation.id.is_empty()).then(|| violation.id.clone()))
        .unwrap_or_else(|| "Accessibility violation".to_string());
    let detail = violation
        .description
        .clone()
        .unwrap_or_else(|| "Accessibility issue detected by the rule engine.".to_string());

    let mut issue = IssueDraft::new(
        IssueCategory::Accessibility,
        severity_for_impact(violation.impact.as_deref()),
        format!("axe.{rule_id}"),
        title,
        detail,
    )
    .with_file(file_name);

    if let Some(node) = violation.nodes.first() {
        if let Some(summary) = &node.failure_summary {
            issue = issue.with_evidence(summary.clone());
        }
        if let Some(target) = node.target.first() {
            issue = issue.with_selector(match target {
                serde_json::Value::String(selector) => selector.clone(),
                other => other.to_string(),
            });
        }
    }
    if let Some(help_url) = &violation.help_url {
        issue = issue.with_fix(help_url.clone());
    }
    issue
}

fn a11y_issue(rule_key: &str, title: &str, detail: &str) -> IssueDraft {
    IssueDraft::new(
        IssueCategory::Accessibility,
        IssueSeverity::Medium,
        rule_key,
        title,
        detail,
    )
}

pub(crate) fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
