//! Content reliability audit.
//!
//! Markup is reduced to plain text and handed to an external text auditor
//! that answers with a structured report. The auditor is an optional
//! capability: without a credential the scan records a skipped issue and
//! moves on.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::accessibility::base_name;
use crate::config::{ScanLimits, env_parse};
use crate::domain::{IssueCategory, IssueDraft, IssueSeverity};
use crate::error::{CourseQaError, Result};
use crate::fs::FileSystem;

const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const INSTRUCTIONS: &str = "You are a content reliability auditor for eLearning QA. \
Return output strictly as JSON by provided schema. \
Flag potentially unsupported claims, numeric statements without evidence, and risky compliance wording. \
If no notable issues exist, return empty flags array.";

static SCRIPT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script>").expect("valid pattern"));
static STYLE_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style>").expect("valid pattern"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid pattern"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid pattern"));

/// Reduce markup to collapsed plain text without script or style content.
pub fn strip_markup(markup: &str) -> String {
    let text = SCRIPT_BLOCK.replace_all(markup, " ");
    let text = STYLE_BLOCK.replace_all(&text, " ");
    let text = TAG.replace_all(&text, " ");
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Plain text of one markup file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Base name of the source file.
    pub file: String,
    /// Truncated plain text.
    pub text: String,
}

/// Everything submitted to the auditor in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRequest {
    /// Project the snippets belong to.
    pub project_id: String,
    /// Snippets in file order.
    pub snippets: Vec<Snippet>,
}

impl AuditRequest {
    /// Prompt text: the project id followed by one block per file.
    pub fn prompt(&self) -> String {
        let blocks = self
            .snippets
            .iter()
            .map(|snippet| format!("FILE:{}\n{}", snippet.file, snippet.text))
            .collect::<Vec<_>>()
            .join("\n\n---\n\n");
        format!("project_id={}\n{blocks}", self.project_id)
    }
}

/// Structured answer of the auditor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilityReport {
    /// One-line assessment.
    #[serde(default)]
    pub summary: String,
    /// Individual findings.
    #[serde(default)]
    pub flags: Vec<ReliabilityFlag>,
}

/// One auditor finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReliabilityFlag {
    /// Severity assigned by the auditor.
    pub severity: IssueSeverity,
    /// Short title.
    pub title: String,
    /// Explanation.
    pub detail: String,
    /// Quoted source text.
    pub evidence: String,
    /// Source file, empty when unknown.
    pub file: String,
    /// Suggested rewording.
    pub fix_suggestion: String,
}

/// An external text auditor.
#[cfg_attr(test, mockall::automock)]
pub trait ReliabilityAuditor: Send + Sync {
    /// Submit snippets and return the raw structured output, if any.
    fn audit(&self, request: &AuditRequest) -> Result<Option<String>>;
}

/// Settings for [`OpenAiAuditor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditorConfig {
    /// Bearer credential.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// API base URL without the trailing endpoint.
    pub base_url: String,
    /// Extra attempts after a transport failure or server error.
    pub retries: u32,
}

impl AuditorConfig {
    /// Read the auditor settings. Returns `None` when no API key is set.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())?;
        let model = ["OPENAI_MODEL_QA", "OPENAI_MODEL"]
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Some(Self {
            api_key: api_key.trim().to_string(),
            model,
            base_url,
            retries: env_parse("COURSEQA_AUDITOR_RETRIES", 2),
        })
    }
}

/// Auditor backed by the OpenAI Responses API.
#[derive(Debug, Clone)]
pub struct OpenAiAuditor {
    config: AuditorConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesReply {
    fn text(self) -> String {
        if let Some(text) = self.output_text.filter(|text| !text.is_empty()) {
            return text;
        }
        self.output
            .into_iter()
            .flat_map(|item| item.content)
            .filter(|content| content.kind == "output_text")
            .filter_map(|content| content.text)
            .collect()
    }
}

impl OpenAiAuditor {
    /// Build an auditor. Must not be called from inside an async runtime.
    pub fn new(config: AuditorConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    fn report_schema() -> serde_json::Value {
        let severity = serde_json::json!({
            "type": "string",
            "enum": ["critical", "high", "medium", "low"],
        });
        serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["summary", "flags"],
            "properties": {
                "summary": { "type": "string" },
                "flags": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["severity", "title", "detail", "evidence", "file", "fix_suggestion"],
                        "properties": {
                            "severity": severity,
                            "title": { "type": "string" },
                            "detail": { "type": "string" },
                            "evidence": { "type": "string" },
                            "file": { "type": "string" },
                            "fix_suggestion": { "type": "string" },
                        },
                    },
                },
            },
        })
    }
}

impl ReliabilityAuditor for OpenAiAuditor {
    fn audit(&self, request: &AuditRequest) -> Result<Option<String>> {
        let url = format!("{}/responses", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "instructions": INSTRUCTIONS,
            "input": [{
                "role": "user",
                "content": [{ "type": "input_text", "text": request.prompt() }],
            }],
            "text": {
                "format": {
                    "type": "json_schema",
                    "name": "reliability_report",
                    "strict": true,
                    "schema": Self::report_schema(),
                },
            },
        });

        let mut attempt = 0;
        let response = loop {
            attempt += 1;
            let outcome = self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send();
            let retryable = match &outcome {
                Ok(response) => response.status().is_server_error(),
                Err(err) => !err.is_builder(),
            };
            if retryable && attempt <= self.config.retries {
                log::warn!("reliability auditor attempt {attempt} failed, retrying");
                continue;
            }
            break outcome?;
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(CourseQaError::External(format!(
                "reliability auditor error ({status}): {body}"
            )));
        }
        let reply: ResponsesReply = response.json()?;
        let text = reply.text();
        Ok((!text.trim().is_empty()).then_some(text))
    }
}

/// Runs the reliability audit over package markup.
#[derive(Clone)]
pub struct ReliabilityScanner {
    auditor: Option<Arc<dyn ReliabilityAuditor>>,
    fs: Arc<dyn FileSystem + Send + Sync>,
    limits: ScanLimits,
}

impl ReliabilityScanner {
    /// Create a scanner. `None` disables the audit.
    pub fn new(
        auditor: Option<Arc<dyn ReliabilityAuditor>>,
        fs: Arc<dyn FileSystem + Send + Sync>,
        limits: ScanLimits,
    ) -> Self {
        Self {
            auditor,
            fs,
            limits,
        }
    }

    /// Audit up to the configured number of markup files.
    pub fn scan(&self, project_id: &str, files: &[PathBuf]) -> Result<Vec<IssueDraft>> {
        let Some(auditor) = &self.auditor else {
            return Ok(vec![reliability_issue(
                IssueSeverity::Low,
                "reliability.scan.skipped_no_api_key",
                "Reliability scan skipped",
                "OPENAI_API_KEY is missing, so reliability scan was not executed.",
            )]);
        };

        let mut snippets = Vec::new();
        for file in files.iter().take(self.limits.max_files) {
            let markup = match self.fs.read_to_string(file) {
                Ok(markup) => markup,
                Err(err) => {
                    log::warn!("skipping unreadable markup {}: {err}", file.display());
                    continue;
                }
            };
            let text: String = strip_markup(&markup)
                .chars()
                .take(self.limits.snippet_chars)
                .collect();
            if !text.is_empty() {
                snippets.push(Snippet {
                    file: base_name(file),
                    text,
                });
            }
        }
        if snippets.is_empty() {
            return Ok(vec![reliability_issue(
                IssueSeverity::Low,
                "reliability.scan.no_content",
                "No textual content found",
                "No readable content was found for reliability validation.",
            )]);
        }

        let request = AuditRequest {
            project_id: project_id.to_string(),
            snippets,
        };
        let Some(output) = auditor.audit(&request)?.filter(|text| !text.trim().is_empty()) else {
            return Ok(vec![empty_output()]);
        };
        let report: ReliabilityReport = match serde_json::from_str(&output) {
            Ok(report) => report,
            Err(err) => {
                log::warn!("reliability auditor returned unparseable output: {err}");
                return Ok(vec![empty_output().with_evidence(err.to_string())]);
            }
        };
        log::info!(
            "reliability audit for project {project_id} returned {} flags",
            report.flags.len()
        );
        Ok(report.flags.into_iter().map(flag_issue).collect())
    }
}

fn flag_issue(flag: ReliabilityFlag) -> IssueDraft {
    let mut issue = reliability_issue(flag.severity, "reliability.flag", &flag.title, &flag.detail)
        .with_evidence(flag.evidence)
        .with_fix(flag.fix_suggestion);
    if !flag.file.trim().is_empty() {
        issue = issue.with_file(flag.file);
    }
    issue
}

fn empty_output() -> IssueDraft {
    reliability_issue(
        IssueSeverity::Low,
        "reliability.scan.empty_output",
        "Reliability scan returned empty output",
        "Model returned no output_text.",
    )
}

fn reliability_issue(
    severity: IssueSeverity,
    rule_key: &str,
    title: &str,
    detail: &str,
) -> IssueDraft {
    IssueDraft::new(IssueCategory::Reliability, severity, rule_key, title, detail)
}
