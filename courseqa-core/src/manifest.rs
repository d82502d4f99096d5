//! Structural checks for SCORM packages.
//!
//! The validator never fails: every problem it can detect becomes an
//! [`IssueDraft`] in the `scorm` category.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{IssueCategory, IssueDraft, IssueSeverity};
use crate::package::{LAUNCH_FILE, MANIFEST_FILE, ManifestText, PackageListing};

static SCORM_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)adlcp:scormtype").expect("valid pattern"));

static LAUNCH_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']index\.html["']"#).expect("valid pattern")
});

/// Validate a package listing. `None` means no package exists yet.
pub fn validate_package(listing: Option<&PackageListing>) -> Vec<IssueDraft> {
    let Some(listing) = listing else {
        return vec![
            scorm_issue(
                IssueSeverity::High,
                "scorm.package.missing",
                "SCORM zip package not found",
                "No zip asset found in this project. Upload a SCORM/HTML zip package for compliance scan.",
            )
            .with_fix("Upload a course package zip and rerun scan."),
        ];
    };

    let mut issues = Vec::new();
    match &listing.manifest {
        None => issues.push(
            scorm_issue(
                IssueSeverity::Critical,
                "scorm.manifest.missing",
                "imsmanifest.xml is missing",
                "SCORM package does not include imsmanifest.xml.",
            )
            .with_file(MANIFEST_FILE)
            .with_fix("Regenerate package with a valid SCORM manifest."),
        ),
        Some(ManifestText::Text(text)) => issues.extend(check_manifest_text(text)),
        Some(ManifestText::Unreadable(reason)) => issues.push(
            scorm_issue(
                IssueSeverity::High,
                "scorm.manifest.parse_failed",
                "Failed to parse manifest",
                "imsmanifest.xml exists but could not be parsed as text.",
            )
            .with_file(MANIFEST_FILE)
            .with_evidence(reason.clone()),
        ),
    }

    if !listing.entry_names.contains(LAUNCH_FILE) {
        issues.push(
            scorm_issue(
                IssueSeverity::Critical,
                "scorm.launch.index_missing",
                "index.html launch file is missing",
                "SCORM package does not include index.html.",
            )
            .with_file(LAUNCH_FILE)
            .with_fix("Include a launchable index.html in package root."),
        );
    }

    issues
}

fn check_manifest_text(text: &str) -> Vec<IssueDraft> {
    let mut issues = Vec::new();
    if !SCORM_TYPE.is_match(text) {
        issues.push(
            scorm_issue(
                IssueSeverity::High,
                "scorm.manifest.scormtype_missing",
                "adlcp:scormtype attribute is missing",
                "Manifest does not explicitly mark resource as SCO asset.",
            )
            .with_file(MANIFEST_FILE)
            .with_fix("Add adlcp:scormtype='sco' to launch resource."),
        );
    }
    if !LAUNCH_HREF.is_match(text) {
        issues.push(
            scorm_issue(
                IssueSeverity::High,
                "scorm.manifest.launch_missing",
                "Launch href is not index.html",
                "Manifest launch target could not be validated as index.html.",
            )
            .with_file(MANIFEST_FILE)
            .with_fix("Ensure launch resource href points to index.html."),
        );
    }
    issues
}

fn scorm_issue(severity: IssueSeverity, rule_key: &str, title: &str, detail: &str) -> IssueDraft {
    IssueDraft::new(IssueCategory::Scorm, severity, rule_key, title, detail)
}
