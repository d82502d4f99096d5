//! Rule-based remediation of course packages.
//!
//! The fixer extracts an archive, rewrites every markup document with the
//! configured [`FixRule`]s, repackages the tree and produces a unified diff
//! of the changed documents.

mod rules;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use scraper::Html;
use serde::{Deserialize, Serialize};
use similar::TextDiff;
use utoipa::ToSchema;

pub use rules::{
    ButtonNameRule, ControlLabelRule, HeadingLevelRule, ImageAltRule, build_rules, default_rules,
};

use crate::error::{CourseQaError, Result};
use crate::fs::{FileSystem, StdFileSystem};
use crate::package::{CoursePackage, ScratchSpace, repackage};

/// Precondition message when an archive holds no markup.
pub const NO_MARKUP_MESSAGE: &str = "No HTML files in zip. Nothing to auto-fix.";

/// The rule family a fix belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixKind {
    /// Image alternative text.
    ImgAlt,
    /// Button accessible name.
    ButtonAriaLabel,
    /// Form control accessible name.
    InputAriaLabel,
    /// Heading level renormalization.
    HeadingLevel,
}

/// A DOM rewrite applied to every markup document.
pub trait FixRule {
    /// Family the rule counts towards.
    fn kind(&self) -> FixKind;
    /// Rewrite the document in place, returning the number of changes.
    fn apply(&self, html: &mut Html) -> Result<u32>;
}

/// Fix counts per rule family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FixCounts {
    /// Images given a placeholder `alt`.
    pub img_alt_added: u32,
    /// Buttons given an `aria-label`.
    pub button_aria_label_added: u32,
    /// Form controls given an `aria-label`.
    pub input_aria_label_added: u32,
    /// Headings whose level changed.
    pub heading_adjusted: u32,
}

impl FixCounts {
    /// Add `count` fixes of one family.
    pub fn record(&mut self, kind: FixKind, count: u32) {
        match kind {
            FixKind::ImgAlt => self.img_alt_added += count,
            FixKind::ButtonAriaLabel => self.button_aria_label_added += count,
            FixKind::InputAriaLabel => self.input_aria_label_added += count,
            FixKind::HeadingLevel => self.heading_adjusted += count,
        }
    }

    /// Sum two count sets.
    pub fn merge(&mut self, other: &FixCounts) {
        self.img_alt_added += other.img_alt_added;
        self.button_aria_label_added += other.button_aria_label_added;
        self.input_aria_label_added += other.input_aria_label_added;
        self.heading_adjusted += other.heading_adjusted;
    }

    /// Total number of fixes.
    pub fn total(&self) -> u32 {
        self.img_alt_added
            + self.button_aria_label_added
            + self.input_aria_label_added
            + self.heading_adjusted
    }
}

/// Outcome of fixing one markup document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupFix {
    /// Whether the output differs from the input.
    pub changed: bool,
    /// Reserialized document.
    pub after: String,
    /// Fixes applied.
    pub counts: FixCounts,
}

/// Apply `rules` in order to one document.
///
/// The document is always reserialized. It counts as changed iff the
/// serialized output differs from the input, even when no rule applied.
pub fn fix_markup(content: &str, rules: &[Arc<dyn FixRule + Send + Sync>]) -> Result<MarkupFix> {
    let mut html = Html::parse_document(content);
    let mut counts = FixCounts::default();
    for rule in rules {
        let applied = rule.apply(&mut html)?;
        counts.record(rule.kind(), applied);
    }

    let after = html.html();
    Ok(MarkupFix {
        changed: after != content,
        after,
        counts,
    })
}

/// A changed document, as shown in the diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    /// `/`-separated path relative to the package root.
    pub rel_path: String,
    /// Original text.
    pub before: String,
    /// Rewritten text.
    pub after: String,
}

/// Render the diff document: a count summary followed by one patch per file.
pub fn build_diff_text(changed: &[ChangedFile], summary: &FixCounts) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Auto Fix Summary");
    let _ = writeln!(output, "- img alt added: {}", summary.img_alt_added);
    let _ = writeln!(
        output,
        "- button aria-label added: {}",
        summary.button_aria_label_added
    );
    let _ = writeln!(
        output,
        "- input/select/textarea aria-label added: {}",
        summary.input_aria_label_added
    );
    let _ = writeln!(output, "- heading adjusted: {}", summary.heading_adjusted);
    output.push('\n');

    let patches = changed
        .iter()
        .map(|file| {
            let diff = TextDiff::from_lines(file.before.as_str(), file.after.as_str());
            let patch = diff
                .unified_diff()
                .context_radius(2)
                .header(
                    &format!("{}\tbefore", file.rel_path),
                    &format!("{}\tafter", file.rel_path),
                )
                .to_string();
            format!("{}\n{patch}", "=".repeat(67))
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    output.push_str(&patches);
    output
}

/// Result of fixing a whole archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixOutcome {
    /// The repackaged archive.
    pub archive: Vec<u8>,
    /// Diff document.
    pub diff: String,
    /// Fixes summed over changed files.
    pub counts: FixCounts,
    /// Number of documents that changed.
    pub changed_files: usize,
}

/// Applies fix rules to course archives.
#[derive(Clone)]
pub struct AutoFixer {
    rules: Vec<Arc<dyn FixRule + Send + Sync>>,
    fs: Arc<dyn FileSystem + Send + Sync>,
    scratch: ScratchSpace,
}

impl AutoFixer {
    /// A fixer with every built-in rule.
    pub fn new(scratch: ScratchSpace) -> Self {
        Self::with_rules(default_rules(), scratch)
    }

    /// A fixer with a specific rule set.
    pub fn with_rules(rules: Vec<Arc<dyn FixRule + Send + Sync>>, scratch: ScratchSpace) -> Self {
        Self {
            rules,
            fs: Arc::new(StdFileSystem::new()),
            scratch,
        }
    }

    /// Fix every markup document of an archive.
    ///
    /// Fails with a precondition error when the archive holds no markup.
    /// The scratch directory is removed on every path.
    pub fn fix_archive(&self, bytes: Vec<u8>) -> Result<FixOutcome> {
        let mut package = CoursePackage::open(bytes)?;
        let extracted = package.extract(&self.scratch, "courseqa-fix-")?;
        if extracted.markup_files().is_empty() {
            return Err(CourseQaError::Precondition(NO_MARKUP_MESSAGE.to_string()));
        }

        let mut changed = Vec::new();
        let mut counts = FixCounts::default();
        for file in extracted.markup_files() {
            let before = self.fs.read_to_string(file)?;
            let fix = fix_markup(&before, &self.rules)?;
            if !fix.changed {
                continue;
            }
            self.fs.write(file, &fix.after)?;
            counts.merge(&fix.counts);
            changed.push(ChangedFile {
                rel_path: relative_name(extracted.root(), file),
                before,
                after: fix.after,
            });
        }

        let archive = repackage(extracted.root())?;
        let diff = build_diff_text(&changed, &counts);
        log::info!(
            "auto-fix changed {} files with {} fixes",
            changed.len(),
            counts.total()
        );
        Ok(FixOutcome {
            archive,
            diff,
            counts,
            changed_files: changed.len(),
        })
    }
}

fn relative_name(root: &Path, file: &Path) -> String {
    let relative = file.strip_prefix(root).unwrap_or(file);
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::test_support::zip_bytes;
    use std::io::Read;

    const LESSON: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><title>Lesson</title></head>
<body>
<h2>Intro</h2>
<img src="hero.png">
<button></button>
<input placeholder="Your answer">
<p>Body copy</p>
</body>
</html>
"#;

    fn scratch() -> (tempfile::TempDir, ScratchSpace) {
        let root = tempfile::tempdir().expect("scratch root");
        let scratch = ScratchSpace::within(root.path());
        (root, scratch)
    }

    fn read_entry(archive: &[u8], name: &str) -> String {
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(archive.to_vec())).expect("zip");
        let mut entry = zip.by_name(name).expect("entry");
        let mut text = String::new();
        entry.read_to_string(&mut text).expect("read entry");
        text
    }

    #[test]
    fn fix_markup_reports_parser_normalization_as_a_change() {
        let fragment = "<p>Nothing to fix here</p>";
        let fix = fix_markup(fragment, &default_rules()).expect("fix");
        assert_eq!(fix.counts, FixCounts::default());
        assert!(fix.changed);
        assert_eq!(
            fix.after,
            "<html><head></head><body><p>Nothing to fix here</p></body></html>"
        );

        let canonical = fix.after.clone();
        let again = fix_markup(&canonical, &default_rules()).expect("fix again");
        assert!(!again.changed);
        assert_eq!(again.after, canonical);
    }

    #[test]
    fn fix_markup_output_is_stable_across_runs() {
        let markup = r#"<html lang="en"><body><img src="a.png" class="hero" data-x="1"><input id="q" type="text" name="query" placeholder="Search"><button class="b" type="button"></button></body></html>"#;
        let first = fix_markup(markup, &default_rules()).expect("first");
        for _ in 0..5 {
            let next = fix_markup(markup, &default_rules()).expect("next");
            assert_eq!(next.after, first.after);
        }
        assert!(first
            .after
            .contains(r#"<img src="a.png" class="hero" data-x="1" alt="Image">"#));
        assert!(first.after.contains(
            r#"<input id="q" type="text" name="query" placeholder="Search" aria-label="Search">"#
        ));
    }

    #[test]
    fn fix_archive_applies_every_rule_and_reports_diff() {
        let (_root, scratch) = scratch();
        let bytes = zip_bytes(&[
            ("imsmanifest.xml", b"<manifest/>"),
            ("index.html", LESSON.as_bytes()),
            ("lessons/clean.htm", b"<p>clean</p>"),
        ]);

        let outcome = AutoFixer::new(scratch).fix_archive(bytes).expect("fix");
        // clean.htm has no defects but still normalizes to a full document.
        assert_eq!(outcome.changed_files, 2);
        assert_eq!(
            outcome.counts,
            FixCounts {
                img_alt_added: 1,
                button_aria_label_added: 1,
                input_aria_label_added: 1,
                heading_adjusted: 1,
            }
        );

        assert!(outcome.diff.starts_with(
            "# Auto Fix Summary\n- img alt added: 1\n- button aria-label added: 1\n\
             - input/select/textarea aria-label added: 1\n- heading adjusted: 1\n\n"
        ));
        assert!(outcome.diff.contains("--- index.html\tbefore"));
        assert!(outcome.diff.contains("+++ index.html\tafter"));
        assert!(outcome.diff.contains("--- lessons/clean.htm\tbefore"));

        let fixed = read_entry(&outcome.archive, "index.html");
        assert!(fixed.contains(r#"alt="Image""#));
        assert!(fixed.contains(r#"aria-label="Action button""#));
        assert!(fixed.contains(r#"aria-label="Your answer""#));
        assert!(fixed.contains("<h1>Intro</h1>"));
        assert_eq!(
            read_entry(&outcome.archive, "lessons/clean.htm"),
            "<html><head></head><body><p>clean</p></body></html>"
        );
        assert_eq!(read_entry(&outcome.archive, "imsmanifest.xml"), "<manifest/>");
    }

    #[test]
    fn second_pass_adds_no_attribute_fixes() {
        let (_root, scratch) = scratch();
        let fixer = AutoFixer::new(scratch);
        let first = fixer
            .fix_archive(zip_bytes(&[("index.html", LESSON.as_bytes())]))
            .expect("first pass");
        let second = fixer.fix_archive(first.archive).expect("second pass");

        assert_eq!(second.counts.img_alt_added, 0);
        assert_eq!(second.counts.button_aria_label_added, 0);
        assert_eq!(second.counts.input_aria_label_added, 0);
        assert_eq!(second.changed_files, 0);
    }

    #[test]
    fn heading_renormalization_reflows_after_content_edits() {
        // Known characteristic: heading levels are recomputed from scratch on
        // every pass, so an edit between passes can shift already-fixed levels.
        let rules = default_rules();
        let first = fix_markup("<h2>Intro</h2><h3>Detail</h3>", &rules).expect("first");
        assert!(first.after.contains("<h1>Intro</h1>"));
        assert!(first.after.contains("<h2>Detail</h2>"));

        let edited = first.after.replacen("<h1>Intro</h1>", "<h2>Preface</h2><h1>Intro</h1>", 1);
        let second = fix_markup(&edited, &rules).expect("second");
        assert_eq!(second.counts.heading_adjusted, 2);
        assert!(second.after.contains("<h1>Preface</h1>"));
        assert!(second.after.contains("<h2>Intro</h2>"));
        assert!(second.after.contains("<h2>Detail</h2>"));
        assert_eq!(second.counts.img_alt_added, 0);
    }

    #[test]
    fn archive_without_markup_is_a_precondition_error() {
        let (root, scratch) = scratch();
        let bytes = zip_bytes(&[("imsmanifest.xml", b"<manifest/>")]);

        let result = AutoFixer::new(scratch).fix_archive(bytes);
        assert!(matches!(
            result,
            Err(CourseQaError::Precondition(message)) if message == NO_MARKUP_MESSAGE
        ));
        let leftovers = std::fs::read_dir(root.path()).expect("read scratch").count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn diff_uses_two_lines_of_context() {
        let before = "a\nb\nc\nd\ne\nf\ng\n".to_string();
        let after = "a\nb\nc\nD\ne\nf\ng\n".to_string();
        let diff = build_diff_text(
            &[ChangedFile {
                rel_path: "index.html".to_string(),
                before,
                after,
            }],
            &FixCounts::default(),
        );
        assert!(diff.contains("@@ -2,5 +2,5 @@"));
        assert!(diff.contains("-d\n+D\n"));
        assert!(!diff.contains(" a\n"));
    }
}
