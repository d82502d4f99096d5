//! In-process DOM rules.
//!
//! Covers the subset of WCAG 2.x level A checks that can be decided from
//! static markup. Rule ids and impacts follow the axe naming so issues from
//! either engine share rule keys.

use std::collections::HashSet;
use std::path::Path;

use scraper::{ElementRef, Html};

use super::{AccessibilityEngine, EvaluationSandbox, Violation, ViolationNode};
use crate::dom::{css_path, non_blank_attr, selector, trimmed_text};
use crate::error::Result;

const HELP_BASE: &str = "https://dequeuniversity.com/rules/axe/4.10";

struct DomRule {
    id: &'static str,
    impact: &'static str,
    tags: &'static [&'static str],
    help: &'static str,
    description: &'static str,
    failure_summary: &'static str,
    check: fn(&Html) -> Result<Vec<String>>,
}

const RULES: &[DomRule] = &[
    DomRule {
        id: "image-alt",
        impact: "critical",
        tags: &["wcag2a", "wcag111"],
        help: "Images must have alternative text",
        description: "Ensures <img> elements have alternate text or a role of none or presentation",
        failure_summary: "Element does not have an alt attribute",
        check: images_without_alt,
    },
    DomRule {
        id: "button-name",
        impact: "critical",
        tags: &["wcag2a", "wcag412"],
        help: "Buttons must have discernible text",
        description: "Ensures buttons have discernible text",
        failure_summary: "Element does not have inner text that is visible to screen readers",
        check: buttons_without_name,
    },
    DomRule {
        id: "label",
        impact: "critical",
        tags: &["wcag2a", "wcag412"],
        help: "Form elements must have labels",
        description: "Ensures every form element has a label",
        failure_summary: "Form element does not have an implicit or explicit label",
        check: controls_without_label,
    },
    DomRule {
        id: "link-name",
        impact: "serious",
        tags: &["wcag2a", "wcag244", "wcag412"],
        help: "Links must have discernible text",
        description: "Ensures links have discernible text",
        failure_summary: "Element is in tab order and does not have accessible text",
        check: links_without_name,
    },
    DomRule {
        id: "html-has-lang",
        impact: "serious",
        tags: &["wcag2a", "wcag311"],
        help: "<html> element must have a lang attribute",
        description: "Ensures every HTML document has a lang attribute",
        failure_summary: "The <html> element does not have a lang attribute",
        check: html_without_lang,
    },
    DomRule {
        id: "document-title",
        impact: "serious",
        tags: &["wcag2a", "wcag242"],
        help: "Documents must have <title> element to aid in navigation",
        description: "Ensures each HTML document contains a non-empty <title> element",
        failure_summary: "Document does not have a non-empty <title> element",
        check: document_without_title,
    },
];

/// Accessibility engine evaluating static markup in process.
#[derive(Debug, Default, Clone)]
pub struct BuiltinEngine;

impl BuiltinEngine {
    /// Create the engine.
    pub fn new() -> Self {
        Self
    }
}

impl AccessibilityEngine for BuiltinEngine {
    fn launch(&self) -> Result<Box<dyn EvaluationSandbox>> {
        Ok(Box::new(BuiltinSandbox))
    }
}

struct BuiltinSandbox;

impl EvaluationSandbox for BuiltinSandbox {
    fn evaluate(&mut self, document: &Path, tags: &[String]) -> Result<Vec<Violation>> {
        let bytes = std::fs::read(document)?;
        let html = Html::parse_document(&String::from_utf8_lossy(&bytes));
        evaluate_markup(&html, tags)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn evaluate_markup(html: &Html, tags: &[String]) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for rule in RULES {
        if !rule.tags.iter().any(|tag| tags.iter().any(|wanted| wanted == tag)) {
            continue;
        }
        let targets = (rule.check)(html)?;
        if targets.is_empty() {
            continue;
        }
        violations.push(Violation {
            id: rule.id.to_string(),
            impact: Some(rule.impact.to_string()),
            help: Some(rule.help.to_string()),
            description: Some(rule.description.to_string()),
            help_url: Some(format!("{HELP_BASE}/{}", rule.id)),
            nodes: targets
                .into_iter()
                .map(|target| ViolationNode {
                    failure_summary: Some(rule.failure_summary.to_string()),
                    target: vec![serde_json::Value::String(target)],
                })
                .collect(),
        });
    }
    Ok(violations)
}

fn has_aria_name(element: ElementRef<'_>) -> bool {
    let value = element.value();
    non_blank_attr(value, "aria-label").is_some() || non_blank_attr(value, "aria-labelledby").is_some()
}

fn is_presentational(element: ElementRef<'_>) -> bool {
    matches!(
        element.value().attr("role").map(str::trim),
        Some("none") | Some("presentation")
    )
}

fn images_without_alt(html: &Html) -> Result<Vec<String>> {
    let images = selector("img")?;
    Ok(html
        .select(&images)
        .filter(|img| img.value().attr("alt").is_none())
        .filter(|img| !has_aria_name(*img) && !is_presentational(*img))
        .map(css_path)
        .collect())
}

fn buttons_without_name(html: &Html) -> Result<Vec<String>> {
    let buttons = selector("button")?;
    Ok(html
        .select(&buttons)
        .filter(|button| {
            trimmed_text(*button).is_empty()
                && !has_aria_name(*button)
                && non_blank_attr(button.value(), "title").is_none()
        })
        .map(css_path)
        .collect())
}

fn controls_without_label(html: &Html) -> Result<Vec<String>> {
    let labels = selector("label[for]")?;
    let labelled: HashSet<&str> = html
        .select(&labels)
        .filter_map(|label| non_blank_attr(label.value(), "for"))
        .collect();

    let controls = selector("input, select, textarea")?;
    Ok(html
        .select(&controls)
        .filter(|control| {
            let value = control.value();
            let kind = value.attr("type").unwrap_or("text").trim().to_ascii_lowercase();
            if value.name() == "input"
                && matches!(kind.as_str(), "hidden" | "submit" | "button" | "reset" | "image")
            {
                return false;
            }
            if has_aria_name(*control) || non_blank_attr(value, "title").is_some() {
                return false;
            }
            if value.id().is_some_and(|id| labelled.contains(id)) {
                return false;
            }
            !control
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|ancestor| ancestor.value().name() == "label")
        })
        .map(css_path)
        .collect())
}

fn links_without_name(html: &Html) -> Result<Vec<String>> {
    let links = selector("a[href]")?;
    let images = selector("img[alt]")?;
    Ok(html
        .select(&links)
        .filter(|link| {
            let has_image_text = link
                .select(&images)
                .any(|img| non_blank_attr(img.value(), "alt").is_some());
            trimmed_text(*link).is_empty()
                && !has_image_text
                && !has_aria_name(*link)
                && non_blank_attr(link.value(), "title").is_none()
        })
        .map(css_path)
        .collect())
}

fn html_without_lang(html: &Html) -> Result<Vec<String>> {
    let root = html.root_element();
    if non_blank_attr(root.value(), "lang").is_some() {
        return Ok(Vec::new());
    }
    Ok(vec![css_path(root)])
}

fn document_without_title(html: &Html) -> Result<Vec<String>> {
    let titles = selector("head title")?;
    let has_title = html
        .select(&titles)
        .any(|title| !trimmed_text(title).is_empty());
    Ok(if has_title {
        Vec::new()
    } else {
        vec![css_path(html.root_element())]
    })
}
