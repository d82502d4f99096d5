//! Fix rule registry and the built-in DOM rules.

use std::collections::HashSet;
use std::sync::Arc;

use scraper::{ElementRef, Html, Node};

use super::{FixKind, FixRule};
use crate::dom::{non_blank_attr, rename, selector, set_attribute, trimmed_text};
use crate::error::{CourseQaError, Result};

const IMAGE_PLACEHOLDER: &str = "Image";
const BUTTON_PLACEHOLDER: &str = "Action button";
const INPUT_PLACEHOLDER: &str = "Input field";

/// Every built-in rule in application order.
pub fn default_rules() -> Vec<Arc<dyn FixRule + Send + Sync>> {
    vec![
        Arc::new(ImageAltRule),
        Arc::new(ButtonNameRule),
        Arc::new(ControlLabelRule),
        Arc::new(HeadingLevelRule),
    ]
}

/// Build rules from a list of ids, keeping application order. An empty list
/// selects every rule.
pub fn build_rules(ids: &[String]) -> Result<Vec<Arc<dyn FixRule + Send + Sync>>> {
    if ids.is_empty() {
        return Ok(default_rules());
    }

    let mut wanted = HashSet::new();
    for id in ids {
        let kind = normalize_rule_id(id)
            .ok_or_else(|| CourseQaError::Other(format!("unknown fix rule: {id}")))?;
        wanted.insert(kind);
    }
    Ok(default_rules()
        .into_iter()
        .filter(|rule| wanted.contains(&rule.kind()))
        .collect())
}

fn normalize_rule_id(id: &str) -> Option<FixKind> {
    match id.trim().to_lowercase().as_str() {
        "img-alt" | "image-alt" => Some(FixKind::ImgAlt),
        "button-label" | "button-name" => Some(FixKind::ButtonAriaLabel),
        "input-label" | "label" => Some(FixKind::InputAriaLabel),
        "heading" | "heading-order" => Some(FixKind::HeadingLevel),
        _ => None,
    }
}

/// Set `attr` on every element matching `css` for which `decide` yields a value.
fn assign_where<F>(html: &mut Html, css: &str, attr: &str, decide: F) -> Result<u32>
where
    F: Fn(ElementRef<'_>) -> Option<String>,
{
    let matches = selector(css)?;
    let targets: Vec<_> = html
        .select(&matches)
        .filter_map(|element| decide(element).map(|value| (element.id(), value)))
        .collect();

    let mut applied = 0;
    for (id, value) in targets {
        let Some(mut node) = html.tree.get_mut(id) else {
            continue;
        };
        if let Node::Element(element) = node.value() {
            set_attribute(element, attr, &value);
            applied += 1;
        }
    }
    Ok(applied)
}

/// Gives images without alternative text a placeholder `alt`.
#[derive(Debug, Clone, Copy)]
pub struct ImageAltRule;

impl FixRule for ImageAltRule {
    fn kind(&self) -> FixKind {
        FixKind::ImgAlt
    }

    fn apply(&self, html: &mut Html) -> Result<u32> {
        assign_where(html, "img", "alt", |img| {
            non_blank_attr(img.value(), "alt")
                .is_none()
                .then(|| IMAGE_PLACEHOLDER.to_string())
        })
    }
}

/// Names buttons that have no text, label or tooltip.
#[derive(Debug, Clone, Copy)]
pub struct ButtonNameRule;

impl FixRule for ButtonNameRule {
    fn kind(&self) -> FixKind {
        FixKind::ButtonAriaLabel
    }

    fn apply(&self, html: &mut Html) -> Result<u32> {
        assign_where(html, "button", "aria-label", |button| {
            let unnamed = trimmed_text(button).is_empty()
                && non_blank_attr(button.value(), "aria-label").is_none()
                && non_blank_attr(button.value(), "title").is_none();
            unnamed.then(|| BUTTON_PLACEHOLDER.to_string())
        })
    }
}

/// Labels form controls that are not associated with a `<label>`.
///
/// A whitespace-only `aria-label` is no accessible name, so it is replaced.
#[derive(Debug, Clone, Copy)]
pub struct ControlLabelRule;

impl FixRule for ControlLabelRule {
    fn kind(&self) -> FixKind {
        FixKind::InputAriaLabel
    }

    fn apply(&self, html: &mut Html) -> Result<u32> {
        let labels = selector("label[for]")?;
        let labelled: HashSet<String> = html
            .select(&labels)
            .filter_map(|label| label.value().attr("for"))
            .map(str::to_string)
            .collect();

        assign_where(html, "input, select, textarea", "aria-label", |control| {
            let value = control.value();
            let kind = value.attr("type").unwrap_or_default().to_ascii_lowercase();
            if value.name() == "input" && matches!(kind.as_str(), "hidden" | "submit" | "button") {
                return None;
            }
            if non_blank_attr(value, "aria-label").is_some() {
                return None;
            }
            if value.id().is_some_and(|id| labelled.contains(id)) {
                return None;
            }
            let name = non_blank_attr(value, "placeholder")
                .or_else(|| non_blank_attr(value, "name"))
                .unwrap_or(INPUT_PLACEHOLDER);
            Some(name.to_string())
        })
    }
}

/// Renormalizes heading levels in document order.
///
/// The first heading becomes `h1`, later `h1`s become `h2`, and no heading
/// may be more than one level deeper than the heading before it.
#[derive(Debug, Clone, Copy)]
pub struct HeadingLevelRule;

impl FixRule for HeadingLevelRule {
    fn kind(&self) -> FixKind {
        FixKind::HeadingLevel
    }

    fn apply(&self, html: &mut Html) -> Result<u32> {
        let headings = selector("h1, h2, h3, h4, h5, h6")?;
        let levels: Vec<_> = html
            .select(&headings)
            .filter_map(|heading| heading_level(heading.value().name()).map(|level| (heading.id(), level)))
            .collect();

        let targets = renormalize(levels.iter().map(|(_, level)| *level));
        let mut adjusted = 0;
        for ((id, level), target) in levels.into_iter().zip(targets) {
            if level == target {
                continue;
            }
            let Some(mut node) = html.tree.get_mut(id) else {
                continue;
            };
            if let Node::Element(element) = node.value() {
                rename(element, &format!("h{target}"));
                adjusted += 1;
            }
        }
        Ok(adjusted)
    }
}

fn heading_level(tag: &str) -> Option<u8> {
    let digit = tag.strip_prefix('h')?;
    digit.parse().ok().filter(|level| (1..=6).contains(level))
}

/// Target levels for a sequence of heading levels.
pub(crate) fn renormalize(levels: impl IntoIterator<Item = u8>) -> Vec<u8> {
    let mut previous: Option<u8> = None;
    levels
        .into_iter()
        .map(|level| {
            let target = match previous {
                None => 1,
                Some(prev) => {
                    let level = if level == 1 { 2 } else { level };
                    level.min(prev + 1)
                }
            };
            previous = Some(target);
            target
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(rule: &dyn FixRule, markup: &str) -> (u32, String) {
        let mut html = Html::parse_document(markup);
        let count = rule.apply(&mut html).expect("apply rule");
        (count, html.html())
    }

    #[test]
    fn image_rule_fills_missing_and_blank_alt() {
        let (count, output) = apply(
            &ImageAltRule,
            r#"<img src="a.png"><img src="b.png" alt="  "><img src="c.png" alt="Chart">"#,
        );
        assert_eq!(count, 2);
        assert_eq!(output.matches(r#"alt="Image""#).count(), 2);
        assert!(output.contains(r#"alt="Chart""#));
    }

    #[test]
    fn button_rule_skips_named_buttons() {
        let (count, output) = apply(
            &ButtonNameRule,
            r#"<button></button><button>Go</button><button title="Close"></button><button aria-label="Menu"></button>"#,
        );
        assert_eq!(count, 1);
        assert_eq!(output.matches(r#"aria-label="Action button""#).count(), 1);
    }

    #[test]
    fn control_rule_derives_names_and_respects_labels() {
        let markup = r#"
            <label for="email">Email</label><input id="email">
            <input placeholder=" Search ">
            <input name="city">
            <textarea></textarea>
            <select aria-label="Country"></select>
            <input type="hidden" name="token">
            <input type="SUBMIT">
        "#;
        let (count, output) = apply(&ControlLabelRule, markup);
        assert_eq!(count, 3);
        assert!(output.contains(r#"aria-label="Search""#));
        assert!(output.contains(r#"aria-label="city""#));
        assert!(output.contains(r#"aria-label="Input field""#));
        assert!(!output.contains(r#"id="email" aria-label"#));
    }

    #[test]
    fn control_rule_replaces_blank_aria_labels() {
        let markup = r#"<input aria-label="  " name="q"><input aria-label="Query" name="r">"#;
        let (count, output) = apply(&ControlLabelRule, markup);
        assert_eq!(count, 1);
        assert!(output.contains(r#"<input aria-label="q" name="q">"#));
        assert!(output.contains(r#"<input aria-label="Query" name="r">"#));
    }

    #[test]
    fn renormalize_follows_documented_rule() {
        assert_eq!(renormalize([3, 1, 4, 2, 6]), vec![1, 2, 3, 2, 3]);
        assert_eq!(renormalize([1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(renormalize([2, 2, 1]), vec![1, 2, 2]);
        assert!(renormalize([]).is_empty());
    }

    #[test]
    fn heading_rule_renames_and_counts_changes() {
        let (count, output) = apply(
            &HeadingLevelRule,
            "<h2>Intro</h2><p>x</p><h4>Deep</h4><h1>Again</h1>",
        );
        assert_eq!(count, 3);
        assert!(output.contains("<h1>Intro</h1>"));
        assert!(output.contains("<h2>Deep</h2>"));
        assert!(output.contains("<h2>Again</h2>"));
    }

    #[test]
    fn build_rules_accepts_aliases_and_keeps_order() {
        let rules = build_rules(&["heading".to_string(), "IMAGE-ALT".to_string()]).expect("rules");
        let kinds: Vec<_> = rules.iter().map(|rule| rule.kind()).collect();
        assert_eq!(kinds, vec![FixKind::ImgAlt, FixKind::HeadingLevel]);

        assert_eq!(build_rules(&[]).expect("rules").len(), 4);
        assert!(build_rules(&["bogus".to_string()]).is_err());
    }
}
