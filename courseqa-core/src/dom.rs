//! Small DOM helpers shared by the builtin rule engine and the auto-fixer.

use scraper::node::Element;
use scraper::{ElementRef, Selector};

use crate::error::{CourseQaError, Result};

/// Parse a CSS selector.
pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|err| CourseQaError::Other(format!("invalid selector {css}: {err:?}")))
}

/// An attribute value, ignoring attributes that are blank.
pub(crate) fn non_blank_attr<'a>(element: &'a Element, name: &str) -> Option<&'a str> {
    element
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Visible text of an element, trimmed.
pub(crate) fn trimmed_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Set or replace an attribute in place. New attributes go last.
pub(crate) fn set_attribute(element: &mut Element, name: &str, value: &str) {
    let mut key = element.name.clone();
    key.prefix = None;
    key.ns = "".into();
    key.local = name.into();
    element.attrs.insert(key, value.into());
}

/// Rename an element, keeping its namespace and attributes.
pub(crate) fn rename(element: &mut Element, tag: &str) {
    element.name.local = tag.into();
}

/// A CSS path locating an element, preferring ids.
pub(crate) fn css_path(element: ElementRef<'_>) -> String {
    let mut parts = Vec::new();
    let mut current = Some(element);
    while let Some(node) = current {
        let value = node.value();
        let name = value.name();
        if let Some(id) = value.id() {
            parts.push(format!("#{id}"));
            break;
        }
        if name == "html" {
            parts.push(name.to_string());
            break;
        }
        let same_name = |sibling: &ElementRef<'_>| sibling.value().name() == name;
        let before = node
            .prev_siblings()
            .filter_map(ElementRef::wrap)
            .filter(same_name)
            .count();
        let after = node
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .filter(same_name)
            .count();
        if before + after == 0 {
            parts.push(name.to_string());
        } else {
            parts.push(format!("{name}:nth-of-type({})", before + 1));
        }
        current = node.parent().and_then(ElementRef::wrap);
    }
    parts.reverse();
    parts.join(" > ")
}
