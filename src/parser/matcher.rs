//! Best-effort structural matching over a DOM snapshot.
//!
//! The CRM renders CSS-module class names with hashed suffixes
//! (`DataTable_row_x8f2a`), so everything here matches on class-name
//! substrings and header text. Nothing in this module fails: a missing
//! element is `None` and the caller picks the placeholder.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

/// Elements whose appearance means new records were rendered.
pub static RECORD_MARKERS: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        r#"[class*="DataTable_row_"], [class*="OpportunityCard_card_"], [class*="CollapsedItemLayout_"]"#,
    )
});

pub static OPPORTUNITY_MARKER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[class*="OpportunityCard_card_"]"#));

pub static TASK_MARKER: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"[class*="CollapsedItemLayout_"]"#));

/// Container the pagination driver scrolls when present.
pub static SCROLL_CONTAINER: LazyLock<Selector> = LazyLock::new(|| selector(r#"[class*="Table"]"#));

/// Parse a selector known at compile time.
pub(crate) fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {:?}: {}", css, e))
}

/// `textContent`, trimmed. Interior line breaks are kept.
pub fn raw_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Text with every whitespace run collapsed to a single space.
pub fn text(el: ElementRef) -> String {
    normalize_ws(&el.text().collect::<String>())
}

/// First line of the element's text, whitespace-collapsed.
pub fn first_line(el: ElementRef) -> String {
    let raw = raw_text(el);
    normalize_ws(raw.split('\n').next().unwrap_or(""))
}

pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First descendant of `scope` matching `sel` whose text is non-empty.
pub fn first_text(scope: ElementRef, sel: &Selector) -> Option<String> {
    scope
        .select(sel)
        .next()
        .map(text)
        .filter(|t| !t.is_empty())
}

/// Non-empty text of `el` itself.
pub fn own_text(el: ElementRef) -> Option<String> {
    Some(text(el)).filter(|t| !t.is_empty())
}

/// Every `href` under `scope` matching `sel`, with `scheme` stripped.
pub fn hrefs_with_scheme(scope: ElementRef, sel: &Selector, scheme: &str) -> Vec<String> {
    scope
        .select(sel)
        .filter_map(|a| a.value().attr("href"))
        .map(|href| href.strip_prefix(scheme).unwrap_or(href).trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

pub fn has_match(doc: &Html, sel: &Selector) -> bool {
    doc.select(sel).next().is_some()
}

/// Number of rendered record elements, used to notice newly loaded content.
pub fn count_markers(html: &str) -> usize {
    Html::parse_document(html).select(&RECORD_MARKERS).count()
}
