//! HTML heuristic device extraction
//!
//! Two independent passes, unioned:
//! - list items whose text names a known brand or product line
//! - every item of the first list following a device-related heading
//!
//! The union is deduplicated through a `HashSet`, so the order of the
//! returned names is unspecified and may differ between runs on the same
//! document. Consumers must not rely on it.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::utils::constants::{DEVICE_KEYWORDS, HEADING_KEYWORDS};

/// Minimum name length (exclusive) for heuristic matches
const MIN_NAME_CHARS: usize = 3;

/// Heuristically extract device names from rendered HTML
///
/// Returns an empty vector when neither pass finds anything.
pub fn extract_fallback(html: &str) -> Vec<String> {
    info!("Using HTML fallback parsing method");
    let document = Html::parse_document(html);

    let mut found = list_item_matches(&document);
    found.extend(heading_list_items(&document));

    let unique: HashSet<String> = found.into_iter().collect();
    let devices: Vec<String> = unique.into_iter().filter(|d| long_enough(d)).collect();

    if devices.is_empty() {
        warn!("No devices found in HTML fallback parsing");
    }
    devices
}

/// Pass A: `ul li, ol li` whose leading text contains a device keyword
fn list_item_matches(document: &Html) -> Vec<String> {
    let Ok(selector) = Selector::parse("ul li, ol li") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|item| leading_text(&item))
        .filter(|text| long_enough(text) && contains_keyword(text, DEVICE_KEYWORDS))
        .collect()
}

/// Pass B: items of the first sibling list after a device-related heading
fn heading_list_items(document: &Html) -> Vec<String> {
    let Ok(headings) = Selector::parse("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };
    let Ok(items) = Selector::parse("li") else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for heading in document.select(&headings) {
        let Some(heading_text) = leading_text(&heading) else {
            continue;
        };
        if !contains_keyword(&heading_text, HEADING_KEYWORDS) {
            continue;
        }

        let Some(list) = heading
            .next_siblings()
            .filter_map(ElementRef::wrap)
            .find(|sibling| matches!(sibling.value().name(), "ul" | "ol"))
        else {
            continue;
        };

        debug!(heading = %heading_text, "Collecting list following device heading");
        for item in list.select(&items) {
            found.extend(
                own_text_nodes(&item)
                    .map(str::trim)
                    .filter(|text| long_enough(text))
                    .map(str::to_string),
            );
        }
    }
    found
}

/// First non-blank text node under `element`, trimmed
fn leading_text(element: &ElementRef<'_>) -> Option<String> {
    element
        .text()
        .map(str::trim)
        .find(|text| !text.is_empty())
        .map(str::to_string)
}

/// Text nodes that are direct children of `element`
fn own_text_nodes<'a>(element: &ElementRef<'a>) -> impl Iterator<Item = &'a str> {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
}

fn contains_keyword(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    keywords.iter().any(|keyword| lowered.contains(keyword))
}

fn long_enough(text: &str) -> bool {
    text.chars().count() > MIN_NAME_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(mut v: Vec<String>) -> Vec<String> {
        v.sort();
        v
    }

    #[test]
    fn keyword_list_items_are_kept() {
        let html = r#"<ul>
            <li>iPhone 14</li>
            <li>Samsung Galaxy Z Fold</li>
            <li>Privacy policy</li>
            <li><a href="/faq">FAQ</a></li>
        </ul>"#;
        assert_eq!(
            sorted(extract_fallback(html)),
            vec!["Samsung Galaxy Z Fold", "iPhone 14"]
        );
    }

    #[test]
    fn heading_anchors_first_following_list() {
        let html = r#"<body>
            <h2>Compatible tablets</h2>
            <p>Check your model below.</p>
            <ol><li>Lenovo Tab P12</li><li>Tab</li></ol>
            <ul><li>Nokia X30</li></ul>
            <h3>About us</h3>
            <ul><li>Founded 2017</li></ul>
        </body>"#;
        assert_eq!(sorted(extract_fallback(html)), vec!["Lenovo Tab P12"]);
    }

    #[test]
    fn duplicates_across_passes_collapse() {
        let html = r#"<h2>eSIM devices</h2>
            <ul><li>Pixel 8</li><li>Pixel 8</li><li>Fairphone 5</li></ul>"#;
        assert_eq!(
            sorted(extract_fallback(html)),
            vec!["Fairphone 5", "Pixel 8"]
        );
    }

    #[test]
    fn repeated_runs_yield_same_set() {
        let html = r#"<h1>Phones with eSIM</h1>
            <ul><li>Moto G Power</li><li>Xiaomi 13</li><li>OnePlus 11</li></ul>"#;
        let first: HashSet<_> = extract_fallback(html).into_iter().collect();
        let second: HashSet<_> = extract_fallback(html).into_iter().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn empty_document_yields_nothing() {
        assert!(extract_fallback("<html><body><p>hello</p></body></html>").is_empty());
    }
}
