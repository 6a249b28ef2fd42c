//! JSON-LD device list extraction
//!
//! Looks for `<script type="application/ld+json">` blocks shaped like
//! `{"name": ..., "mainEntity": {"itemListElement": [{"name": ...}, ...]}}`.
//! The first block with that shape is authoritative: scanning stops there,
//! since later blocks on the page describe unrelated entities.

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

const DEFAULT_TITLE: &str = "eSIM Compatible Devices List";

/// Names recovered from the authoritative JSON-LD item list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredList {
    /// Names in source order, duplicates preserved
    pub devices: Vec<String>,
    /// The document's `name`, or a generic title when absent
    pub title: String,
}

/// Extract the device list from embedded JSON-LD
///
/// Returns `None` when no block yields a usable list; absence is the signal
/// to fall back to HTML heuristics, not an error.
pub fn extract_structured(html: &str) -> Option<StructuredList> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).ok()?;

    for (index, script) in document.select(&selector).enumerate() {
        let content: String = script.text().collect();

        let data: Value = match serde_json::from_str(content.trim()) {
            Ok(data) => data,
            Err(e) => {
                warn!(block = index, "Failed to parse JSON-LD script: {}", e);
                continue;
            }
        };

        let Some(items) = item_list(&data) else {
            debug!(block = index, "JSON-LD block has no mainEntity item list, skipping");
            continue;
        };

        let devices = accepted_names(items);
        if devices.is_empty() {
            debug!(block = index, "JSON-LD item list held no usable names");
            return None;
        }

        let title = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_TITLE)
            .to_string();
        return Some(StructuredList { devices, title });
    }

    None
}

/// `mainEntity.itemListElement`, when it is a non-empty array
fn item_list(data: &Value) -> Option<&Vec<Value>> {
    data.as_object()?
        .get("mainEntity")?
        .as_object()?
        .get("itemListElement")?
        .as_array()
        .filter(|items| !items.is_empty())
}

/// Trimmed `name` fields longer than two characters, in order
fn accepted_names(items: &[Value]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| item.get("name")?.as_str())
        .map(str::trim)
        .filter(|name| name.chars().count() > 2)
        .map(str::to_string)
        .collect()
}
