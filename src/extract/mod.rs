//! Device list extraction from a rendered page
//!
//! The coordinator runs in a fixed order and stops at the first terminal
//! outcome:
//! 1. block-page check (edge-protection challenge markers)
//! 2. structured data (JSON-LD item list)
//! 3. HTML heuristics
//! 4. empty result with a diagnostic reason
//!
//! Structured data always wins over heuristics; the two sources are never
//! merged. Nothing in this module returns an error: blocked and empty pages
//! are ordinary [`CrawlResult`] values.

mod fallback;
mod structured;

pub use fallback::extract_fallback;
pub use structured::{StructuredList, extract_structured};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::utils::constants::{BLOCK_MARKERS, CONTENT_PREVIEW_CHARS};

pub const STRUCTURED_CATEGORY: &str = "eSIM Compatible Devices";
pub const FALLBACK_CATEGORY: &str = "eSIM Compatible Devices (HTML Fallback)";
pub const BLOCKED_REASON: &str = "Cloudflare/AWS WAF protection detected";
pub const EMPTY_REASON: &str = "No device data could be extracted from any method";

/// Where a device list came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceSource {
    #[serde(rename = "json_ld_schema")]
    Structured,
    #[serde(rename = "html_fallback")]
    Fallback,
}

/// The single outcome of one crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CrawlResult {
    Devices {
        category: String,
        devices: Vec<String>,
        source: DeviceSource,
        #[serde(rename = "total_devices")]
        total_count: usize,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    Blocked {
        url: String,
        reason: String,
        content_preview: String,
    },
    #[serde(rename = "no_data_found")]
    Empty { url: String, reason: String },
}

impl CrawlResult {
    /// Build a `Devices` result; `total_count` always equals `devices.len()`
    pub fn devices(
        category: impl Into<String>,
        devices: Vec<String>,
        source: DeviceSource,
        url: impl Into<String>,
        title: Option<String>,
    ) -> Self {
        Self::Devices {
            category: category.into(),
            total_count: devices.len(),
            devices,
            source,
            url: url.into(),
            title,
        }
    }

    /// Wire name of the outcome, matches the serialized `status` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Devices { .. } => "devices",
            Self::Blocked { .. } => "blocked",
            Self::Empty { .. } => "no_data_found",
        }
    }

    pub fn device_count(&self) -> usize {
        match self {
            Self::Devices { total_count, .. } => *total_count,
            _ => 0,
        }
    }

    pub fn source(&self) -> Option<DeviceSource> {
        match self {
            Self::Devices { source, .. } => Some(*source),
            _ => None,
        }
    }
}

/// Run the extraction state machine over a rendered document
pub fn extract_devices(url: &str, html: &str) -> CrawlResult {
    if let Some(marker) = find_block_marker(html) {
        warn!(url = %url, marker, "Detected Cloudflare/AWS WAF protection");
        return CrawlResult::Blocked {
            url: url.to_string(),
            reason: BLOCKED_REASON.to_string(),
            content_preview: html.chars().take(CONTENT_PREVIEW_CHARS).collect(),
        };
    }

    if let Some(list) = extract_structured(html) {
        info!("Successfully extracted {} devices from JSON-LD", list.devices.len());
        return CrawlResult::devices(
            STRUCTURED_CATEGORY,
            list.devices,
            DeviceSource::Structured,
            url,
            Some(list.title),
        );
    }

    warn!("Failed to extract JSON-LD data, falling back to HTML parsing");
    let devices = extract_fallback(html);
    if !devices.is_empty() {
        info!("Extracted {} devices from HTML fallback", devices.len());
        return CrawlResult::devices(
            FALLBACK_CATEGORY,
            devices,
            DeviceSource::Fallback,
            url,
            None,
        );
    }

    warn!(url = %url, "No device data could be extracted from any method");
    CrawlResult::Empty {
        url: url.to_string(),
        reason: EMPTY_REASON.to_string(),
    }
}

fn find_block_marker(html: &str) -> Option<&'static str> {
    let lowered = html.to_lowercase();
    BLOCK_MARKERS
        .iter()
        .copied()
        .find(|marker| lowered.contains(marker))
}
