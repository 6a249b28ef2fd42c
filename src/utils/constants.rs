//! Shared configuration constants for the crawler
//!
//! Default values and vocabularies used throughout the codebase to ensure
//! consistency and avoid magic numbers.

/// Chrome user agent string presented to the target site
///
/// Chrome releases new stable versions ~every 4 weeks.
/// Update quarterly to stay within reasonable version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Accept header sent with the page request
pub const ACCEPT_HEADER: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Script evaluated before any page script runs, hides common automation fingerprints
pub const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
    Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });
    Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
    window.chrome = { runtime: {} };
"#;

/// Case-insensitive markers of an edge-protection challenge page
pub const BLOCK_MARKERS: &[&str] = &["cloudflare", "aws waf"];

/// Brand and product terms that identify a list item as a device name
pub const DEVICE_KEYWORDS: &[&str] = &[
    "iphone", "samsung", "pixel", "oneplus", "xiaomi", "huawei", "motorola", "galaxy", "ipad",
    "watch", "surface", "thinkpad",
];

/// Terms that mark a heading as introducing a device list
pub const HEADING_KEYWORDS: &[&str] = &["device", "phone", "tablet", "compatible", "esim"];

/// Number of characters kept from a blocked page for diagnostics
pub const CONTENT_PREVIEW_CHARS: usize = 200;
