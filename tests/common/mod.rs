#![allow(dead_code)]

use async_trait::async_trait;
use esim_crawler::{BrowserError, BrowserResult, Config, PageSource, RenderedPage};
use std::path::Path;
use std::time::Duration;

pub const TARGET_URL: &str = "https://yesim.app/compatible-devices/";

/// Serves a fixed document instead of driving a browser
pub struct StaticPage {
    html: String,
}

impl StaticPage {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }
}

#[async_trait]
impl PageSource for StaticPage {
    async fn fetch(&self, url: &str) -> BrowserResult<RenderedPage> {
        Ok(RenderedPage {
            url: url.to_string(),
            html: self.html.clone(),
        })
    }
}

/// Always fails like a navigation that never finished
pub struct TimedOutPage;

#[async_trait]
impl PageSource for TimedOutPage {
    async fn fetch(&self, url: &str) -> BrowserResult<RenderedPage> {
        Err(BrowserError::Timeout {
            url: url.to_string(),
            timeout_secs: 60,
        })
    }
}

/// Never answers, for run-timeout tests
pub struct HangingPage;

#[async_trait]
impl PageSource for HangingPage {
    async fn fetch(&self, _url: &str) -> BrowserResult<RenderedPage> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(BrowserError::NavigationFailed("unreachable".to_string()))
    }
}

pub fn test_config(dir: &Path, webhook_url: &str) -> Config {
    let mut config = Config::default();
    config.webhook.url = webhook_url.to_string();
    config.webhook.timeout_secs = 5;
    config.files.output = dir.join("yesim_devices.json");
    config.files.rendered_page = dir.join("rendered_page.html");
    config.files.log_file = dir.join("esim_crawler.log");
    config.crawl.target_url = TARGET_URL.to_string();
    config
}

pub fn json_ld_page(names: &[&str]) -> String {
    let items: Vec<_> = names
        .iter()
        .map(|name| serde_json::json!({ "@type": "ListItem", "name": name }))
        .collect();
    let doc = serde_json::json!({
        "@context": "https://schema.org",
        "name": "eSIM compatible devices",
        "mainEntity": { "@type": "ItemList", "itemListElement": items }
    });
    format!(
        r#"<!doctype html><html><head>
        <script type="application/ld+json">{doc}</script>
        </head><body><h1>Devices</h1></body></html>"#
    )
}
