//! Page fetching through a headless browser
//!
//! A navigation-complete signal is not enough for challenge-protected pages:
//! the challenge script runs after `load`. The fetch therefore waits for the
//! network to go quiet, then sleeps a fixed settle delay, and only then
//! reads the DOM.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::error::CdpError;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, Headers,
    RequestId, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures::StreamExt;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserError, BrowserResult, create_blank_page};
use crate::browser_setup::launch_browser;
use crate::throttle::OriginThrottle;
use crate::utils::constants::{ACCEPT_HEADER, CHROME_USER_AGENT, STEALTH_SCRIPT};
use crate::{BrowserConfig, Config, CrawlConfig};

/// Fully rendered document after client-side scripts settled
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL (may differ from requested due to redirects)
    pub url: String,
    pub html: String,
}

/// Source of rendered pages for the extraction pipeline
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> BrowserResult<RenderedPage>;
}

/// Fetches pages with a fresh headless Chrome per call
pub struct ChromeFetcher {
    browser: BrowserConfig,
    crawl: CrawlConfig,
    rendered_page_path: PathBuf,
    throttle: OriginThrottle,
}

impl ChromeFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            browser: config.browser.clone(),
            crawl: config.crawl.clone(),
            rendered_page_path: config.files.rendered_page.clone(),
            throttle: OriginThrottle::new(Duration::from_millis(
                config.crawl.min_request_interval_ms,
            )),
        }
    }

    async fn render(&self, page: &Page, url: &str) -> BrowserResult<RenderedPage> {
        apply_request_identity(page, &self.crawl.accept_language).await;

        let timeout_secs = self.crawl.navigation_timeout_secs;
        let idle_window = Duration::from_millis(self.crawl.network_idle_ms);

        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            navigate_until_idle(page, url, idle_window, timeout_secs),
        )
        .await
        .map_err(|_| BrowserError::Timeout {
            url: url.to_string(),
            timeout_secs,
        })??;

        let settle = Duration::from_secs(self.crawl.settle_delay_secs);
        info!("Network idle, waiting {:?} for challenge scripts to settle", settle);
        tokio::time::sleep(settle).await;

        let html = page
            .content()
            .await
            .map_err(|e| BrowserError::NavigationFailed(format!("Failed to read page content: {e}")))?;

        let final_url = match page.url().await {
            Ok(Some(final_url)) => final_url,
            Ok(None) => url.to_string(),
            Err(e) => {
                warn!("Failed to read final URL, using requested one: {}", e);
                url.to_string()
            }
        };

        Ok(RenderedPage {
            url: final_url,
            html,
        })
    }
}

#[async_trait]
impl PageSource for ChromeFetcher {
    async fn fetch(&self, url: &str) -> BrowserResult<RenderedPage> {
        let parsed = Url::parse(url)
            .map_err(|e| BrowserError::NavigationFailed(format!("Invalid URL {url}: {e}")))?;
        let _permit = self.throttle.acquire(&parsed).await;

        info!(url = %url, "Fetching page");
        let navigation_timeout = Duration::from_secs(self.crawl.navigation_timeout_secs);
        let wrapper = launch_browser(&self.browser, navigation_timeout).await?;

        let rendered = match create_blank_page(&wrapper).await {
            Ok(page) => self.render(&page, url).await,
            Err(e) => Err(e),
        };
        wrapper.shutdown().await;

        let rendered = rendered?;
        persist_rendered_page(&self.rendered_page_path, &rendered.html).await?;
        Ok(rendered)
    }
}

/// Install the stealth script, user agent and language headers on a blank page
///
/// Failures are logged and the fetch continues with the browser defaults.
async fn apply_request_identity(page: &Page, accept_language: &str) {
    if let Err(e) = page
        .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
        .await
    {
        warn!("Failed to inject stealth script: {}", e);
    }

    match SetUserAgentOverrideParams::builder()
        .user_agent(CHROME_USER_AGENT)
        .accept_language(accept_language)
        .build()
    {
        Ok(params) => {
            if let Err(e) = page.execute(params).await {
                warn!("Failed to override user agent: {}", e);
            }
        }
        Err(e) => warn!("Failed to build user agent override: {}", e),
    }

    if let Err(e) = page.execute(EnableParams::default()).await {
        warn!("Failed to enable Network domain: {}", e);
    }

    let headers = Headers::new(json!({
        "Accept-Language": accept_language,
        "Accept": ACCEPT_HEADER,
    }));
    if let Err(e) = page
        .execute(SetExtraHttpHeadersParams::new(headers))
        .await
    {
        warn!("Failed to set extra HTTP headers: {}", e);
    }
}

/// In-flight request bookkeeping for the network-idle wait
///
/// Sent, finished and failed events arrive on separate channels, so a request
/// can settle before its "sent" event is seen. Early settlements are kept and
/// cancel the matching "sent" instead of leaving the id in flight forever.
#[derive(Debug, Default)]
pub(crate) struct NetworkIdleTracker {
    in_flight: HashSet<RequestId>,
    settled_early: HashSet<RequestId>,
}

impl NetworkIdleTracker {
    /// Redirect hops reuse the request id of the original request
    pub(crate) fn request_sent(&mut self, id: &RequestId, is_redirect: bool) {
        if is_redirect {
            return;
        }
        if !self.settled_early.remove(id) {
            self.in_flight.insert(id.clone());
        }
    }

    /// Finished and failed requests both settle
    pub(crate) fn request_settled(&mut self, id: &RequestId) {
        if !self.in_flight.remove(id) {
            self.settled_early.insert(id.clone());
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

/// Navigate and return once no request has been in flight for `idle_window`
///
/// Listeners are registered before navigation so the document request itself
/// is tracked.
async fn navigate_until_idle(
    page: &Page,
    url: &str,
    idle_window: Duration,
    timeout_secs: u64,
) -> BrowserResult<()> {
    let listen_err = |e: CdpError| {
        BrowserError::NavigationFailed(format!("Failed to subscribe to network events: {e}"))
    };
    let mut sent = page
        .event_listener::<EventRequestWillBeSent>()
        .await
        .map_err(listen_err)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(listen_err)?;
    let mut failed = page
        .event_listener::<EventLoadingFailed>()
        .await
        .map_err(listen_err)?;

    page.goto(url).await.map_err(|e| match e {
        CdpError::Timeout => BrowserError::Timeout {
            url: url.to_string(),
            timeout_secs,
        },
        e => BrowserError::NavigationFailed(format!("Navigation failed for URL: {url}. Error: {e}")),
    })?;

    let mut tracker = NetworkIdleTracker::default();
    loop {
        tokio::select! {
            Some(event) = sent.next() => {
                tracker.request_sent(&event.request_id, event.redirect_response.is_some());
            }
            Some(event) = finished.next() => {
                tracker.request_settled(&event.request_id);
            }
            Some(event) = failed.next() => {
                tracker.request_settled(&event.request_id);
            }
            _ = tokio::time::sleep(idle_window), if tracker.is_idle() => {
                debug!("Network idle for {:?}", idle_window);
                return Ok(());
            }
            else => {
                debug!(in_flight = tracker.in_flight(), "Network event streams closed");
                return Ok(());
            }
        }
    }
}

/// Overwrite the rendered-page artifact for post-mortem inspection
pub async fn persist_rendered_page(path: &Path, html: &str) -> BrowserResult<()> {
    tokio::fs::write(path, html).await?;
    info!("HTML written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> RequestId {
        RequestId::new(raw)
    }

    #[test]
    fn idle_after_requests_settle_in_order() {
        let mut tracker = NetworkIdleTracker::default();
        tracker.request_sent(&id("doc"), false);
        tracker.request_sent(&id("img"), false);
        assert!(!tracker.is_idle());

        tracker.request_settled(&id("doc"));
        assert!(!tracker.is_idle());
        tracker.request_settled(&id("img"));
        assert!(tracker.is_idle());
    }

    #[test]
    fn settled_before_sent_does_not_stay_in_flight() {
        let mut tracker = NetworkIdleTracker::default();
        // finished drained from its channel before the matching sent event
        tracker.request_settled(&id("doc"));
        tracker.request_settled(&id("css"));
        tracker.request_sent(&id("doc"), false);
        tracker.request_sent(&id("css"), false);

        assert!(tracker.is_idle());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn failed_request_settles() {
        let mut tracker = NetworkIdleTracker::default();
        tracker.request_sent(&id("beacon"), false);
        tracker.request_sent(&id("font"), false);
        tracker.request_settled(&id("beacon"));

        assert_eq!(tracker.in_flight(), 1);
        tracker.request_settled(&id("font"));
        assert!(tracker.is_idle());
    }

    #[test]
    fn redirect_hops_count_once() {
        let mut tracker = NetworkIdleTracker::default();
        tracker.request_sent(&id("doc"), false);
        tracker.request_sent(&id("doc"), true);
        tracker.request_settled(&id("doc"));
        assert!(tracker.is_idle());

        let mut tracker = NetworkIdleTracker::default();
        tracker.request_settled(&id("doc"));
        tracker.request_sent(&id("doc"), false);
        tracker.request_sent(&id("doc"), true);
        assert!(tracker.is_idle());
    }

    #[test]
    fn unsettled_request_blocks_idle() {
        let mut tracker = NetworkIdleTracker::default();
        tracker.request_settled(&id("doc"));
        tracker.request_sent(&id("doc"), false);
        tracker.request_sent(&id("xhr"), false);

        assert!(!tracker.is_idle());
        assert_eq!(tracker.in_flight(), 1);
    }

    #[tokio::test]
    async fn rendered_page_artifact_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rendered_page.html");

        persist_rendered_page(&path, "<html>first run, much longer</html>")
            .await
            .unwrap();
        persist_rendered_page(&path, "<html>second</html>").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "<html>second</html>"
        );
    }
}
