//! Browser lifecycle management for a single crawl
//!
//! Owns the chromiumoxide browser, its event handler task and the temporary
//! profile directory, and tears all three down in the right order.

use chromiumoxide::browser::Browser;
use chromiumoxide::page::Page;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{BrowserError, BrowserResult};

/// Wrapper for Browser and its event handler task
///
/// Handler MUST be aborted to prevent it running indefinitely after
/// browser is closed.
pub struct BrowserWrapper {
    browser: Browser,
    handler: JoinHandle<()>,
    user_data_dir: Option<PathBuf>,
}

impl BrowserWrapper {
    pub(crate) fn new(browser: Browser, handler: JoinHandle<()>, user_data_dir: PathBuf) -> Self {
        Self {
            browser,
            handler,
            user_data_dir: Some(user_data_dir),
        }
    }

    /// Get reference to inner browser
    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Close the browser, wait for the process to exit, then remove the profile directory
    ///
    /// `close()` alone leaves a zombie process; `wait()` must follow before
    /// the temp directory can be removed (Windows keeps files locked).
    pub async fn shutdown(mut self) {
        info!("Shutting down browser");

        if let Err(e) = self.browser.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }

        if let Err(e) = self.browser.wait().await {
            warn!("Failed to wait for browser exit: {}", e);
        }

        self.cleanup_temp_dir();
    }

    /// Clean up temp directory (blocking operation)
    ///
    /// Uses blocking `std::fs::remove_dir_all()` because this may be called
    /// from Drop context where async is not available.
    fn cleanup_temp_dir(&mut self) {
        if let Some(path) = self.user_data_dir.take() {
            info!("Cleaning up temp directory: {}", path.display());
            if let Err(e) = std::fs::remove_dir_all(&path) {
                warn!(
                    "Failed to clean up temp directory {}: {}. Manual cleanup may be required.",
                    path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserWrapper {
    fn drop(&mut self) {
        self.handler.abort();
        // Browser::drop() kills the Chrome process

        if let Some(path) = self.user_data_dir.as_ref() {
            warn!(
                "BrowserWrapper dropped without shutdown(). Temp directory will be orphaned: {}",
                path.display()
            );
        }
    }
}

/// Create a blank page for stealth injection
///
/// Stealth scripts and request identity must be installed while the page
/// is still on about:blank, before navigation to the target URL occurs.
pub async fn create_blank_page(wrapper: &BrowserWrapper) -> BrowserResult<Page> {
    let page = wrapper
        .browser()
        .new_page("about:blank")
        .await
        .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;

    info!("Created blank page for stealth injection");
    Ok(page)
}
