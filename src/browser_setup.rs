use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use chromiumoxide::fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;
use tokio::task;
use tracing::{error, info, trace, warn};

use crate::BrowserConfig;
use crate::browser::{BrowserError, BrowserResult, BrowserWrapper};
use crate::utils::constants::CHROME_USER_AGENT;

/// RAII guard for temporary directory cleanup
///
/// Automatically removes the directory on drop unless consumed by `into_path()`.
struct TempDirGuard {
    path: PathBuf,
    keep: bool,
}

impl TempDirGuard {
    fn new(path: PathBuf) -> BrowserResult<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self { path, keep: false })
    }

    /// Consume guard and return path, preventing automatic cleanup
    fn into_path(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!("Failed to clean up temp dir {}: {}", self.path.display(), e);
            } else {
                info!(
                    "Cleaned up temp dir after launch failure: {}",
                    self.path.display()
                );
            }
        }
    }
}

/// Find Chrome/Chromium executable on the system with platform-specific search paths.
pub async fn find_browser_executable() -> BrowserResult<PathBuf> {
    // Environment variable overrides all other methods
    if let Ok(path) = std::env::var("CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            info!(
                "Using browser from CHROMIUM_PATH environment variable: {}",
                path.display()
            );
            return Ok(path);
        }
        warn!(
            "CHROMIUM_PATH environment variable points to non-existent file: {}",
            path.display()
        );
    }

    let paths = if cfg!(target_os = "windows") {
        vec![
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"%LOCALAPPDATA%\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else if cfg!(target_os = "macos") {
        vec![
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
        ]
    } else {
        vec![
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/usr/local/bin/chromium",
            "/opt/google/chrome/chrome",
        ]
    };

    for path_str in paths {
        let path = if let Some(rest) = path_str.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            }
        } else if path_str.contains('%') && cfg!(target_os = "windows") {
            PathBuf::from(expand_windows_env_vars(path_str))
        } else {
            PathBuf::from(path_str)
        };

        if path.exists() {
            info!("Found browser at: {}", path.display());
            return Ok(path);
        }
    }

    if !cfg!(target_os = "windows") {
        for cmd in &["chromium", "chromium-browser", "google-chrome", "chrome"] {
            let output = Command::new("which").arg(cmd).output();

            if let Ok(output) = output
                && output.status.success()
            {
                let path_str = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path_str.is_empty() {
                    let path = PathBuf::from(path_str);
                    info!("Found browser using 'which' command: {}", path.display());
                    return Ok(path);
                }
            }
        }
    }

    warn!("No Chrome/Chromium executable found. Will download and use fetcher.");
    Err(BrowserError::NotFound(
        "Chrome/Chromium executable not found".to_string(),
    ))
}

/// Expand `%VAR%` tokens; unknown variables are left as-is.
fn expand_windows_env_vars(path: &str) -> String {
    let mut result = String::with_capacity(path.len());
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }
        let var_name: String = chars.by_ref().take_while(|&c| c != '%').collect();
        match std::env::var(&var_name) {
            Ok(value) if !var_name.is_empty() => result.push_str(&value),
            _ if var_name.is_empty() => result.push('%'),
            _ => {
                result.push('%');
                result.push_str(&var_name);
                result.push('%');
            }
        }
    }

    result
}

/// Downloads and manages Chromium browser if not found locally.
/// Returns a path to the downloaded executable.
pub async fn download_managed_browser() -> BrowserResult<PathBuf> {
    info!("Downloading managed Chromium browser...");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| {
            let fallback = std::env::temp_dir().join(".cache");
            warn!(
                "Could not determine system cache directory, using temp directory fallback: {}",
                fallback.display()
            );
            fallback
        })
        .join("esim-crawler/chromium");

    std::fs::create_dir_all(&cache_dir)?;

    let options = BrowserFetcherOptions::builder()
        .with_path(&cache_dir)
        .build()
        .map_err(|e| BrowserError::NotFound(format!("Failed to build fetcher options: {e}")))?;

    let revision_info = BrowserFetcher::new(options)
        .fetch()
        .await
        .map_err(|e| BrowserError::NotFound(format!("Failed to fetch browser: {e}")))?;

    info!(
        "Downloaded Chromium to: {}",
        revision_info.folder_path.display()
    );

    Ok(revision_info.executable_path)
}

/// Floor for the CDP command deadline
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Headroom so the navigation bound expires before chromiumoxide's own deadline
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(5);

/// CDP command deadline for a given navigation bound
///
/// chromiumoxide applies `request_timeout` to pending navigations as well, so
/// it must outlast the navigation timeout or `goto` fails first.
pub(crate) fn request_timeout_for(navigation_timeout: Duration) -> Duration {
    navigation_timeout.max(MIN_REQUEST_TIMEOUT) + REQUEST_TIMEOUT_MARGIN
}

/// Find or download Chrome/Chromium and launch it with automation fingerprints suppressed.
///
/// Each launch gets its own profile directory under the system temp dir, so a
/// crashed previous run never leaves a profile lock behind for the next one.
pub async fn launch_browser(
    config: &BrowserConfig,
    navigation_timeout: Duration,
) -> BrowserResult<BrowserWrapper> {
    let chrome_path = match find_browser_executable().await {
        Ok(path) => path,
        Err(_) => download_managed_browser().await?,
    };

    let user_data_dir_path = std::env::temp_dir().join(format!(
        "esim_crawler_chrome_{}_{}",
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));
    let temp_guard = TempDirGuard::new(user_data_dir_path)?;
    let user_data_dir = temp_guard.path.clone();

    let mut config_builder = BrowserConfigBuilder::default()
        .request_timeout(request_timeout_for(navigation_timeout))
        .window_size(config.window.width, config.window.height)
        .user_data_dir(user_data_dir)
        .chrome_executable(chrome_path);

    if config.headless {
        config_builder = config_builder.headless_mode(HeadlessMode::default());
    } else {
        config_builder = config_builder.with_head();
    }

    config_builder = config_builder
        .arg(format!("--user-agent={}", CHROME_USER_AGENT))
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-features=VizDisplayCompositor")
        .arg("--disable-extensions")
        .arg("--disable-plugins")
        .arg("--disable-infobars")
        .arg("--disable-notifications")
        .arg("--disable-popup-blocking")
        .arg("--disable-background-timer-throttling")
        .arg("--disable-backgrounding-occluded-windows")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--password-store=basic")
        .arg("--use-mock-keychain")
        .arg("--hide-scrollbars")
        .arg("--mute-audio");

    if config.disable_security {
        info!("WARNING: Disabling browser security features (disable_security=true)");
        config_builder = config_builder
            .arg("--disable-web-security")
            .arg("--ignore-certificate-errors");
    }

    // setuid sandbox does not work inside containers
    if should_disable_sandbox() || config.disable_security {
        info!("Disabling Chrome sandbox");
        config_builder = config_builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox");
    }

    let browser_config = config_builder
        .build()
        .map_err(|e| BrowserError::LaunchFailed(format!("Failed to build browser config: {e}")))?;

    info!("Launching browser with config: {:?}", browser_config);
    let (browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

    let handler_task = task::spawn(async move {
        while let Some(h) = handler.next().await {
            if let Err(e) = h {
                let error_msg = e.to_string();

                // Chrome emits CDP events chromiumoxide cannot decode; these are harmless.
                // Reference: https://github.com/mattsse/chromiumoxide/issues/167
                let is_benign_serialization_error = error_msg
                    .contains("data did not match any variant of untagged enum Message")
                    || error_msg.contains("Failed to deserialize WS response");

                if is_benign_serialization_error {
                    trace!("Suppressed benign CDP serialization error: {}", error_msg);
                } else {
                    error!("Browser handler error: {:?}", e);
                }
            }
        }
        info!("Browser handler task completed");
    });

    Ok(BrowserWrapper::new(
        browser,
        handler_task,
        temp_guard.into_path(),
    ))
}

/// Detect if running in containerized environment (Docker, etc.)
fn should_disable_sandbox() -> bool {
    std::path::Path::new("/.dockerenv").exists()
        || std::env::var("container").is_ok()
        || std::env::var("KUBERNETES_SERVICE_HOST").is_ok()
}
