//! Browser infrastructure for launching and managing the Chrome instance used by a run

mod wrapper;

pub use wrapper::{BrowserWrapper, create_blank_page};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to find browser executable: {0}")]
    NotFound(String),

    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Navigation timeout after {timeout_secs}s for URL: {url}")]
    Timeout { url: String, timeout_secs: u64 },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type BrowserResult<T> = Result<T, BrowserError>;
