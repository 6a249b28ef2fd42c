//! Timeout validation utilities for browser operations

use std::time::Duration;

use crate::ConfigError;

/// Maximum timeout for browser navigation operations (5 minutes)
/// Covers slow-loading sites, heavy SPAs, and challenge pages
pub const MAX_NAVIGATION_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Validate the configured navigation timeout
///
/// # Arguments
/// * `timeout_secs` - Navigation timeout in seconds
///
/// # Returns
/// * `Ok(Duration)` - Validated Duration object
/// * `Err(ConfigError)` - If timeout is zero or exceeds MAX_NAVIGATION_TIMEOUT_SECS
pub fn validate_navigation_timeout(timeout_secs: u64) -> Result<Duration, ConfigError> {
    if timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "navigation timeout must be greater than zero".to_string(),
        ));
    }

    if timeout_secs > MAX_NAVIGATION_TIMEOUT_SECS {
        return Err(ConfigError::Invalid(format!(
            "navigation timeout cannot exceed {}s ({} minutes). Received: {}s ({:.1} minutes)",
            MAX_NAVIGATION_TIMEOUT_SECS,
            MAX_NAVIGATION_TIMEOUT_SECS / 60,
            timeout_secs,
            timeout_secs as f64 / 60.0
        )));
    }

    Ok(Duration::from_secs(timeout_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_default_navigation_timeout() {
        assert_eq!(
            validate_navigation_timeout(60).unwrap(),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn rejects_out_of_range_timeouts() {
        assert!(validate_navigation_timeout(0).is_err());
        assert!(validate_navigation_timeout(MAX_NAVIGATION_TIMEOUT_SECS + 1).is_err());
    }
}
