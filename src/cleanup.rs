//! Pre-run artifact cleanup
//!
//! Every removal is best effort: failures are logged and never abort the run.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{error, info};

/// Result of trying to remove one file
#[derive(Debug)]
pub enum Removal {
    Deleted,
    Truncated,
    Missing,
    Failed(std::io::Error),
}

pub fn remove_file(path: &Path) -> Removal {
    match std::fs::remove_file(path) {
        Ok(()) => Removal::Deleted,
        Err(e) if e.kind() == ErrorKind::NotFound => Removal::Missing,
        Err(e) => Removal::Failed(e),
    }
}

/// Delete the output and rendered-page artifacts left by a previous run
pub fn cleanup_artifacts(paths: &[&Path]) {
    info!("Starting file cleanup...");
    for path in paths {
        match remove_file(path) {
            Removal::Deleted | Removal::Truncated => info!("Deleted {}", path.display()),
            Removal::Missing => info!("{} not found, skipping deletion.", path.display()),
            Removal::Failed(e) => error!("Error deleting {}: {}", path.display(), e),
        }
    }
    info!("File cleanup completed.");
}

/// Remove the previous log file
///
/// Runs before the log file is reopened. The file may still be held by
/// another process, so failure is expected and reported back to the caller
/// for logging once the subscriber is up.
pub fn remove_stale_log(path: &Path) -> Removal {
    remove_file(path)
}

/// Empty a log file that the running process still appends to
///
/// Unlinking would leave the appender writing into a detached file, so
/// long-lived processes reset the contents instead.
pub fn truncate_log(path: &Path) -> Removal {
    let file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Removal::Missing,
        Err(e) => return Removal::Failed(e),
    };
    match file.set_len(0) {
        Ok(()) => Removal::Truncated,
        Err(e) => Removal::Failed(e),
    }
}

pub fn log_stale_log_removal(path: &Path, removal: &Removal) {
    match removal {
        Removal::Deleted => info!("Deleted {}", path.display()),
        Removal::Truncated => info!("Truncated {}", path.display()),
        Removal::Missing => {}
        Removal::Failed(e) => info!(
            "Could not delete {} (file may be in use): {}",
            path.display(),
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_existing_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("yesim_devices.json");
        let page = dir.path().join("rendered_page.html");
        std::fs::write(&output, "{}").unwrap();

        cleanup_artifacts(&[output.as_path(), page.as_path()]);

        assert!(!output.exists());
        assert!(!page.exists());
    }

    #[test]
    fn removal_reports_each_case() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("esim_crawler.log");
        std::fs::write(&log, "old").unwrap();

        assert!(matches!(remove_stale_log(&log), Removal::Deleted));
        assert!(matches!(remove_stale_log(&log), Removal::Missing));
        // A directory cannot be removed as a file
        assert!(matches!(remove_file(dir.path()), Removal::Failed(_)));
    }

    #[test]
    fn truncate_keeps_the_file_but_drops_old_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("esim_crawler.log");
        std::fs::write(&log, "previous run\n").unwrap();

        assert!(matches!(truncate_log(&log), Removal::Truncated));
        assert!(log.exists());
        assert_eq!(std::fs::metadata(&log).unwrap().len(), 0);

        std::fs::remove_file(&log).unwrap();
        assert!(matches!(truncate_log(&log), Removal::Missing));
    }
}
