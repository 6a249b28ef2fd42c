//! Output artifact writing and loading
//!
//! The artifact holds either one JSON value or newline-delimited JSON
//! objects. Loading tries the single-value form first; on failure every line
//! is parsed on its own, malformed lines are skipped with a warning, and the
//! survivors are wrapped as `{"items": [...]}`.

use serde::Serialize;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::OutputFormat;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Output file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to access output file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Output file is empty: {0}")]
    Empty(PathBuf),

    #[error("No valid JSON objects found in {0}")]
    NoValidObjects(PathBuf),

    #[error("Failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Overwrite `path` with `value` in the requested format
///
/// The file is replaced, never appended to, so a previous run cannot leak
/// stale items into this one.
pub fn write_output<T: Serialize>(
    path: &Path,
    value: &T,
    format: OutputFormat,
) -> Result<(), OutputError> {
    let mut body = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Jsonl => serde_json::to_string(value)?,
    };
    body.push('\n');

    std::fs::write(path, body).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Wrote crawl result to {}", path.display());
    Ok(())
}

/// Load the output artifact as a single JSON value
pub fn load_output(path: &Path) -> Result<Value, OutputError> {
    if !path.exists() {
        error!("JSON file not found: {}", path.display());
        return Err(OutputError::NotFound(path.to_path_buf()));
    }

    let raw = std::fs::read_to_string(path).map_err(|source| OutputError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let content = raw.trim();
    if content.is_empty() {
        return Err(OutputError::Empty(path.to_path_buf()));
    }

    match serde_json::from_str::<Value>(content) {
        Ok(value) => {
            info!("Loaded single JSON object from {}", path.display());
            Ok(value)
        }
        Err(_) => {
            info!("Attempting to parse {} as JSON Lines", path.display());
            let items = parse_json_lines(content);
            if items.is_empty() {
                error!("No valid JSON objects found in {}", path.display());
                return Err(OutputError::NoValidObjects(path.to_path_buf()));
            }
            info!("Loaded {} JSON objects from {}", items.len(), path.display());
            Ok(json!({ "items": items }))
        }
    }
}

fn parse_json_lines(content: &str) -> Vec<Value> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            match serde_json::from_str(line) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Skipping invalid JSON on line {}: {}", index + 1, e);
                    None
                }
            }
        })
        .collect()
}
