//! One crawl-and-deliver run
//!
//! cleanup -> fetch -> extract -> write artifact -> load artifact -> deliver.
//! Every run executes inside a `crawl_run` span with its own `run_id`, so all
//! component logs of one run can be grouped. Blocked and empty pages are
//! successful runs that deliver a diagnostic payload; only infrastructure
//! failures surface as [`RunError`].

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::browser::BrowserError;
use crate::cleanup::cleanup_artifacts;
use crate::delivery::{DeliveryClient, DeliveryError};
use crate::extract::{CrawlResult, DeviceSource, extract_devices};
use crate::fetcher::PageSource;
use crate::output::{OutputError, load_output, write_output};
use crate::Config;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Crawl timed out after {0}s")]
    CrawlTimeout(u64),

    #[error("Failed to fetch page: {0}")]
    Fetch(#[from] BrowserError),

    #[error("Failed to handle output artifact: {0}")]
    Output(#[from] OutputError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Failed to send data to webhook after {attempts} attempts")]
    DeliveryExhausted { attempts: usize },
}

/// What one successful run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub outcome: &'static str,
    pub device_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<DeviceSource>,
    pub delivery_attempts: usize,
}

pub struct Pipeline {
    config: Config,
    source: Arc<dyn PageSource>,
    delivery: DeliveryClient,
}

impl Pipeline {
    pub fn new(config: Config, source: Arc<dyn PageSource>) -> Result<Self, RunError> {
        let delivery = DeliveryClient::new(&config.webhook)?;
        Ok(Self {
            config,
            source,
            delivery,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run_once(&self) -> Result<RunSummary, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("crawl_run", %run_id);
        self.run(run_id).instrument(span).await
    }

    async fn run(&self, run_id: Uuid) -> Result<RunSummary, RunError> {
        info!("Starting eSIM device crawling process");
        if self.config.debug {
            info!("Running in DEBUG mode");
        }

        let files = &self.config.files;
        cleanup_artifacts(&[files.output.as_path(), files.rendered_page.as_path()]);

        let run_timeout = self.config.crawl.run_timeout_secs;
        let result = tokio::time::timeout(Duration::from_secs(run_timeout), self.crawl())
            .await
            .map_err(|_| {
                error!("Crawl timed out after {} seconds", run_timeout);
                RunError::CrawlTimeout(run_timeout)
            })??;

        write_output(&files.output, &result, files.output_format)?;
        let payload = load_output(&files.output)?;

        let report = self.delivery.deliver(&payload).await?;
        if !report.delivered {
            error!("Failed to send data to webhook {}", self.delivery.url());
            return Err(RunError::DeliveryExhausted {
                attempts: report.attempt_count(),
            });
        }

        info!("Process completed successfully");
        Ok(RunSummary {
            run_id,
            outcome: result.kind(),
            device_count: result.device_count(),
            source: result.source(),
            delivery_attempts: report.attempt_count(),
        })
    }

    async fn crawl(&self) -> Result<CrawlResult, RunError> {
        let target = &self.config.crawl.target_url;
        info!("Starting crawl of {}", target);

        let page = self.source.fetch(target).await.map_err(|e| {
            error!("Failed to fetch {}: {}", target, e);
            e
        })?;

        let result = extract_devices(&page.url, &page.html);
        match &result {
            CrawlResult::Devices { total_count, .. } => {
                info!(devices = *total_count, "Crawl produced a device list")
            }
            CrawlResult::Blocked { .. } => warn!("Crawl was blocked by edge protection"),
            CrawlResult::Empty { .. } => warn!("Crawl found no device data"),
        }
        Ok(result)
    }
}
