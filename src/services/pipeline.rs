//! End-to-end pipeline: scrape, load, transform, enrich.
//!
//! Stages run strictly in order. A failing stage is logged and recorded,
//! and the remaining stages still run.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{error, info};

use super::{read_channels, Enricher, ScraperService};
use crate::db::{self, DbPool};
use crate::{Error, Result};

/// One step of the pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<()>;
}

/// Result of one stage.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub name: String,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl StageOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub stages: Vec<StageOutcome>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.stages.iter().all(StageOutcome::succeeded)
    }

    pub fn failed_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| !s.succeeded())
            .map(|s| s.name.as_str())
            .collect()
    }
}

#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl PipelineStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self) -> PipelineReport {
        let mut report = PipelineReport::default();

        for stage in &self.stages {
            info!(stage = stage.name(), "Running stage");
            let started = Instant::now();
            let result = stage.run().await;
            let elapsed = started.elapsed();

            let error = match result {
                Ok(()) => {
                    info!(stage = stage.name(), elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
                    None
                }
                Err(e) => {
                    error!(stage = stage.name(), error = %e, "Stage failed");
                    Some(e.to_string())
                }
            };
            report.stages.push(StageOutcome {
                name: stage.name().to_string(),
                error,
                elapsed,
            });
        }

        report
    }
}

// ============================================================================
// Stages
// ============================================================================

/// Incremental scrape of the channels listed in a file.
pub struct ScrapeStage {
    pub scraper: ScraperService,
    pub channels_file: PathBuf,
}

#[async_trait]
impl PipelineStage for ScrapeStage {
    fn name(&self) -> &str {
        "scrape"
    }

    async fn run(&self) -> Result<()> {
        let channels = read_channels(Some(&self.channels_file), &[]).await?;
        if channels.is_empty() {
            return Err(Error::InvalidInput(format!(
                "No channels provided in {}",
                self.channels_file.display()
            )));
        }
        self.scraper.run(&channels).await?;
        Ok(())
    }
}

/// Load the message files into `raw.telegram_messages`.
pub struct LoadStage {
    pub pool: DbPool,
    pub source: PathBuf,
}

#[async_trait]
impl PipelineStage for LoadStage {
    fn name(&self) -> &str {
        "load"
    }

    async fn run(&self) -> Result<()> {
        super::load_dir(&self.pool, &self.source).await?;
        Ok(())
    }
}

/// Rebuild the analytics views.
pub struct TransformStage {
    pub pool: DbPool,
    pub schema: String,
}

#[async_trait]
impl PipelineStage for TransformStage {
    fn name(&self) -> &str {
        "transform"
    }

    async fn run(&self) -> Result<()> {
        db::run_transform(&self.pool, &self.schema).await
    }
}

/// Object detection over downloaded images.
pub struct EnrichStage {
    pub pool: DbPool,
    /// `None` when no detector endpoint is configured.
    pub enricher: Option<Enricher>,
}

#[async_trait]
impl PipelineStage for EnrichStage {
    fn name(&self) -> &str {
        "enrich"
    }

    async fn run(&self) -> Result<()> {
        let enricher = self
            .enricher
            .as_ref()
            .ok_or_else(|| Error::Config("DETECTOR_URL is not set".to_string()))?;
        enricher.run(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl PipelineStage for Recording {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self) -> Result<()> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                Err(Error::Internal(format!("{} broke", self.name)))
            } else {
                Ok(())
            }
        }
    }

    fn pipeline(failing: &[&'static str], log: &Arc<Mutex<Vec<&'static str>>>) -> Pipeline {
        ["scrape", "load", "transform", "enrich"]
            .into_iter()
            .fold(Pipeline::new(), |p, name| {
                p.stage(Recording {
                    name,
                    fail: failing.contains(&name),
                    log: log.clone(),
                })
            })
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(&[], &log);
        assert_eq!(pipeline.stage_names(), vec!["scrape", "load", "transform", "enrich"]);

        let report = pipeline.run().await;

        assert!(report.succeeded());
        assert_eq!(*log.lock().unwrap(), vec!["scrape", "load", "transform", "enrich"]);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_later_stages() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let report = pipeline(&["load"], &log).run().await;

        assert!(!report.succeeded());
        assert_eq!(report.failed_stages(), vec!["load"]);
        assert_eq!(log.lock().unwrap().len(), 4);
        assert!(report.stages[1]
            .error
            .as_deref()
            .unwrap()
            .contains("load broke"));
    }
}
