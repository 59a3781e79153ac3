use std::{fmt::Display, io, time::Duration};

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use thiserror::Error;

use crate::db::omie::{
    config::{ConfigError, HarvestConfig},
    fetch::{Fetcher, Outcome},
    schedule::{Task, TaskSchedule},
};

const PROGRESS_TEMPLATE: &str = "{msg} [{elapsed_precise}] {wide_bar} {pos}/{len} ({eta})";

#[derive(Error, Debug)]
pub enum HarvestError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to create root folder: {0}")]
    Io(#[from] io::Error),
}

/// Pause between downloads so the portal isn't hammered.  Nothing was
/// requested for a skipped file, and a 404 is cheap, so neither waits.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub delay: Duration,
}

impl Pacing {
    pub fn pause_after(&self, outcome: Outcome) -> Duration {
        match outcome {
            Outcome::Success => self.delay,
            Outcome::Failed => self.delay * 2,
            Outcome::Skipped | Outcome::NotFound => Duration::ZERO,
        }
    }
}

/// Count of outcomes for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub success: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl Summary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::NotFound => self.not_found += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.skipped + self.not_found + self.failed
    }
}

impl Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} files: {} downloaded, {} skipped, {} not found, {} failed",
            self.total(),
            self.success,
            self.skipped,
            self.not_found,
            self.failed
        )
    }
}

/// Walks the schedule and downloads one file after the other.
pub struct Harvester {
    config: HarvestConfig,
    fetcher: Fetcher,
    pacing: Pacing,
}

impl Harvester {
    pub fn new(config: HarvestConfig) -> Result<Harvester, HarvestError> {
        config.validate()?;
        let fetcher = Fetcher::new(&config)?;
        let pacing = Pacing {
            delay: config.delay,
        };
        Ok(Harvester {
            config,
            fetcher,
            pacing,
        })
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Download every file of the configured years.
    pub async fn run(&self) -> Result<Summary, HarvestError> {
        tokio::fs::create_dir_all(&self.config.root_dir).await?;
        let schedule = TaskSchedule::from_config(&self.config);
        info!(
            "Harvesting {} OMIE files for {}-{} into {}",
            schedule.len(),
            self.config.start_year,
            self.config.end_year,
            self.config.root_dir.display()
        );

        let progress = ProgressBar::new(schedule.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(PROGRESS_TEMPLATE) {
            progress.set_style(style);
        }
        progress.set_message("Overall progress");
        let summary = self.run_tasks(schedule.iter(), &progress).await;
        progress.finish();
        Ok(summary)
    }

    /// Fetch the tasks in order.  A failed task never stops the run.
    pub async fn run_tasks<I>(&self, tasks: I, progress: &ProgressBar) -> Summary
    where
        I: IntoIterator<Item = Task>,
    {
        let mut summary = Summary::default();
        for task in tasks {
            let outcome = self.fetcher.fetch(&task).await;
            if outcome == Outcome::Failed {
                warn!("Failed to download {}", task);
            }
            summary.record(outcome);
            progress.inc(1);

            let pause = self.pacing.pause_after(outcome);
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        summary
    }
}
