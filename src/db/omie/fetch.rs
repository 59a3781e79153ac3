use std::{
    error::Error as StdError,
    fmt::Display,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use log::{debug, error};
use reqwest::{header::USER_AGENT, Client, Response, StatusCode};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::{AsyncWriteExt, BufWriter},
    time::timeout,
};

use crate::db::omie::{config::HarvestConfig, error_log::ErrorLog, schedule::Task};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// How a single download ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The file was downloaded.
    Success,
    /// The file was already on disk, no request was made.
    Skipped,
    /// The portal doesn't have this file.  Expected for days that haven't
    /// been published yet.
    NotFound,
    /// Any other status or a transport fault.  Recorded in the error log.
    Failed,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Outcome::*;
        match self {
            Success => write!(f, "success"),
            Skipped => write!(f, "skipped"),
            NotFound => write!(f, "not_found"),
            Failed => write!(f, "failed"),
        }
    }
}

#[derive(Error, Debug)]
enum FetchError {
    #[error("HTTP {}", .0.as_u16())]
    Status(StatusCode),
    #[error("{}", describe(.0))]
    Transport(#[from] reqwest::Error),
    #[error("timed out waiting for the {0}")]
    Timeout(&'static str),
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// reqwest keeps the useful part of the message (connection refused, ...)
/// in the source chain.
fn describe(e: &reqwest::Error) -> String {
    let mut out = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

/// Downloads one file at a time into `root/category/filename`.
///
/// Never retries.  A file that is already on disk is never requested again,
/// so running the whole harvest again is how failures get retried.
pub struct Fetcher {
    client: Client,
    root_dir: PathBuf,
    url_template: String,
    request_timeout: Duration,
    chunk_timeout: Duration,
    chunk_size: usize,
    error_log: ErrorLog,
}

impl Fetcher {
    /// Build the http client once, its connection pool is reused for all the
    /// tasks of a run.
    pub fn new(config: &HarvestConfig) -> Result<Fetcher, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Fetcher::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &HarvestConfig) -> Fetcher {
        Fetcher {
            client,
            root_dir: config.root_dir.clone(),
            url_template: config.url_template.clone(),
            request_timeout: config.request_timeout,
            chunk_timeout: config.chunk_timeout,
            chunk_size: config.chunk_size,
            error_log: ErrorLog::new(&config.log_file),
        }
    }

    /// Where the file for this task is saved.
    pub fn destination(&self, task: &Task) -> PathBuf {
        self.root_dir.join(&task.category).join(&task.filename)
    }

    pub fn url(&self, task: &Task) -> String {
        self.url_template
            .replace("{category}", &task.category)
            .replace("{filename}", &task.filename)
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.error_log
    }

    /// Download the file for this task.  Failures never escape, they are
    /// written to the error log and reported as [`Outcome::Failed`].
    pub async fn fetch(&self, task: &Task) -> Outcome {
        let path = self.destination(task);
        let res = self.try_fetch(task, &path).await;
        let logged = match res {
            Ok(outcome) => {
                debug!("{}: {}", task, outcome);
                return outcome;
            }
            Err(FetchError::Status(status)) => {
                self.error_log.http_failure(&task.filename, status.as_u16())
            }
            Err(e) => self.error_log.fault(&task.filename, &e.to_string()),
        };
        if let Err(e) = logged {
            error!(
                "Failed to write to error log {}: {}",
                self.error_log.path().display(),
                e
            );
        }
        Outcome::Failed
    }

    async fn try_fetch(&self, task: &Task, path: &Path) -> Result<Outcome, FetchError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        if fs::try_exists(path).await? {
            return Ok(Outcome::Skipped);
        }

        let request = self
            .client
            .get(self.url(task))
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .send();
        let mut response = timeout(self.request_timeout, request)
            .await
            .map_err(|_| FetchError::Timeout("response"))??;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Ok(Outcome::NotFound),
            status => return Err(FetchError::Status(status)),
        }

        // only a complete body gets the final name
        let partial = partial_path(path);
        match self.write_body(&mut response, &partial).await {
            Ok(()) => {
                fs::rename(&partial, path).await?;
                Ok(Outcome::Success)
            }
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    async fn write_body(&self, response: &mut Response, path: &Path) -> Result<(), FetchError> {
        let file = File::create(path).await?;
        let mut out = BufWriter::with_capacity(self.chunk_size, file);
        while let Some(chunk) = timeout(self.chunk_timeout, response.chunk())
            .await
            .map_err(|_| FetchError::Timeout("next chunk"))??
        {
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        Ok(())
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
