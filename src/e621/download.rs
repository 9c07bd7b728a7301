//! Bounded-parallel execution of approved downloads.
//!
//! Every task runs on its own tokio task but must hold a semaphore permit
//! while transferring, so at most `parallelism` transfers are in flight.
//! Tasks fail independently: a failure is recorded for that task only and
//! nothing is retried. The batch is joined before `run` returns.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

#[derive(Error, Debug)]
pub(crate) enum DownloadError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Download task failed: {0}")]
    Task(String),
}

pub(crate) type DownloadResult<T> = Result<T, DownloadError>;

/// Fetches one URL into one file.
#[async_trait]
pub(crate) trait Transport: Send + Sync {
    /// Writes the full response body to `destination`, returning the bytes written.
    async fn fetch_to_file(&self, url: &str, destination: &Path) -> DownloadResult<u64>;
}

/// One approved download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DownloadTask {
    pub(crate) url: String,
    pub(crate) destination: PathBuf,
}

/// What happened to one task of a batch.
#[derive(Debug)]
pub(crate) struct TaskOutcome {
    pub(crate) task: DownloadTask,
    pub(crate) result: DownloadResult<u64>,
}

/// Outcomes of a batch, in the order the tasks were submitted.
#[derive(Debug, Default)]
pub(crate) struct BatchReport {
    pub(crate) outcomes: Vec<TaskOutcome>,
}

impl BatchReport {
    pub(crate) fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub(crate) fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub(crate) fn bytes_downloaded(&self) -> u64 {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()).sum()
    }
}

pub(crate) struct DownloadScheduler<T> {
    transport: Arc<T>,
    parallelism: usize,
    progress: ProgressBar,
}

impl<T: Transport + 'static> DownloadScheduler<T> {
    pub(crate) fn new(transport: Arc<T>, parallelism: usize) -> Self {
        Self {
            transport,
            parallelism: parallelism.max(1),
            progress: ProgressBar::hidden(),
        }
    }

    /// Reports each finished task on `progress`.
    pub(crate) fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Runs every task and waits for all of them.
    pub(crate) async fn run(&self, tasks: Vec<DownloadTask>) -> BatchReport {
        if tasks.is_empty() {
            return BatchReport::default();
        }

        info!("Starting download of {} files with {} parallel downloads.", tasks.len(), self.parallelism);
        self.progress.set_length(tasks.len() as u64);

        let semaphore = Arc::new(Semaphore::new(self.parallelism));
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let semaphore = semaphore.clone();
                let transport = self.transport.clone();
                let progress = self.progress.clone();
                let url = task.url.clone();
                let destination = task.destination.clone();

                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| DownloadError::Task(e.to_string()))?;
                    let result = transport.fetch_to_file(&url, &destination).await;
                    progress.inc(1);
                    result
                });
                (task, handle)
            })
            .collect();

        let mut report = BatchReport::default();
        for (task, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(DownloadError::Task(e.to_string())),
            };

            match &result {
                Ok(bytes) => debug!("Downloaded {} ({} bytes)", task.destination.display(), bytes),
                Err(e) => error!("Failed to download {}: {}", task.url, e),
            }
            report.outcomes.push(TaskOutcome { task, result });
        }

        self.progress.finish_and_clear();
        report
    }
}

/// Where a transfer is written before it is complete.
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

/// Writes a byte stream to `path`, creating or truncating it.
pub(crate) async fn stream_to_file<S, B, E>(stream: S, path: &Path) -> DownloadResult<u64>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<DownloadError>,
{
    let mut stream = std::pin::pin!(stream);
    let mut file = File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(Into::into)?;
        file.write_all(chunk.as_ref()).await?;
        written += chunk.as_ref().len() as u64;
    }

    file.flush().await?;
    Ok(written)
}
