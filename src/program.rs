use std::fs::create_dir_all;
use std::sync::Arc;

use anyhow::{Context, Error, anyhow};
use chrono::Local;
use console::Term;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing::{debug, error, info, trace, warn};

use crate::e621::cache_store::CacheStore;
use crate::e621::download::DownloadScheduler;
use crate::e621::io::{ConfigError, ConfigManager};
use crate::e621::run_state::RunStateTracker;
use crate::e621::sender::RequestSender;
use crate::e621::sync::{SessionReport, SyncSettings, Synchronizer};

/// The name of the cargo package.
const NAME: &str = env!("CARGO_PKG_NAME");

/// The version of the cargo package.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The authors who created the package.
const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

/// Drives one session: bootstrap, synchronize, persist.
pub(crate) struct Program {
    config: ConfigManager,
}

impl Program {
    pub(crate) fn new(config: ConfigManager) -> Self {
        Self { config }
    }

    pub(crate) async fn run(mut self) -> Result<(), Error> {
        Term::stdout().set_title("e621 sync");
        trace!("Program Name: {}", NAME);
        trace!("Program Version: {}", VERSION);
        trace!("Program Authors: {}", AUTHORS);
        info!("Running {} version {}.", NAME, VERSION);

        let inputs = match self.config.load_inputs() {
            Ok(inputs) => inputs,
            Err(ConfigError::Bootstrap(issues)) => {
                for issue in &issues {
                    error!("{}", issue);
                }
                error!("Error(s) encountered during initialization, see above.");
                return Err(anyhow!("initialization failed with {} error(s)", issues.len()));
            }
            Err(e) => return Err(e).context("Failed to read the tag file or blacklist"),
        };

        let config = self.config.config().clone();
        let download_directory = self.config.resolve(&config.paths.download_directory);
        create_dir_all(&download_directory)
            .with_context(|| format!("Failed to create {}", download_directory.display()))?;

        let cache_path = self.config.resolve(&config.paths.cache_file);
        let mut store = CacheStore::open(&cache_path)
            .with_context(|| format!("Failed to open the download cache at {}", cache_path.display()))?;
        let mut cache = store
            .load(config.limits.cache_capacity)
            .context("Failed to load the download cache")?;
        if cache.is_empty() {
            info!("Download cache is empty, starting fresh.");
        }

        let sender = Arc::new(RequestSender::new(&config.remote).context("Failed to create the HTTP client")?);
        let scheduler = DownloadScheduler::new(sender.clone(), config.limits.parallel_downloads)
            .with_progress(Self::progress_bar());
        let synchronizer = Synchronizer::new(
            sender,
            scheduler,
            SyncSettings {
                download_directory,
                posts_per_page: config.limits.posts_per_page,
                max_pages: config.limits.max_pages,
            },
        );

        let mut state = RunStateTracker::new(config.state.last_run);
        let today = Local::now().date_naive();
        let report = synchronizer
            .run(&inputs.tag_lines, &inputs.blacklist, &mut cache, &mut state, today)
            .await;

        store.save(&cache).context("Failed to save the download cache")?;
        if report.watermark_advanced {
            self.config
                .save_last_run(report.last_run)
                .context("Failed to write the last run date to config.toml")?;
        }

        Self::log_summary(&report);
        Ok(())
    }

    fn progress_bar() -> ProgressBar {
        const PROGRESS_TEMPLATE: &str = "{spinner} {bar:40} {pos}/{len}";

        let style = ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");

        let bar = ProgressBar::new(0);
        bar.set_style(style);
        bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(5));
        bar
    }

    fn log_summary(report: &SessionReport) {
        let found: usize = report.groups.iter().map(|g| g.found).sum();
        let invalid: usize = report.groups.iter().map(|g| g.invalid).sum();
        info!("{} posts found across {} tag groups.", found, report.groups.len());
        if invalid > 0 {
            info!("{} posts had no downloadable file.", invalid);
        }

        for outcome in report.batch.outcomes.iter().filter(|o| o.result.is_err()) {
            debug!("Not downloaded: {}", outcome.task.destination.display());
        }

        for group in report.groups.iter().filter(|g| g.search_aborted) {
            warn!("Search for \"{}\" did not complete.", group.line);
        }

        info!(
            "Session finished: {} approved, {} downloaded ({} bytes), {} failed.",
            report.approved(),
            report.batch.succeeded(),
            report.batch.bytes_downloaded(),
            report.batch.failed()
        );
    }
}
