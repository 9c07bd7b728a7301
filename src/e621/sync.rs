//! One synchronization session from tag lines to files on disk.
//!
//! Discovery and filtering run one tag group at a time against the shared
//! dedup cache. Approved downloads from every group are collected and run as
//! a single bounded-parallel batch, after which the watermark advances.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::e621::alias::TagAliasResolver;
use crate::e621::cache::DedupCache;
use crate::e621::download::{BatchReport, DownloadScheduler, DownloadTask, Transport};
use crate::e621::filter::{AliasedBlacklist, Disposition, DispositionCounts, decide};
use crate::e621::run_state::RunStateTracker;
use crate::e621::search::SearchAccumulator;
use crate::e621::sender::ContentIndex;
use crate::e621::tag_group::TagGroup;

#[derive(Debug, Clone)]
pub(crate) struct SyncSettings {
    pub(crate) download_directory: PathBuf,
    pub(crate) posts_per_page: u32,
    pub(crate) max_pages: u32,
}

/// The outcome of one tag group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupReport {
    pub(crate) line: String,
    pub(crate) found: usize,
    pub(crate) invalid: usize,
    pub(crate) counts: DispositionCounts,
    /// The search stopped early on a failed request or at the page limit.
    pub(crate) search_aborted: bool,
}

#[derive(Debug)]
pub(crate) struct SessionReport {
    pub(crate) groups: Vec<GroupReport>,
    pub(crate) batch: BatchReport,
    /// The watermark after the session.
    pub(crate) last_run: NaiveDate,
    pub(crate) watermark_advanced: bool,
}

impl SessionReport {
    pub(crate) fn approved(&self) -> usize {
        self.groups.iter().map(|g| g.counts.approved).sum()
    }
}

pub(crate) struct Synchronizer<C, T> {
    index: Arc<C>,
    scheduler: DownloadScheduler<T>,
    settings: SyncSettings,
}

impl<C, T> Synchronizer<C, T>
where
    C: ContentIndex,
    T: Transport + 'static,
{
    pub(crate) fn new(index: Arc<C>, scheduler: DownloadScheduler<T>, settings: SyncSettings) -> Self {
        Self {
            index,
            scheduler,
            settings,
        }
    }

    /// Runs a session over `lines`, updating `cache` and `state`.
    ///
    /// The watermark moves to the day before `today` unless a group's search
    /// was cut short, by a failed request or by the page limit, in which case
    /// it stays so the window is searched again.
    /// Failed downloads do not hold it back.
    pub(crate) async fn run(
        &self,
        lines: &[String],
        blacklist: &[String],
        cache: &mut DedupCache,
        state: &mut RunStateTracker,
        today: NaiveDate,
    ) -> SessionReport {
        let mut resolver = TagAliasResolver::new(self.index.as_ref());
        let blacklist = AliasedBlacklist::new(resolver.resolve_all(blacklist.iter().map(String::as_str)).await);
        debug!("Blacklist resolved to {} tags", blacklist.len());

        info!("e621 was last checked on {}.", state.last_run());
        let accumulator = SearchAccumulator::new(
            self.index.as_ref(),
            self.settings.posts_per_page,
            self.settings.max_pages,
        );

        let mut groups = Vec::new();
        let mut tasks = Vec::new();
        for line in lines.iter().filter(|line| !line.trim().is_empty()) {
            let (report, approved) = self
                .process_group(line, &mut resolver, &accumulator, &blacklist, cache, state.last_run())
                .await;
            groups.push(report);
            tasks.extend(approved);
        }

        let batch = if tasks.is_empty() {
            info!("Nothing to download.");
            BatchReport::default()
        } else {
            self.scheduler.run(tasks).await
        };

        if batch.failed() > 0 {
            warn!(
                "{} of {} downloads failed; they stay cached and will not be retried.",
                batch.failed(),
                batch.outcomes.len()
            );
        } else if !batch.outcomes.is_empty() {
            info!("Successfully downloaded {} files.", batch.succeeded());
        }

        let aborted = groups.iter().filter(|g| g.search_aborted).count();
        let watermark_advanced = aborted == 0;
        if watermark_advanced {
            let last_run = state.advance(today);
            info!("Last run updated to {}.", last_run);
        } else {
            warn!(
                "{} searches did not complete, last run stays at {}.",
                aborted,
                state.last_run()
            );
        }

        SessionReport {
            groups,
            batch,
            last_run: state.last_run(),
            watermark_advanced,
        }
    }

    async fn process_group(
        &self,
        line: &str,
        resolver: &mut TagAliasResolver<'_, C>,
        accumulator: &SearchAccumulator<'_, C>,
        blacklist: &AliasedBlacklist,
        cache: &mut DedupCache,
        after: NaiveDate,
    ) -> (GroupReport, Vec<DownloadTask>) {
        info!("Checking for new posts tagged: {}.", line);
        let group = TagGroup::expand(line, resolver).await;
        let accumulation = accumulator.accumulate(&group.search_tags, after).await;

        let mut counts = DispositionCounts::default();
        let mut approved = Vec::new();
        for (idx, post) in accumulation.posts.iter().enumerate() {
            let disposition = decide(post, &group, blacklist, cache, &self.settings.download_directory);
            counts.record(&disposition);
            match disposition {
                Disposition::Approved(task) => {
                    debug!("\t({}) post {} will be downloaded", idx, post.id);
                    approved.push(task);
                }
                Disposition::Skipped(reason) => debug!("\t({}) post {} skipped ({})", idx, post.id, reason),
            }
        }

        debug!(
            "Update for group {} completed: {} candidates from {} pages.",
            line,
            counts.total(),
            accumulation.pages_fetched
        );
        info!(
            "{} new ({} found, {} missing tags, {} blacklisted, {} downloaded, {} cached)",
            counts.approved,
            accumulation.posts.len(),
            counts.missing_tag,
            counts.blacklisted,
            counts.on_disk,
            counts.cached
        );

        let report = GroupReport {
            line: line.to_string(),
            found: accumulation.posts.len(),
            invalid: accumulation.invalid,
            counts,
            search_aborted: !accumulation.is_complete(),
        };
        (report, approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::e621::testing::{FakeIndex, FakeTransport, post};
    use std::fs;
    use tempfile::{TempDir, tempdir};
    use tracing_subscriber::EnvFilter;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn yesterday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
    }

    fn long_ago() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
    }

    fn synchronizer(index: FakeIndex, transport: FakeTransport, dir: &TempDir) -> Synchronizer<FakeIndex, FakeTransport> {
        Synchronizer::new(
            Arc::new(index),
            DownloadScheduler::new(Arc::new(transport), 3),
            SyncSettings {
                download_directory: dir.path().to_path_buf(),
                posts_per_page: 2,
                max_pages: 750,
            },
        )
    }

    fn lines(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|l| l.to_string()).collect()
    }

    fn wolves(count: u64) -> Vec<crate::e621::sender::entries::PostEntry> {
        (1..=count).map(|i| post(i, &format!("md5_{}", i), "wolf solo")).collect()
    }

    #[tokio::test]
    async fn second_run_downloads_nothing() {
        let dir = tempdir().unwrap();
        let sync = synchronizer(FakeIndex::new(wolves(5)), FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let first = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;
        assert_eq!(first.approved(), 5);
        assert_eq!(first.batch.succeeded(), 5);
        assert!(dir.path().join("wolf 3.png").exists());

        let second = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;
        assert_eq!(second.approved(), 0);
        assert_eq!(second.groups[0].counts.on_disk, 5);
        assert!(second.batch.outcomes.is_empty());
    }

    #[tokio::test]
    async fn deleted_files_are_not_downloaded_again() {
        let dir = tempdir().unwrap();
        let sync = synchronizer(FakeIndex::new(wolves(3)), FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;
        for entry in fs::read_dir(dir.path()).unwrap() {
            fs::remove_file(entry.unwrap().path()).unwrap();
        }

        let second = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;
        assert_eq!(second.approved(), 0);
        assert_eq!(second.groups[0].counts.cached, 3);
    }

    #[tokio::test]
    async fn overflow_line_filters_on_extra_tags() {
        let dir = tempdir().unwrap();
        let index = FakeIndex::new(vec![
            post(1, "m1", "a b c d e"),
            post(2, "m2", "a b c d e f"),
            post(3, "m3", "a b c d e g"),
            post(4, "m4", "a b c d e gore"),
            post(5, "m5", "a b c d e f gory_alias"),
        ])
        .aliased("gory", 77, "gory_alias");
        let sync = synchronizer(index, FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync
            .run(&lines(&["a b c d e f g"]), &lines(&["gory"]), &mut cache, &mut state, today())
            .await;

        let counts = report.groups[0].counts;
        assert_eq!(report.groups[0].found, 5);
        assert_eq!(counts.missing_tag, 2);
        assert_eq!(counts.blacklisted, 1);
        assert_eq!(counts.approved, 2);
        assert!(cache.contains("m2") && cache.contains("m3"));
    }

    #[tokio::test]
    async fn groups_share_the_cache() {
        let dir = tempdir().unwrap();
        let sync = synchronizer(FakeIndex::new(wolves(1)), FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync.run(&lines(&["wolf", "solo"]), &[], &mut cache, &mut state, today()).await;

        assert_eq!(report.groups[0].counts.approved, 1);
        assert_eq!(report.groups[1].counts.cached, 1);
        assert_eq!(report.batch.outcomes.len(), 1);
    }

    #[tokio::test]
    async fn failed_download_still_advances_and_stays_cached() {
        let dir = tempdir().unwrap();
        let transport = FakeTransport::new().failing_on("https://static1.e621.net/data/md5_2.png");
        let sync = synchronizer(FakeIndex::new(wolves(3)), transport, &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;

        assert_eq!(report.batch.failed(), 1);
        assert_eq!(report.batch.succeeded(), 2);
        assert!(report.watermark_advanced);
        assert_eq!(state.last_run(), yesterday());
        assert!(cache.contains("md5_2"));

        let again = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;
        assert_eq!(again.approved(), 0);
        assert_eq!(again.groups[0].counts.cached, 1);
    }

    #[tokio::test]
    async fn watermark_advances_regardless_of_volume() {
        let dir = tempdir().unwrap();
        let sync = synchronizer(FakeIndex::new(Vec::new()), FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;

        assert_eq!(report.approved(), 0);
        assert_eq!(report.last_run, yesterday());
        assert_eq!(state.last_run(), yesterday());
    }

    #[tokio::test]
    async fn aborted_search_holds_the_watermark() {
        let dir = tempdir().unwrap();
        let index = FakeIndex::new(wolves(5)).failing_on_page(2);
        let sync = synchronizer(index, FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;

        assert!(report.groups[0].search_aborted);
        assert_eq!(report.groups[0].found, 2);
        assert_eq!(report.batch.succeeded(), 2);
        assert!(!report.watermark_advanced);
        assert_eq!(state.last_run(), long_ago());
    }

    #[tokio::test]
    async fn page_limit_holds_the_watermark() {
        let dir = tempdir().unwrap();
        let sync = Synchronizer::new(
            Arc::new(FakeIndex::new(wolves(10))),
            DownloadScheduler::new(Arc::new(FakeTransport::new()), 3),
            SyncSettings {
                download_directory: dir.path().to_path_buf(),
                posts_per_page: 2,
                max_pages: 2,
            },
        );
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;

        assert_eq!(report.groups[0].found, 4);
        assert!(report.groups[0].search_aborted);
        assert!(!report.watermark_advanced);
        assert_eq!(state.last_run(), long_ago());
    }

    #[tokio::test]
    async fn watermark_advances_with_info_logging_disabled() {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("warn"))
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let dir = tempdir().unwrap();
        let sync = synchronizer(FakeIndex::new(wolves(1)), FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync.run(&lines(&["wolf"]), &[], &mut cache, &mut state, today()).await;

        assert!(report.watermark_advanced);
        assert_eq!(report.last_run, yesterday());
        assert_eq!(state.last_run(), yesterday());
    }

    #[tokio::test]
    async fn unknown_blacklist_tags_are_ignored() {
        let dir = tempdir().unwrap();
        let sync = synchronizer(FakeIndex::new(wolves(2)).unknown("notatag"), FakeTransport::new(), &dir);
        let mut cache = DedupCache::new(100);
        let mut state = RunStateTracker::new(long_ago());

        let report = sync
            .run(&lines(&["wolf", "   "]), &lines(&["notatag"]), &mut cache, &mut state, today())
            .await;

        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.approved(), 2);
    }
}
