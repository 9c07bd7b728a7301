//! In-memory stand-ins for the remote service, shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;

use crate::e621::download::{DownloadError, DownloadResult, Transport};
use crate::e621::sender::entries::{AliasEntry, PostEntry, TagEntry};
use crate::e621::sender::{ApiError, ApiResult, ContentIndex};

pub(crate) fn post(id: u64, md5: &str, tags: &str) -> PostEntry {
    PostEntry {
        id,
        file_url: Some(format!("https://static1.e621.net/data/{}.png", md5)),
        md5: Some(md5.to_string()),
        file_ext: Some("png".to_string()),
        tags: tags.to_string(),
    }
}

/// Serves a fixed set of posts, filtered by tag and paginated.
///
/// Tags are canonical unless registered otherwise.
#[derive(Default)]
pub(crate) struct FakeIndex {
    posts: Vec<PostEntry>,
    unknown: HashSet<String>,
    aliased: HashMap<String, (u64, String)>,
    failing_aliases: HashSet<String>,
    failing_page: Option<u32>,
    page_calls: Mutex<Vec<(Vec<String>, u32)>>,
    alias_calls: Mutex<Vec<String>>,
}

impl FakeIndex {
    pub(crate) fn new(posts: Vec<PostEntry>) -> Self {
        Self {
            posts,
            ..Default::default()
        }
    }

    pub(crate) fn unknown(mut self, tag: &str) -> Self {
        self.unknown.insert(tag.to_string());
        self
    }

    pub(crate) fn aliased(mut self, tag: &str, id: u64, official: &str) -> Self {
        self.aliased.insert(tag.to_string(), (id, official.to_string()));
        self
    }

    pub(crate) fn alias_lookup_fails(mut self, tag: &str) -> Self {
        self.failing_aliases.insert(tag.to_string());
        self
    }

    pub(crate) fn failing_on_page(mut self, page: u32) -> Self {
        self.failing_page = Some(page);
        self
    }

    pub(crate) fn page_calls(&self) -> Vec<(Vec<String>, u32)> {
        self.page_calls.lock().unwrap().clone()
    }

    pub(crate) fn alias_calls(&self) -> Vec<String> {
        self.alias_calls.lock().unwrap().clone()
    }

    fn unavailable(url: &str) -> ApiError {
        ApiError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl ContentIndex for FakeIndex {
    async fn search_posts(&self, tags: &[String], _after: NaiveDate, page: u32, limit: u32) -> ApiResult<Vec<PostEntry>> {
        self.page_calls.lock().unwrap().push((tags.to_vec(), page));
        if self.failing_page == Some(page) {
            return Err(Self::unavailable("posts.json"));
        }

        let start = (page as usize - 1) * limit as usize;
        Ok(self
            .posts
            .iter()
            .filter(|p| tags.iter().all(|t| p.tags.split_whitespace().any(|pt| pt == t)))
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn tag_aliases(&self, tag: &str) -> ApiResult<Vec<AliasEntry>> {
        self.alias_calls.lock().unwrap().push(tag.to_string());
        if self.failing_aliases.contains(tag) {
            return Err(Self::unavailable("tag_aliases.json"));
        }
        if self.unknown.contains(tag) {
            return Ok(Vec::new());
        }
        Ok(match self.aliased.get(tag) {
            Some((id, _)) => vec![AliasEntry {
                alias_id: *id,
                name: tag.to_string(),
            }],
            None => vec![AliasEntry {
                alias_id: 0,
                name: format!("{}_(alternate)", tag),
            }],
        })
    }

    async fn tag_by_id(&self, id: u64) -> ApiResult<TagEntry> {
        self.aliased
            .values()
            .find(|(alias_id, _)| *alias_id == id)
            .map(|(_, name)| TagEntry { id, name: name.clone() })
            .ok_or_else(|| Self::unavailable("tags/{id}.json"))
    }
}

/// Writes the URL as the file body, or fails for selected URLs.
#[derive(Default)]
pub(crate) struct FakeTransport {
    failing: HashSet<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing_on(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn transfer(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(url) {
            return Err(DownloadError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "simulated reset")));
        }
        tokio::fs::write(destination, url.as_bytes()).await?;
        Ok(url.len() as u64)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_to_file(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let result = self.transfer(url, destination).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
