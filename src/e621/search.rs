use chrono::NaiveDate;
use tracing::{debug, trace, warn};

use crate::e621::sender::entries::Post;
use crate::e621::sender::{ApiError, ContentIndex};

/// Everything one tag group's search produced.
#[derive(Debug, Default)]
pub(crate) struct Accumulation {
    /// Candidates in retrieval order.
    pub(crate) posts: Vec<Post>,
    /// Entries without a downloadable file.
    pub(crate) invalid: usize,
    pub(crate) pages_fetched: u32,
    /// Set when a request failed and the search stopped early.
    pub(crate) error: Option<ApiError>,
    /// Set when the page limit was hit while pages were still full.
    pub(crate) truncated: bool,
}

impl Accumulation {
    /// Whether every page of the window was retrieved.
    pub(crate) fn is_complete(&self) -> bool {
        self.error.is_none() && !self.truncated
    }
}

/// Pages through one search until the remote index runs dry.
pub(crate) struct SearchAccumulator<'a, C: ?Sized> {
    index: &'a C,
    page_size: u32,
    max_pages: u32,
}

impl<'a, C: ContentIndex + ?Sized> SearchAccumulator<'a, C> {
    pub(crate) fn new(index: &'a C, page_size: u32, max_pages: u32) -> Self {
        Self {
            index,
            page_size: page_size.max(1),
            max_pages: max_pages.max(1),
        }
    }

    /// Collects every post matching `search_tags` uploaded after `after`.
    ///
    /// A page shorter than the page size ends the search. A failed request
    /// also ends it, keeping the posts found so far and reporting the error.
    /// Running out of pages while they are still full marks the result as
    /// truncated.
    pub(crate) async fn accumulate(&self, search_tags: &[String], after: NaiveDate) -> Accumulation {
        let mut accumulation = Accumulation::default();

        for page in 1..=self.max_pages {
            let entries = match self.index.search_posts(search_tags, after, page, self.page_size).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Search for \"{}\" failed on page {}: {}", search_tags.join(" "), page, e);
                    accumulation.error = Some(e);
                    return accumulation;
                }
            };
            accumulation.pages_fetched = page;

            let found = entries.len();
            trace!("Page {} returned {} posts", page, found);
            for entry in entries {
                match Post::try_from(entry) {
                    Ok(post) => accumulation.posts.push(post),
                    Err(entry) => {
                        debug!("Post {} has no downloadable file", entry.id);
                        accumulation.invalid += 1;
                    }
                }
            }

            if found < self.page_size as usize {
                return accumulation;
            }
        }

        warn!(
            "Search for \"{}\" reached the page limit of {}, raise limits.max_pages to reach older posts",
            search_tags.join(" "),
            self.max_pages
        );
        accumulation.truncated = true;
        accumulation
    }
}
