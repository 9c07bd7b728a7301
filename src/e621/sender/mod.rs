//! HTTP access to the e621 JSON API (`posts.json`, `tag_aliases.json`, `tags.json`).
//!
//! The rest of the crate only sees the [`ContentIndex`] and [`Transport`]
//! traits; [`RequestSender`] is the reqwest-backed implementation of both.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::e621::download::{DownloadError, DownloadResult, Transport, partial_path, stream_to_file};
use crate::e621::io::Remote;

pub(crate) mod entries;

use entries::{AliasEntry, ApiPost, ApiTagAlias, Listing, PostEntry, TagEntry};

#[derive(Error, Debug)]
pub(crate) enum ApiError {
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tag \"{0}\" named by an alias does not exist")]
    MissingTag(String),
}

pub(crate) type ApiResult<T> = Result<T, ApiError>;

/// The remote tag-indexed content index.
#[async_trait]
pub(crate) trait ContentIndex: Send + Sync {
    /// One page of posts matching every tag in `tags` and uploaded after `after`.
    async fn search_posts(&self, tags: &[String], after: NaiveDate, page: u32, limit: u32) -> ApiResult<Vec<PostEntry>>;

    /// Alias records for `tag`; empty when the tag is unknown.
    async fn tag_aliases(&self, tag: &str) -> ApiResult<Vec<AliasEntry>>;

    /// Tag metadata by alias identifier.
    async fn tag_by_id(&self, id: u64) -> ApiResult<TagEntry>;
}

/// Sends every request to the remote service.
#[derive(Clone)]
pub(crate) struct RequestSender {
    client: Client,
    base_url: String,
    api_timeout: Duration,
}

impl RequestSender {
    pub(crate) fn new(remote: &Remote) -> ApiResult<Self> {
        let client = Client::builder()
            .user_agent(&remote.user_agent)
            .connect_timeout(Duration::from_secs(remote.timeout_secs))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            api_timeout: Duration::from_secs(remote.timeout_secs),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> ApiResult<String> {
        debug!("Request URL: \"{}\" {:?}", url, query);
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(self.api_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status,
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> ApiResult<T> {
        let body = self.get_text(url, query).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn get_listing<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> ApiResult<Vec<T>> {
        let body = self.get_text(url, query).await?;
        Ok(serde_json::from_str::<Listing<T>>(&body)?.into_items())
    }

    /// Looks a tag up by its exact name.
    async fn find_tag(&self, name: &str) -> ApiResult<Option<TagEntry>> {
        let tags: Vec<TagEntry> = self
            .get_listing(
                &self.endpoint("tags.json"),
                &[("search[name]", name.to_string()), ("limit", "1".to_string())],
            )
            .await?;
        Ok(tags.into_iter().next())
    }
}

#[async_trait]
impl ContentIndex for RequestSender {
    async fn search_posts(&self, tags: &[String], after: NaiveDate, page: u32, limit: u32) -> ApiResult<Vec<PostEntry>> {
        let clause = format!("{} date:>{}", tags.join(" "), after.format("%Y-%m-%d"));
        let posts: Vec<ApiPost> = self
            .get_listing(
                &self.endpoint("posts.json"),
                &[
                    ("tags", clause),
                    ("page", page.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        Ok(posts.into_iter().map(PostEntry::from).collect())
    }

    /// An active alias yields one record naming `tag` and pointing at the
    /// consequent tag's id. A tag that is not an alias yields its own record.
    /// A tag that does not exist yields nothing.
    async fn tag_aliases(&self, tag: &str) -> ApiResult<Vec<AliasEntry>> {
        let aliases: Vec<ApiTagAlias> = self
            .get_listing(
                &self.endpoint("tag_aliases.json"),
                &[
                    ("search[antecedent_name]", tag.to_string()),
                    ("search[status]", "active".to_string()),
                ],
            )
            .await?;

        if let Some(alias) = aliases.into_iter().next() {
            let Some(consequent) = self.find_tag(&alias.consequent_name).await? else {
                return Err(ApiError::MissingTag(alias.consequent_name));
            };
            debug!(
                "Alias #{} maps \"{}\" to tag #{}",
                alias.id, alias.antecedent_name, consequent.id
            );
            return Ok(vec![AliasEntry {
                alias_id: consequent.id,
                name: tag.to_string(),
            }]);
        }

        Ok(self
            .find_tag(tag)
            .await?
            .map(|own| AliasEntry {
                alias_id: own.id,
                name: own.name,
            })
            .into_iter()
            .collect())
    }

    async fn tag_by_id(&self, id: u64) -> ApiResult<TagEntry> {
        self.get_json(&self.endpoint(&format!("tags/{}.json", id)), &[]).await
    }
}

#[async_trait]
impl Transport for RequestSender {
    #[instrument(skip(self, destination), fields(destination = %destination.display()))]
    async fn fetch_to_file(&self, url: &str, destination: &Path) -> DownloadResult<u64> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let partial = partial_path(destination);
        match stream_to_file(response.bytes_stream(), &partial).await {
            Ok(written) => {
                tokio::fs::rename(&partial, destination).await?;
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }
}
