use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, error, warn};

use crate::e621::sender::{ApiError, ContentIndex};

#[derive(Error, Debug)]
pub(crate) enum AliasError {
    #[error("The tag \"{0}\" does not exist, please remove it from your tags file or blacklist")]
    UnknownTag(String),

    #[error("Alias lookup for \"{tag}\" failed: {source}")]
    Transport { tag: String, source: ApiError },
}

pub(crate) type AliasResult<T> = Result<T, AliasError>;

/// Maps user supplied tags to the names the remote index files posts under.
///
/// Results are remembered for the lifetime of the resolver, which is one
/// session; lookups that failed in transport are not remembered.
pub(crate) struct TagAliasResolver<'a, C: ?Sized> {
    index: &'a C,
    resolved: HashMap<String, Option<String>>,
}

impl<'a, C: ContentIndex + ?Sized> TagAliasResolver<'a, C> {
    pub(crate) fn new(index: &'a C) -> Self {
        Self {
            index,
            resolved: HashMap::new(),
        }
    }

    /// Looks `tag` up without any fallback.
    ///
    /// When the first alias record names `tag` itself, the tag is an alias and
    /// the official name is fetched through the record's alias identifier.
    pub(crate) async fn resolve(&self, tag: &str) -> AliasResult<String> {
        let records = self
            .index
            .tag_aliases(tag)
            .await
            .map_err(|source| AliasError::Transport {
                tag: tag.to_string(),
                source,
            })?;

        let Some(record) = records.first() else {
            return Err(AliasError::UnknownTag(tag.to_string()));
        };

        if record.name != tag {
            return Ok(tag.to_string());
        }

        let official = self
            .index
            .tag_by_id(record.alias_id)
            .await
            .map_err(|source| AliasError::Transport {
                tag: tag.to_string(),
                source,
            })?;
        debug!("Tag \"{}\" aliased to \"{}\" (id {}).", tag, official.name, official.id);
        Ok(official.name)
    }

    /// Resolves `tag` for filtering.
    ///
    /// Unknown tags yield `None` and take no part in filtering. A failed
    /// lookup falls back to the tag as written.
    pub(crate) async fn resolve_or_inert(&mut self, tag: &str) -> Option<String> {
        if let Some(known) = self.resolved.get(tag) {
            return known.clone();
        }

        let outcome = match self.resolve(tag).await {
            Ok(name) => Some(name),
            Err(e @ AliasError::UnknownTag(_)) => {
                error!("{}", e);
                None
            }
            Err(e @ AliasError::Transport { .. }) => {
                warn!("{}; using the tag as written", e);
                return Some(tag.to_string());
            }
        };

        self.resolved.insert(tag.to_string(), outcome.clone());
        outcome
    }

    /// Resolves every tag, dropping the unknown ones.
    pub(crate) async fn resolve_all<'t, I>(&mut self, tags: I) -> HashSet<String>
    where
        I: IntoIterator<Item = &'t str>,
    {
        let mut resolved = HashSet::new();
        for tag in tags {
            if let Some(name) = self.resolve_or_inert(tag).await {
                resolved.insert(name);
            }
        }
        resolved
    }
}
