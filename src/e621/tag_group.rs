use std::collections::HashSet;

use crate::e621::alias::TagAliasResolver;
use crate::e621::sender::ContentIndex;

/// The most tags the remote search accepts in one query.
pub(crate) const MAX_SEARCH_TAGS: usize = 5;

/// One line of the tag file, split into what is searched and what is filtered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TagGroup {
    pub(crate) raw_line: String,
    /// Sent to the remote search, in the order written.
    pub(crate) search_tags: Vec<String>,
    /// Resolved names of the tags that did not fit the search. A post must
    /// carry at least one of them. Empty when the line fit.
    pub(crate) extra_tags: HashSet<String>,
}

impl TagGroup {
    /// Expands `raw_line`, resolving any overflow tags through `resolver`.
    pub(crate) async fn expand<C>(raw_line: &str, resolver: &mut TagAliasResolver<'_, C>) -> Self
    where
        C: ContentIndex + ?Sized,
    {
        let tokens: Vec<&str> = raw_line.split_whitespace().collect();
        let split = tokens.len().min(MAX_SEARCH_TAGS);
        let (search, overflow) = tokens.split_at(split);

        let extra_tags = resolver
            .resolve_all(overflow.iter().copied().filter(|tag| !search.contains(tag)))
            .await;

        Self {
            raw_line: raw_line.to_string(),
            search_tags: search.iter().map(|tag| tag.to_string()).collect(),
            extra_tags,
        }
    }

    /// Whether posts are filtered on tags beyond the search clause.
    pub(crate) fn has_extra_tags(&self) -> bool {
        !self.extra_tags.is_empty()
    }
}
