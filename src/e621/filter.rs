//! The per-candidate download decision.
//!
//! Checks run in a fixed order and the first match decides:
//! missing required tag, blacklisted, already on disk, already cached.
//! A candidate passing all four is approved and its fingerprint is cached
//! at once, before any transfer happens. A transfer that later fails does
//! not remove it again, so that content is not retried by later sessions.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::e621::cache::DedupCache;
use crate::e621::download::DownloadTask;
use crate::e621::sender::entries::Post;
use crate::e621::tag_group::TagGroup;

/// Longest tag line prefix, in bytes, kept in a file name.
const MAX_LINE_IN_FILENAME: usize = 200;

static RESERVED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1f]"#).unwrap());

/// Blacklist entries after alias resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct AliasedBlacklist(HashSet<String>);

impl AliasedBlacklist {
    pub(crate) fn new(tags: HashSet<String>) -> Self {
        Self(tags)
    }

    pub(crate) fn matches(&self, tags: &HashSet<String>) -> bool {
        !self.0.is_disjoint(tags)
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SkipReason {
    MissingRequiredTag,
    Blacklisted,
    AlreadyOnDisk,
    AlreadyCached,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingRequiredTag => write!(f, "missing a requested tag"),
            SkipReason::Blacklisted => write!(f, "contains a blacklisted tag"),
            SkipReason::AlreadyOnDisk => write!(f, "already in download directory"),
            SkipReason::AlreadyCached => write!(f, "previously downloaded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Disposition {
    Approved(DownloadTask),
    Skipped(SkipReason),
}

/// Decides what to do with one candidate of `group`.
pub(crate) fn decide(
    post: &Post,
    group: &TagGroup,
    blacklist: &AliasedBlacklist,
    cache: &mut DedupCache,
    destination_dir: &Path,
) -> Disposition {
    if group.has_extra_tags() && group.extra_tags.is_disjoint(&post.tags) {
        return Disposition::Skipped(SkipReason::MissingRequiredTag);
    }

    if blacklist.matches(&post.tags) {
        return Disposition::Skipped(SkipReason::Blacklisted);
    }

    let destination = destination_dir.join(file_name(&group.raw_line, post));
    if destination.exists() {
        return Disposition::Skipped(SkipReason::AlreadyOnDisk);
    }

    if cache.contains(&post.fingerprint) {
        return Disposition::Skipped(SkipReason::AlreadyCached);
    }

    cache.insert(post.fingerprint.clone());
    Disposition::Approved(DownloadTask {
        url: post.url.clone(),
        destination,
    })
}

/// The file name a post of the group `raw_line` is stored under.
///
/// Depends only on the line, the post id and the extension, so the same post
/// found again by the same line maps to the same file. The extension comes
/// from the remote and is cleaned like the line, dots included.
pub(crate) fn file_name(raw_line: &str, post: &Post) -> String {
    let collapsed = raw_line.split_whitespace().collect::<Vec<_>>().join(" ");
    let safe = RESERVED_CHARS.replace_all(&collapsed, "_");

    let mut end = safe.len().min(MAX_LINE_IN_FILENAME);
    while !safe.is_char_boundary(end) {
        end -= 1;
    }

    let extension = RESERVED_CHARS.replace_all(&post.extension, "_").replace('.', "_");
    format!("{} {}.{}", &safe[..end], post.id, extension)
}

/// How the candidates of one group were decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct DispositionCounts {
    pub(crate) approved: usize,
    pub(crate) missing_tag: usize,
    pub(crate) blacklisted: usize,
    pub(crate) on_disk: usize,
    pub(crate) cached: usize,
}

impl DispositionCounts {
    pub(crate) fn record(&mut self, disposition: &Disposition) {
        match disposition {
            Disposition::Approved(_) => self.approved += 1,
            Disposition::Skipped(SkipReason::MissingRequiredTag) => self.missing_tag += 1,
            Disposition::Skipped(SkipReason::Blacklisted) => self.blacklisted += 1,
            Disposition::Skipped(SkipReason::AlreadyOnDisk) => self.on_disk += 1,
            Disposition::Skipped(SkipReason::AlreadyCached) => self.cached += 1,
        }
    }

    pub(crate) fn total(&self) -> usize {
        self.approved + self.missing_tag + self.blacklisted + self.on_disk + self.cached
    }
}
