use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// A search result, flattened from the `posts.json` listing.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub(crate) struct PostEntry {
    pub(crate) id: u64,
    /// Missing when the post is deleted or hidden from anonymous users.
    #[serde(default)]
    pub(crate) file_url: Option<String>,
    #[serde(default)]
    pub(crate) md5: Option<String>,
    #[serde(default)]
    pub(crate) file_ext: Option<String>,
    /// Space separated tag string.
    #[serde(default)]
    pub(crate) tags: String,
}

/// The answer to an alias lookup: `name` is aliased to the tag with id `alias_id`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub(crate) struct AliasEntry {
    pub(crate) alias_id: u64,
    pub(crate) name: String,
}

/// The body of `tags/{id}.json`, also an entry of `tags.json`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub(crate) struct TagEntry {
    #[serde(default)]
    pub(crate) id: u64,
    pub(crate) name: String,
}

/// The `file` object of a post.
#[derive(Deserialize, Debug, Clone, Default)]
pub(crate) struct ApiFile {
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) md5: Option<String>,
    #[serde(default)]
    pub(crate) ext: Option<String>,
}

/// A post of the `posts.json` listing. Tags come grouped by category.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ApiPost {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) file: ApiFile,
    #[serde(default)]
    pub(crate) tags: BTreeMap<String, Vec<String>>,
}

impl From<ApiPost> for PostEntry {
    fn from(post: ApiPost) -> Self {
        let tags: Vec<String> = post.tags.into_values().flatten().collect();
        PostEntry {
            id: post.id,
            file_url: post.file.url,
            md5: post.file.md5,
            file_ext: post.file.ext,
            tags: tags.join(" "),
        }
    }
}

/// An entry of `tag_aliases.json`.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct ApiTagAlias {
    #[serde(default)]
    pub(crate) id: u64,
    pub(crate) antecedent_name: String,
    pub(crate) consequent_name: String,
}

/// A listing body. The API wraps lists in an object (`{"posts": [..]}`) and
/// answers empty searches with `{"<name>": []}` even where it otherwise
/// returns a bare array.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub(crate) enum Listing<T> {
    Items(Vec<T>),
    Wrapped(BTreeMap<String, Vec<T>>),
}

impl<T> Listing<T> {
    pub(crate) fn into_items(self) -> Vec<T> {
        match self {
            Listing::Items(items) => items,
            Listing::Wrapped(map) => map.into_values().flatten().collect(),
        }
    }
}

/// A downloadable content item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Post {
    pub(crate) url: String,
    pub(crate) id: u64,
    /// MD5 of the file contents.
    pub(crate) fingerprint: String,
    pub(crate) extension: String,
    pub(crate) tags: HashSet<String>,
}

impl TryFrom<PostEntry> for Post {
    type Error = PostEntry;

    /// Fails, handing the entry back, when it has no file to download.
    fn try_from(entry: PostEntry) -> Result<Self, Self::Error> {
        match (&entry.file_url, &entry.md5, &entry.file_ext) {
            (Some(url), Some(md5), Some(ext)) if !url.is_empty() && !md5.is_empty() => Ok(Post {
                url: url.clone(),
                id: entry.id,
                fingerprint: md5.clone(),
                extension: ext.clone(),
                tags: entry.tags.split_whitespace().map(str::to_string).collect(),
            }),
            _ => Err(entry),
        }
    }
}
