//! Incremental synchronization with e621.
//!
//! A session expands each tag line into a search, pages through the posts
//! uploaded since the last session, filters them against the required tags,
//! the blacklist, the download directory and the dedup cache, then downloads
//! what is left with bounded parallelism.

pub(crate) mod alias;
pub(crate) mod cache;
pub(crate) mod cache_store;
pub(crate) mod download;
pub(crate) mod filter;
pub(crate) mod io;
pub(crate) mod run_state;
pub(crate) mod search;
pub(crate) mod sender;
pub(crate) mod sync;
pub(crate) mod tag_group;

#[cfg(test)]
pub(crate) mod testing;
