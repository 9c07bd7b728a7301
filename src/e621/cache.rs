use std::collections::{HashSet, VecDeque};

/// Fingerprints of content already approved for download.
///
/// Holds at most `capacity` entries. Inserting into a full cache evicts the
/// oldest entry by insertion order; membership tests do not refresh entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DedupCache {
    capacity: usize,
    order: VecDeque<String>,
    members: HashSet<String>,
}

impl DedupCache {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity.min(4096)),
            members: HashSet::new(),
        }
    }

    /// Builds a cache from entries listed oldest first.
    pub(crate) fn from_entries<I>(capacity: usize, entries: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut cache = Self::new(capacity);
        for entry in entries {
            cache.insert(entry);
        }
        cache
    }

    pub(crate) fn contains(&self, fingerprint: &str) -> bool {
        self.members.contains(fingerprint)
    }

    /// Adds `fingerprint`, returning the evicted entry if the cache was full.
    ///
    /// A fingerprint already present is left where it is.
    pub(crate) fn insert(&mut self, fingerprint: String) -> Option<String> {
        if self.members.contains(&fingerprint) {
            return None;
        }

        let evicted = if self.order.len() == self.capacity {
            self.order.pop_front().inspect(|oldest| {
                self.members.remove(oldest);
            })
        } else {
            None
        };

        self.members.insert(fingerprint.clone());
        self.order.push_back(fingerprint);
        evicted
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries oldest first.
    pub(crate) fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}
