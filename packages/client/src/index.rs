//! Secondary index queries and result pages.

use crate::bucket::Bucket;
use crate::client::StoreClient;
use crate::error::Result;

/// Parameters of a secondary index query.
///
/// Without an end value the query is an exact match on `start`; with one it
/// is an inclusive range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexQuery {
    pub index: String,
    pub start: String,
    pub end: Option<String>,
    pub return_terms: bool,
    pub max_results: Option<usize>,
    pub continuation: Option<String>,
}

impl IndexQuery {
    pub fn new(index: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            start: start.into(),
            end: None,
            return_terms: false,
            max_results: None,
            continuation: None,
        }
    }

    pub fn range(
        index: impl Into<String>,
        start: impl Into<String>,
        end: impl Into<String>,
    ) -> Self {
        Self::new(index, start).with_end(end)
    }

    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn with_return_terms(mut self, return_terms: bool) -> Self {
        self.return_terms = return_terms;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_continuation(mut self, continuation: impl Into<String>) -> Self {
        self.continuation = Some(continuation.into());
        self
    }

    /// The same query without page size or continuation.
    pub fn unpaged(mut self) -> Self {
        self.max_results = None;
        self.continuation = None;
        self
    }
}

/// One entry of an index result.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum IndexEntry {
    /// A matching key.
    Key(String),

    /// A matching key together with the index term that matched.
    Term { term: String, key: String },
}

impl IndexEntry {
    pub fn key(&self) -> &str {
        match self {
            IndexEntry::Key(key) => key,
            IndexEntry::Term { key, .. } => key,
        }
    }

    pub fn term(&self) -> Option<&str> {
        match self {
            IndexEntry::Key(_) => None,
            IndexEntry::Term { term, .. } => Some(term),
        }
    }
}

/// Raw results of one index query call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexResults {
    pub entries: Vec<IndexEntry>,
    pub continuation: Option<String>,
}

/// One page of a secondary index query.
///
/// Iterating a page yields the entries of this page only; further pages are
/// fetched explicitly with [`IndexPage::next_page`].
#[derive(Debug, Clone, PartialEq)]
pub struct IndexPage {
    bucket: Bucket,
    query: IndexQuery,
    entries: Vec<IndexEntry>,
    continuation: Option<String>,
}

impl IndexPage {
    pub fn new(bucket: Bucket, query: IndexQuery, results: IndexResults) -> Self {
        Self {
            bucket,
            query,
            entries: results.entries,
            continuation: results.continuation,
        }
    }

    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn query(&self) -> &IndexQuery {
        &self.query
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(IndexEntry::key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn continuation(&self) -> Option<&str> {
        self.continuation.as_deref()
    }

    pub fn has_next_page(&self) -> bool {
        self.continuation.is_some()
    }

    pub fn into_entries(self) -> Vec<IndexEntry> {
        self.entries
    }

    /// Fetch the next page. `Ok(None)` without touching the network when
    /// this is the last page.
    pub fn next_page(&self, client: &dyn StoreClient) -> Result<Option<IndexPage>> {
        let Some(continuation) = &self.continuation else {
            return Ok(None);
        };
        let query = self.query.clone().with_continuation(continuation.clone());
        self.bucket.get_index_page(client, query).map(Some)
    }
}

impl IntoIterator for IndexPage {
    type Item = IndexEntry;
    type IntoIter = std::vec::IntoIter<IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a IndexPage {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
