//! In-memory store client for tests.
//!
//! [`MemoryClient`] keeps records in a map, evaluates index queries itself,
//! serves search results and map-reduce rows that were configured up front,
//! and records every request so tests can assert on the traffic.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};

use crate::client::StoreClient;
use crate::error::{Result, StoreError};
use crate::index::{IndexEntry, IndexQuery, IndexResults};
use crate::mapreduce::MapReduce;
use crate::object::{RawResult, StoreObject};

/// A recorded search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub bucket: String,
    pub query: String,
    pub rows: usize,
    pub start: usize,
}

/// A recorded map-reduce call.
#[derive(Debug, Clone, PartialEq)]
pub struct MapReduceRequest {
    pub job: Value,
    pub timeout: Duration,
}

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<(String, String), RawResult>,
    search_results: HashMap<(String, String), Vec<String>>,
    search_enabled: BTreeSet<String>,
    map_reduce_rows: Vec<Value>,
    fail_with: Option<String>,
    fetches: usize,
    index_requests: Vec<IndexQuery>,
    search_requests: Vec<SearchRequest>,
    map_reduce_requests: Vec<MapReduceRequest>,
}

/// A [`StoreClient`] backed by process memory.
///
/// Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn checked(&self) -> Result<MutexGuard<'_, MemoryState>> {
        let state = self.state();
        if let Some(message) = state.fail_with.clone() {
            return Err(StoreError::Backend { message });
        }
        Ok(state)
    }

    /// Seed a raw record.
    pub fn with_object(
        self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        raw: RawResult,
    ) -> Self {
        self.put_raw(bucket, key, raw);
        self
    }

    /// Documents returned, in order, for `query` on `bucket`.
    pub fn with_search_results<I, K>(
        self,
        bucket: impl Into<String>,
        query: impl Into<String>,
        keys: I,
    ) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.state().search_results.insert(
            (bucket.into(), query.into()),
            keys.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Rows returned by every map-reduce job.
    pub fn with_map_reduce_rows(self, rows: Vec<Value>) -> Self {
        self.state().map_reduce_rows = rows;
        self
    }

    /// Fail every subsequent call with a backend error.
    pub fn fail_with(self, message: impl Into<String>) -> Self {
        self.state().fail_with = Some(message.into());
        self
    }

    pub fn put_raw(&self, bucket: impl Into<String>, key: impl Into<String>, raw: RawResult) {
        self.state().objects.insert((bucket.into(), key.into()), raw);
    }

    pub fn stored(&self, bucket: &str, key: &str) -> Option<RawResult> {
        self.state()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Decoded JSON data of a stored record.
    pub fn stored_json(&self, bucket: &str, key: &str) -> Option<Value> {
        self.stored(bucket, key)
            .and_then(|raw| serde_json::from_slice(&raw.data).ok())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.stored(bucket, key).is_some()
    }

    pub fn object_count(&self) -> usize {
        self.state().objects.len()
    }

    pub fn fetch_count(&self) -> usize {
        self.state().fetches
    }

    pub fn index_requests(&self) -> Vec<IndexQuery> {
        self.state().index_requests.clone()
    }

    pub fn search_requests(&self) -> Vec<SearchRequest> {
        self.state().search_requests.clone()
    }

    pub fn map_reduce_requests(&self) -> Vec<MapReduceRequest> {
        self.state().map_reduce_requests.clone()
    }
}

/// Order index terms numerically for integer indexes, lexically otherwise.
fn compare_terms(index: &str, a: &str, b: &str) -> std::cmp::Ordering {
    if index.ends_with("_int") {
        if let (Ok(a), Ok(b)) = (a.parse::<i64>(), b.parse::<i64>()) {
            return a.cmp(&b);
        }
    }
    a.cmp(b)
}

fn term_matches(query: &IndexQuery, term: &str) -> bool {
    use std::cmp::Ordering::*;
    let lower = compare_terms(&query.index, term, &query.start);
    match &query.end {
        None => lower == Equal,
        Some(end) => lower != Less && compare_terms(&query.index, term, end) != Greater,
    }
}

impl StoreClient for MemoryClient {
    fn fetch(&self, bucket: &str, key: &str) -> Result<Option<RawResult>> {
        let mut state = self.checked()?;
        state.fetches += 1;
        Ok(state
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    fn store(&self, object: &StoreObject) -> Result<()> {
        let raw = object.to_raw()?;
        self.checked()?
            .objects
            .insert((object.bucket().to_string(), object.key().to_string()), raw);
        Ok(())
    }

    fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.checked()?
            .objects
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    fn get_index(&self, bucket: &str, query: &IndexQuery) -> Result<IndexResults> {
        let mut state = self.checked()?;
        state.index_requests.push(query.clone());

        let mut matches: Vec<(String, String)> = state
            .objects
            .iter()
            .filter(|((b, _), _)| b == bucket)
            .flat_map(|((_, key), raw)| {
                raw.indexes
                    .iter()
                    .filter(|(name, term)| *name == query.index && term_matches(query, term))
                    .map(move |(_, term)| (term.clone(), key.clone()))
            })
            .collect();
        matches.sort_by(|(ta, ka), (tb, kb)| {
            compare_terms(&query.index, ta, tb).then_with(|| ka.cmp(kb))
        });
        matches.dedup();

        let offset = match &query.continuation {
            Some(token) => token.parse::<usize>().map_err(|_| StoreError::Backend {
                message: format!("invalid continuation {}", token),
            })?,
            None => 0,
        };
        let remaining = matches.len().saturating_sub(offset);
        let take = query.max_results.unwrap_or(remaining).min(remaining);
        let continuation = (offset + take < matches.len()).then(|| (offset + take).to_string());

        let entries = matches
            .into_iter()
            .skip(offset)
            .take(take)
            .map(|(term, key)| {
                if query.return_terms {
                    IndexEntry::Term { term, key }
                } else {
                    IndexEntry::Key(key)
                }
            })
            .collect();

        Ok(IndexResults {
            entries,
            continuation,
        })
    }

    fn search(&self, bucket: &str, query: &str, rows: usize, start: usize) -> Result<Vec<Value>> {
        let mut state = self.checked()?;
        state.search_requests.push(SearchRequest {
            bucket: bucket.to_string(),
            query: query.to_string(),
            rows,
            start,
        });
        let docs = state
            .search_results
            .get(&(bucket.to_string(), query.to_string()))
            .map(|keys| {
                keys.iter()
                    .skip(start)
                    .take(rows)
                    .map(|key| json!({"id": key}))
                    .collect()
            })
            .unwrap_or_default();
        Ok(docs)
    }

    fn map_reduce(&self, job: &MapReduce, timeout: Duration) -> Result<Vec<Value>> {
        let job = job.to_job(timeout)?;
        let mut state = self.checked()?;
        state.map_reduce_requests.push(MapReduceRequest { job, timeout });
        Ok(state.map_reduce_rows.clone())
    }

    fn enable_search(&self, bucket: &str) -> Result<()> {
        self.checked()?.search_enabled.insert(bucket.to_string());
        Ok(())
    }

    fn search_enabled(&self, bucket: &str) -> Result<bool> {
        Ok(self.checked()?.search_enabled.contains(bucket))
    }

    fn list_buckets(&self) -> Result<Vec<String>> {
        let state = self.checked()?;
        let buckets: BTreeSet<&String> = state.objects.keys().map(|(b, _)| b).collect();
        Ok(buckets.into_iter().cloned().collect())
    }

    fn list_keys(&self, bucket: &str) -> Result<Vec<String>> {
        Ok(self
            .checked()?
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect())
    }
}
