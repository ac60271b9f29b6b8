//! The store client abstraction.
//!
//! [`StoreClient`] is the set of blocking primitives the rest of the system
//! needs from the backing store. The production implementation speaks the
//! Riak HTTP API ([`crate::RiakHttpClient`]); tests use the in-memory
//! implementation behind the `test-utils` feature.

use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::index::{IndexQuery, IndexResults};
use crate::mapreduce::MapReduce;
use crate::object::{RawResult, StoreObject};

/// Blocking operations against the backing key-value store.
///
/// Implementations must be safe to call concurrently from several worker
/// threads; the async layer shares one client across all in-flight calls.
pub trait StoreClient: Send + Sync {
    /// Fetch one record. `Ok(None)` when the key does not exist.
    fn fetch(&self, bucket: &str, key: &str) -> Result<Option<RawResult>>;

    /// Store a record, replacing any previous value.
    fn store(&self, object: &StoreObject) -> Result<()>;

    /// Delete a record. Deleting a missing key succeeds.
    fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Run one page of a secondary index query.
    fn get_index(&self, bucket: &str, query: &IndexQuery) -> Result<IndexResults>;

    /// Run one page of a full-text search, returning the matching documents.
    fn search(&self, bucket: &str, query: &str, rows: usize, start: usize) -> Result<Vec<Value>>;

    /// Execute a map-reduce job with the given timeout.
    fn map_reduce(&self, job: &MapReduce, timeout: Duration) -> Result<Vec<Value>>;

    /// Install the search hook on a bucket.
    fn enable_search(&self, bucket: &str) -> Result<()>;

    fn search_enabled(&self, bucket: &str) -> Result<bool>;

    fn list_buckets(&self) -> Result<Vec<String>>;

    fn list_keys(&self, bucket: &str) -> Result<Vec<String>>;

    /// Delete every key in every bucket whose name starts with `bucket_prefix`.
    fn purge_all(&self, bucket_prefix: &str) -> Result<()> {
        for bucket in self.list_buckets()? {
            if !bucket.starts_with(bucket_prefix) {
                continue;
            }
            for key in self.list_keys(&bucket)? {
                self.delete(&bucket, &key)?;
            }
        }
        Ok(())
    }

    /// Release any resources held by the client.
    fn close(&self) -> Result<()> {
        Ok(())
    }
}
