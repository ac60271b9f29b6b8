//! # riakpersist-client
//!
//! Blocking access to a Riak store.
//!
//! This crate is the lower of two layers. Everything here blocks the calling
//! thread; the `riakpersist` crate moves these calls onto a worker pool and
//! exposes them as futures.
//!
//! ## Pieces
//!
//! - [`StoreClient`]: the blocking primitives (fetch, store, delete, index
//!   query, search, map-reduce, bucket administration).
//! - [`RiakHttpClient`]: the production client over the Riak HTTP API.
//! - [`StoreObject`]: one record (bucket, key, content type, indexes,
//!   payload) with blocking `store`/`reload`/`delete`.
//! - [`Bucket`] and [`IndexPage`]: index queries page by page.
//! - [`MapReduce`]: a job description; it cannot run itself.
//!
//! ```ignore
//! use riakpersist_client::{Bucket, ClientConfig, IndexQuery, RiakHttpClient};
//!
//! let client = RiakHttpClient::new(ClientConfig::default())?;
//! let bucket = Bucket::new("prefix.contact");
//!
//! let query = IndexQuery::new("group_bin", "friends").with_max_results(50);
//! let mut page = bucket.get_index_page(&client, query)?;
//! loop {
//!     for entry in &page {
//!         println!("{}", entry.key());
//!     }
//!     match page.next_page(&client)? {
//!         Some(next) => page = next,
//!         None => break,
//!     }
//! }
//! ```

pub mod bucket;
pub mod client;
pub mod error;
pub mod http;
pub mod index;
pub mod mapreduce;
pub mod object;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use bucket::Bucket;
pub use client::StoreClient;
pub use error::{Result, StoreError};
pub use index::{IndexEntry, IndexPage, IndexQuery, IndexResults};
pub use mapreduce::{Inputs, MapReduce, Phase, PhaseFunction};
pub use object::{Payload, RawResult, StoreObject, JSON_CONTENT_TYPE, VERSION_FIELD};

pub use crate::http::{ClientConfig, RiakHttpClient};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{MapReduceRequest, MemoryClient, SearchRequest};
