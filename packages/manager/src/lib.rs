//! # riakpersist
//!
//! Async persistence of versioned models on top of the blocking
//! `riakpersist-client`.
//!
//! Every store call runs on tokio's blocking pool; the caller only awaits.
//! Records move between schema versions as they cross the store boundary:
//! forward to the model's current version on load, back to the configured
//! store version on write.
//!
//! ## Pieces
//!
//! - [`AsyncManager`]: load, store, delete, bulk load, index queries, search,
//!   map-reduce and bucket administration.
//! - [`Model`] and [`Entity`]: static model descriptors and live records.
//! - [`MigrationChain`]: the migration state machine.
//! - [`IndexCursor`] and [`BunchLoader`]: page-at-a-time iteration.
//! - [`WorkerPool`]: dispatch of blocking calls.

pub mod config;
pub mod cursor;
pub mod error;
pub mod manager;
pub mod migration;
pub mod model;
pub mod pool;

pub use config::ManagerConfig;
pub use cursor::{BunchLoader, IndexCursor};
pub use error::{Error, Result};
pub use manager::{AsyncManager, DEFAULT_SEARCH_ROWS};
pub use migration::{Direction, MigrateFn, Migrated, MigrationChain, MigrationError, MigrationStep};
pub use model::{Entity, Model};
pub use pool::WorkerPool;

pub use riakpersist_client::{
    Bucket, IndexEntry, IndexQuery, MapReduce, Phase, PhaseFunction, RawResult, StoreClient,
    StoreError, StoreObject,
};
