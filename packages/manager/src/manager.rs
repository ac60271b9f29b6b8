//! The async manager.
//!
//! [`AsyncManager`] is the public face of the crate. Every store call is
//! handed to the [`WorkerPool`] as an owned closure; migrations run on the
//! calling task between store round-trips.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::try_join_all;
use riakpersist_client::{
    Bucket, IndexEntry, IndexQuery, MapReduce, RawResult, RiakHttpClient, StoreClient, StoreObject,
};
use serde_json::Value;

use crate::config::ManagerConfig;
use crate::cursor::{BunchLoader, IndexCursor};
use crate::error::{Error, Result};
use crate::migration::{Direction, MigrationChain};
use crate::model::{Entity, Model};
use crate::pool::WorkerPool;

/// Default page size of [`AsyncManager::search`].
pub const DEFAULT_SEARCH_ROWS: usize = 1000;

struct Inner {
    client: Arc<dyn StoreClient>,
    config: ManagerConfig,
    pool: WorkerPool,
}

/// Non-blocking persistence of [`Model`] entities.
///
/// Cloning is cheap; clones share the store client and worker pool.
///
/// # Example
///
/// ```ignore
/// use riakpersist::AsyncManager;
/// use serde_json::json;
///
/// let manager = AsyncManager::from_config(json!({"bucket_prefix": "app."}))?;
///
/// let mut contact = manager.create::<Contact>("k1");
/// contact.set("full_name", "Alice");
/// manager.store(contact).await?;
///
/// if let Some(contact) = manager.load::<Contact>("k1").await? {
///     println!("{:?} (migrated: {})", contact.get("full_name"), contact.was_migrated());
/// }
/// ```
#[derive(Clone)]
pub struct AsyncManager {
    inner: Arc<Inner>,
}

impl AsyncManager {
    // === Construction ===

    /// Build a manager speaking HTTP from a configuration value.
    pub fn from_config(config: Value) -> Result<Self> {
        Self::from_manager_config(ManagerConfig::from_value(config)?)
    }

    pub fn from_manager_config(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let client = RiakHttpClient::new(config.connection.clone())
            .map_err(|e| Error::config(format!("invalid connection parameters: {}", e)))?;
        Self::with_client(Arc::new(client), config)
    }

    /// Build a manager over an existing store client.
    pub fn with_client(client: Arc<dyn StoreClient>, config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::from_limit(config.max_workers);
        tracing::debug!(
            bucket_prefix = %config.bucket_prefix,
            max_workers = ?config.max_workers,
            "created async manager"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                config,
                pool,
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn bucket_prefix(&self) -> &str {
        &self.inner.config.bucket_prefix
    }

    /// Release the store client.
    ///
    /// When this is the last handle the client is also dropped on a worker
    /// thread.
    pub async fn close_manager(self) -> Result<()> {
        match Arc::try_unwrap(self.inner) {
            Ok(inner) => {
                let pool = inner.pool.clone();
                pool.run(move || {
                    let result = inner.client.close();
                    drop(inner);
                    result
                })
                .await
            }
            Err(shared) => {
                let client = shared.client.clone();
                shared.pool.run(move || client.close()).await
            }
        }
    }

    async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreClient) -> riakpersist_client::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let client = self.inner.client.clone();
        self.inner.pool.run(move || task(client.as_ref())).await
    }

    // === Buckets and entities ===

    /// The prefixed bucket name of `M`.
    pub fn bucket_name<M: Model>(&self) -> String {
        format!("{}{}", self.bucket_prefix(), M::BUCKET)
    }

    pub fn bucket<M: Model>(&self) -> Bucket {
        Bucket::new(self.bucket_name::<M>())
    }

    /// A handle on the bucket `name` under this manager's prefix.
    pub fn bucket_named(&self, name: &str) -> Bucket {
        Bucket::new(format!("{}{}", self.bucket_prefix(), name))
    }

    /// A fresh, unsaved entity at the model's current version.
    pub fn create<M: Model>(&self, key: impl Into<String>) -> Entity<M> {
        Entity::new(
            StoreObject::versioned(self.bucket_name::<M>(), key, M::VERSION),
            false,
        )
    }

    /// The version `M` is written at.
    pub fn store_version<M: Model>(&self) -> u32 {
        self.inner.config.store_version(M::MODEL_NAME, M::VERSION)
    }

    // === Load ===

    /// Load and migrate the entity stored under `key`.
    pub async fn load<M: Model>(&self, key: impl Into<String>) -> Result<Option<Entity<M>>> {
        let bucket = self.bucket_name::<M>();
        let key = key.into();

        let fetched = {
            let key = key.clone();
            self.run(move |client| client.fetch(&bucket, &key)).await?
        };

        match fetched {
            Some(raw) => self.load_from_result::<M>(key, raw),
            None => {
                tracing::debug!(model = M::MODEL_NAME, %key, "no record");
                Ok(None)
            }
        }
    }

    /// Build and migrate an entity from a result fetched earlier, for
    /// example a map-reduce row parsed with [`RawResult::from_json`].
    pub fn load_from_result<M: Model>(
        &self,
        key: impl Into<String>,
        raw: RawResult,
    ) -> Result<Option<Entity<M>>> {
        let mut object = StoreObject::from_raw(self.bucket_name::<M>(), key, raw);
        object.decode()?;
        if !object.has_data() {
            return Ok(None);
        }

        let migrated = MigrationChain::<M>::run(object, M::VERSION, Direction::Forward)?;
        if migrated.was_migrated() {
            tracing::debug!(
                model = M::MODEL_NAME,
                key = migrated.object.key(),
                steps = migrated.steps,
                "migrated record on load"
            );
        }
        let was_migrated = migrated.was_migrated();
        Ok(Some(Entity::new(migrated.object, was_migrated)))
    }

    /// Load several keys concurrently, dropping absent ones.
    ///
    /// The first failure fails the whole batch.
    pub async fn load_multiple<M, I>(&self, keys: I) -> Result<Vec<Entity<M>>>
    where
        M: Model,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let loads = keys.into_iter().map(|key| self.load::<M>(key));
        let loaded = try_join_all(loads).await?;
        Ok(loaded.into_iter().flatten().collect())
    }

    /// Load `keys` in bunches of `load_bunch_size`.
    pub fn load_all_bunches<M, I>(&self, keys: I) -> BunchLoader<M>
    where
        M: Model,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        BunchLoader::new(
            self.clone(),
            keys.into_iter().map(Into::into).collect(),
            self.inner.config.load_bunch_size,
        )
    }

    // === Store and delete ===

    /// Write `entity` at the model's store version and hand it back.
    pub async fn store<M: Model>(&self, entity: Entity<M>) -> Result<Entity<M>> {
        let target = self.store_version::<M>();
        let migrated =
            MigrationChain::<M>::run(entity.object().clone(), target, Direction::Reverse)?;
        if migrated.was_migrated() {
            tracing::debug!(
                model = M::MODEL_NAME,
                key = entity.key(),
                target,
                "storing record at older version"
            );
        }

        let object = migrated.object;
        self.run(move |client| object.store(client)).await?;
        Ok(entity)
    }

    pub async fn delete<M: Model>(&self, entity: &Entity<M>) -> Result<()> {
        let object = entity.object().clone();
        self.run(move |client| object.delete(client)).await
    }

    pub async fn delete_key<M: Model>(&self, key: impl Into<String>) -> Result<()> {
        let bucket = self.bucket_name::<M>();
        let key = key.into();
        self.run(move |client| client.delete(&bucket, &key)).await
    }

    // === Secondary indexes ===

    /// Run one page of an index query.
    pub async fn index_page(&self, bucket: &Bucket, query: IndexQuery) -> Result<IndexCursor> {
        let bucket = bucket.clone();
        let page = self
            .run(move |client| bucket.get_index_page(client, query))
            .await?;
        Ok(IndexCursor::new(
            page,
            self.inner.client.clone(),
            self.inner.pool.clone(),
        ))
    }

    /// Run an index query without paging and return every entry.
    pub async fn get_index(&self, bucket: &Bucket, query: IndexQuery) -> Result<Vec<IndexEntry>> {
        let cursor = self.index_page(bucket, query.unpaged()).await?;
        Ok(cursor.into_page().into_entries())
    }

    // === Search ===

    /// Search the bucket of `M` and return the matching keys.
    ///
    /// With `start`, exactly one page of `rows` results is fetched from that
    /// offset. Without it, pages are fetched from offset 0 until one comes
    /// back empty.
    pub async fn search<M: Model>(
        &self,
        query: &str,
        rows: Option<usize>,
        start: Option<usize>,
    ) -> Result<Vec<String>> {
        let bucket = self.bucket::<M>();
        let rows = rows.unwrap_or(DEFAULT_SEARCH_ROWS);

        if let Some(start) = start {
            return self.search_page(&bucket, query, rows, start).await;
        }

        let mut keys = Vec::new();
        loop {
            let page = self.search_page(&bucket, query, rows, keys.len()).await?;
            if page.is_empty() {
                break;
            }
            keys.extend(page);
        }
        tracing::debug!(model = M::MODEL_NAME, query, found = keys.len(), "search complete");
        Ok(keys)
    }

    async fn search_page(
        &self,
        bucket: &Bucket,
        query: &str,
        rows: usize,
        start: usize,
    ) -> Result<Vec<String>> {
        let bucket = bucket.clone();
        let query = query.to_string();
        self.run(move |client| bucket.search(client, &query, rows, start))
            .await
    }

    // === Map-reduce ===

    /// An empty map-reduce job.
    pub fn map_reduce(&self) -> MapReduce {
        MapReduce::new()
    }

    /// Run `job` with the configured timeout and return the raw rows.
    pub async fn run_map_reduce(&self, job: MapReduce) -> Result<Vec<Value>> {
        let timeout = self.inner.config.map_reduce_timeout();
        let rows = self
            .run(move |client| client.map_reduce(&job, timeout))
            .await?;
        tracing::debug!(rows = rows.len(), "map-reduce complete");
        Ok(rows)
    }

    /// Run `job` and apply `mapper` to every row concurrently.
    pub async fn run_map_reduce_mapped<F, Fut, T>(
        &self,
        job: MapReduce,
        mapper: F,
    ) -> Result<Vec<T>>
    where
        F: Fn(AsyncManager, Value) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let rows = self.run_map_reduce(job).await?;
        try_join_all(rows.into_iter().map(|row| mapper(self.clone(), row))).await
    }

    /// Run `job` and fold the raw rows with `reducer`.
    pub async fn run_map_reduce_reduced<F, R>(&self, job: MapReduce, reducer: F) -> Result<R>
    where
        F: FnOnce(&AsyncManager, Vec<Value>) -> Result<R>,
    {
        let rows = self.run_map_reduce(job).await?;
        reducer(self, rows)
    }

    /// Run `job`, map every row, then fold the mapped rows.
    pub async fn run_map_reduce_with<F, Fut, T, G, R>(
        &self,
        job: MapReduce,
        mapper: F,
        reducer: G,
    ) -> Result<R>
    where
        F: Fn(AsyncManager, Value) -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce(&AsyncManager, Vec<T>) -> Result<R>,
    {
        let mapped = self.run_map_reduce_mapped(job, mapper).await?;
        reducer(self, mapped)
    }

    // === Administration ===

    pub async fn enable_search<M: Model>(&self) -> Result<()> {
        let bucket = self.bucket::<M>();
        self.run(move |client| bucket.enable_search(client)).await
    }

    pub async fn is_search_enabled<M: Model>(&self) -> Result<bool> {
        let bucket = self.bucket::<M>();
        self.run(move |client| bucket.search_enabled(client)).await
    }

    /// Delete every record in every bucket under this manager's prefix.
    pub async fn purge_all(&self) -> Result<()> {
        let prefix = self.bucket_prefix().to_string();
        tracing::warn!(bucket_prefix = %prefix, "purging all buckets");
        self.run(move |client| client.purge_all(&prefix)).await
    }
}

impl std::fmt::Debug for AsyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncManager")
            .field("config", &self.inner.config)
            .finish()
    }
}
