//! Async iteration over index pages and bulk loads.

use std::sync::Arc;

use riakpersist_client::{IndexEntry, IndexPage, StoreClient};

use crate::error::Result;
use crate::manager::AsyncManager;
use crate::model::{Entity, Model};
use crate::pool::WorkerPool;

/// One page of an index query whose successor is fetched through the
/// worker pool.
pub struct IndexCursor {
    page: IndexPage,
    client: Arc<dyn StoreClient>,
    pool: WorkerPool,
}

impl IndexCursor {
    pub(crate) fn new(page: IndexPage, client: Arc<dyn StoreClient>, pool: WorkerPool) -> Self {
        Self { page, client, pool }
    }

    pub fn page(&self) -> &IndexPage {
        &self.page
    }

    pub fn entries(&self) -> &[IndexEntry] {
        self.page.entries()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.page.keys()
    }

    pub fn len(&self) -> usize {
        self.page.len()
    }

    pub fn is_empty(&self) -> bool {
        self.page.is_empty()
    }

    pub fn continuation(&self) -> Option<&str> {
        self.page.continuation()
    }

    pub fn has_next_page(&self) -> bool {
        self.page.has_next_page()
    }

    pub fn into_page(self) -> IndexPage {
        self.page
    }

    /// Fetch the next page. `Ok(None)` without a store call on the last page.
    pub async fn next_page(&self) -> Result<Option<IndexCursor>> {
        if !self.page.has_next_page() {
            return Ok(None);
        }

        let page = self.page.clone();
        let client = self.client.clone();
        let next = self
            .pool
            .run(move || page.next_page(client.as_ref()))
            .await?;

        Ok(next.map(|page| IndexCursor::new(page, self.client.clone(), self.pool.clone())))
    }
}

impl<'a> IntoIterator for &'a IndexCursor {
    type Item = &'a IndexEntry;
    type IntoIter = std::slice::Iter<'a, IndexEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.page.entries().iter()
    }
}

impl std::fmt::Debug for IndexCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexCursor").field("page", &self.page).finish()
    }
}

/// Loads a list of keys a bunch at a time.
///
/// ```ignore
/// let mut bunches = manager.load_all_bunches::<Contact>(keys);
/// while let Some(contacts) = bunches.next_bunch().await? {
///     for contact in contacts {
///         // ...
///     }
/// }
/// ```
pub struct BunchLoader<M> {
    manager: AsyncManager,
    keys: Vec<String>,
    position: usize,
    bunch_size: usize,
    _model: std::marker::PhantomData<fn() -> M>,
}

impl<M: Model> BunchLoader<M> {
    pub(crate) fn new(manager: AsyncManager, keys: Vec<String>, bunch_size: usize) -> Self {
        Self {
            manager,
            keys,
            position: 0,
            bunch_size: bunch_size.max(1),
            _model: std::marker::PhantomData,
        }
    }

    /// Keys not yet loaded.
    pub fn remaining(&self) -> usize {
        self.keys.len() - self.position
    }

    /// Load the next bunch. Absent keys are dropped, so a bunch may hold
    /// fewer entities than keys. `Ok(None)` once every key was loaded.
    pub async fn next_bunch(&mut self) -> Result<Option<Vec<Entity<M>>>> {
        if self.position >= self.keys.len() {
            return Ok(None);
        }
        let end = (self.position + self.bunch_size).min(self.keys.len());
        let bunch = self.keys[self.position..end].to_vec();
        self.position = end;

        self.manager.load_multiple::<M, _>(bunch).await.map(Some)
    }
}
