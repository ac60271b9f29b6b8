//! Bucket handles.

use crate::client::StoreClient;
use crate::error::{Result, StoreError};
use crate::index::{IndexEntry, IndexPage, IndexQuery};

/// A named collection of records in the store.
///
/// A bucket carries no state beyond its (already prefixed) name; every
/// operation that touches the network takes the client explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bucket {
    name: String,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // === Methods that touch the network ===

    /// Run an index query and return every matching entry as one list.
    pub fn get_index(
        &self,
        client: &dyn StoreClient,
        query: IndexQuery,
    ) -> Result<Vec<IndexEntry>> {
        self.get_index_page(client, query.unpaged())
            .map(IndexPage::into_entries)
    }

    /// Run one page of an index query.
    pub fn get_index_page(&self, client: &dyn StoreClient, query: IndexQuery) -> Result<IndexPage> {
        let results = client.get_index(&self.name, &query)?;
        Ok(IndexPage::new(self.clone(), query, results))
    }

    /// Run one page of a search and return the keys of the matching documents.
    pub fn search(
        &self,
        client: &dyn StoreClient,
        query: &str,
        rows: usize,
        start: usize,
    ) -> Result<Vec<String>> {
        client
            .search(&self.name, query, rows, start)?
            .iter()
            .map(|doc| {
                doc.get("id")
                    .and_then(|id| id.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        StoreError::invalid_response(format!("search document without id: {}", doc))
                    })
            })
            .collect()
    }

    pub fn enable_search(&self, client: &dyn StoreClient) -> Result<()> {
        client.enable_search(&self.name)
    }

    pub fn search_enabled(&self, client: &dyn StoreClient) -> Result<bool> {
        client.search_enabled(&self.name)
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
