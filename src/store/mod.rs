//! Persistent sample store
//!
//! The store is the single owner of [`SampleRecord`]s. The indexer and the
//! search engine only see it through [`SampleStore`]:
//!
//! - [`SqliteStore`]: one SQLite file, any number of named collections,
//!   brute-force cosine nearest-neighbor scan
//! - [`MemoryStore`]: process-local map for tests and tools
//!
//! Writes arrive in batches but a batch is not a snapshot boundary: a reader
//! may observe a store in the middle of a job.

pub mod memory;
pub mod record;
pub mod sqlite;

use std::collections::HashSet;

pub use memory::MemoryStore;
pub use record::{cosine_distance, QueryHit, SampleMetadata, SampleRecord};
pub use sqlite::SqliteStore;

use crate::error::StoreError;

/// Vector store holding sample records keyed by normalized path
pub trait SampleStore: Send + Sync {
    /// Ids of every record
    fn get_all_ids(&self) -> Result<HashSet<String>, StoreError>;

    /// Insert records (an existing id is replaced)
    ///
    /// # Errors
    ///
    /// `StoreError::DimensionMismatch` if an embedding's length differs from
    /// the collection's
    fn add(&self, records: &[SampleRecord]) -> Result<(), StoreError>;

    /// Replace the metadata of existing records; unknown ids are ignored
    fn update(&self, updates: &[(String, SampleMetadata)]) -> Result<(), StoreError>;

    /// Id and metadata of every record, ordered by id
    fn get_all(&self) -> Result<Vec<(String, SampleMetadata)>, StoreError>;

    /// The `k` records nearest to `embedding`, nearest first
    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>, StoreError>;

    /// Number of records
    fn count(&self) -> Result<usize, StoreError>;
}

/// Nearest `k` of `(id, document, metadata, embedding)` candidates
pub(crate) fn nearest<'a, I>(query: &[f32], candidates: I, k: usize) -> Vec<QueryHit>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a SampleMetadata, &'a [f32])>,
{
    let mut hits: Vec<QueryHit> = candidates
        .into_iter()
        .map(|(id, document, metadata, embedding)| QueryHit {
            id: id.to_string(),
            document: document.to_string(),
            metadata: metadata.clone(),
            distance: cosine_distance(query, embedding),
        })
        .collect();
    hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
    hits.truncate(k);
    hits
}
