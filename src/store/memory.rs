//! In-memory sample store

use std::collections::{BTreeMap, HashSet};
use std::sync::RwLock;

use super::{nearest, QueryHit, SampleMetadata, SampleRecord, SampleStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Inner {
    records: BTreeMap<String, SampleRecord>,
    dimension: Option<usize>,
}

/// Sample store kept in a process-local map
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Full record by id
    pub fn get(&self, id: &str) -> Result<Option<SampleRecord>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.records.get(id).cloned())
    }
}

impl SampleStore for MemoryStore {
    fn get_all_ids(&self) -> Result<HashSet<String>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.records.keys().cloned().collect())
    }

    fn add(&self, records: &[SampleRecord]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        let expected = inner
            .dimension
            .or_else(|| records.first().map(|r| r.embedding.len()));
        if let Some(expected) = expected {
            if let Some(bad) = records.iter().find(|r| r.embedding.len() != expected) {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    found: bad.embedding.len(),
                });
            }
            inner.dimension = Some(expected);
        }
        for record in records {
            inner.records.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn update(&self, updates: &[(String, SampleMetadata)]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::Poisoned)?;
        for (id, metadata) in updates {
            match inner.records.get_mut(id) {
                Some(record) => record.metadata = metadata.clone(),
                None => log::warn!("Ignoring update of unknown sample {}", id),
            }
        }
        Ok(())
    }

    fn get_all(&self) -> Result<Vec<(String, SampleMetadata)>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner
            .records
            .values()
            .map(|r| (r.id.clone(), r.metadata.clone()))
            .collect())
    }

    fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<QueryHit>, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(nearest(
            embedding,
            inner.records.values().map(|r| {
                (r.id.as_str(), r.document.as_str(), &r.metadata, r.embedding.as_slice())
            }),
            k,
        ))
    }

    fn count(&self) -> Result<usize, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, embedding: Vec<f32>) -> SampleRecord {
        let metadata = SampleMetadata {
            filename: id.rsplit('/').next().unwrap_or(id).to_string(),
            ..SampleMetadata::default()
        };
        SampleRecord::new(id, embedding, metadata)
    }

    #[test]
    fn test_add_and_query() {
        let store = MemoryStore::new();
        store
            .add(&[
                record("/a.wav", vec![1.0, 0.0]),
                record("/b.wav", vec![0.0, 1.0]),
                record("/c.wav", vec![0.7, 0.7]),
            ])
            .unwrap();

        let hits = store.query(&[1.0, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "/a.wav");
        assert_eq!(hits[1].id, "/c.wav");
        assert!(hits[0].distance <= hits[1].distance);
        assert_eq!(store.count().unwrap(), 3);
    }

    #[test]
    fn test_dimension_fixed_by_first_add() {
        let store = MemoryStore::new();
        store.add(&[record("/a.wav", vec![1.0, 0.0])]).unwrap();
        match store.add(&[record("/b.wav", vec![1.0, 0.0, 0.0])]) {
            Err(StoreError::DimensionMismatch { expected: 2, found: 3 }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_update_replaces_metadata_only() {
        let store = MemoryStore::new();
        store.add(&[record("/a.wav", vec![1.0, 0.0])]).unwrap();

        let mut meta = store.get("/a.wav").unwrap().unwrap().metadata;
        meta.bpm = 120.0;
        store
            .update(&[("/a.wav".to_string(), meta), ("/missing.wav".to_string(), SampleMetadata::default())])
            .unwrap();

        let stored = store.get("/a.wav").unwrap().unwrap();
        assert_eq!(stored.metadata.bpm, 120.0);
        assert_eq!(stored.embedding, vec![1.0, 0.0]);
        assert_eq!(store.count().unwrap(), 1);
    }
}
