use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{validate_blob_key, BlobStore, Direction, DocumentStore, SortField, StoreError};
use crate::catalog::{Collection, ContentRecord};

// ============================================================================
// Documents
// ============================================================================

/// In-process document store.
///
/// Counts every call and can be switched into a failing mode, which makes it
/// the fixture of choice for gateway tests that assert "no store call".
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: Mutex<HashMap<Collection, Vec<ContentRecord>>>,
    next_id: AtomicUsize,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `query` + `insert` + `delete` calls so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// While set, every call returns [`StoreError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of one collection in insertion order, bypassing the counters.
    pub fn snapshot(&self, collection: Collection) -> Vec<ContentRecord> {
        self.lock().get(&collection).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Collection, Vec<ContentRecord>>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn query(
        &self,
        collection: Collection,
        order_by: SortField,
        direction: Direction,
    ) -> Result<Vec<ContentRecord>, StoreError> {
        self.enter()?;
        let mut records = self.snapshot(collection);
        // Stable sort; ties keep insertion order, reversed for descending.
        if direction == Direction::Descending {
            records.reverse();
        }
        match (order_by, direction) {
            (SortField::Date, Direction::Ascending) => records.sort_by_key(|r| r.date),
            (SortField::Date, Direction::Descending) => {
                records.sort_by(|a, b| b.date.cmp(&a.date))
            }
            (SortField::Title, Direction::Ascending) => {
                records.sort_by(|a, b| a.title.cmp(&b.title))
            }
            (SortField::Title, Direction::Descending) => {
                records.sort_by(|a, b| b.title.cmp(&a.title))
            }
        }
        Ok(records)
    }

    async fn insert(
        &self,
        collection: Collection,
        record: &ContentRecord,
    ) -> Result<String, StoreError> {
        self.enter()?;
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        self.lock().entry(collection).or_default().push(stored);
        Ok(id)
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.enter()?;
        let mut records = self.lock();
        let list = records.entry(collection).or_default();
        let before = list.len();
        list.retain(|r| r.id.as_deref() != Some(id));
        if list.len() == before {
            return Err(StoreError::NotFound(id.to_owned()));
        }
        Ok(())
    }
}

// ============================================================================
// Blobs
// ============================================================================

/// In-process blob store handing out `memory://` URLs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enter(&self) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.enter()?;
        validate_blob_key(key)?;
        self.lock().insert(key.to_owned(), bytes);
        Ok(())
    }

    async fn public_url(&self, key: &str) -> Result<String, StoreError> {
        self.enter()?;
        validate_blob_key(key)?;
        if !self.lock().contains_key(key) {
            return Err(StoreError::NotFound(key.to_owned()));
        }
        Ok(format!("memory://blobs/{}", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, date: i64) -> ContentRecord {
        ContentRecord {
            id: None,
            title: title.to_owned(),
            description: String::new(),
            link: String::new(),
            date,
            youtube_id: None,
            local_path: None,
            checklist: None,
            cover_photo: None,
            thumbnail: None,
        }
    }

    #[tokio::test]
    async fn test_query_orders_by_date_descending_with_stable_ties() {
        let store = MemoryDocumentStore::new();
        store.insert(Collection::News, &record("old", 1)).await.unwrap();
        store.insert(Collection::News, &record("tie-a", 5)).await.unwrap();
        store.insert(Collection::News, &record("tie-b", 5)).await.unwrap();

        let out = store
            .query(Collection::News, SortField::Date, Direction::Descending)
            .await
            .unwrap();
        let titles: Vec<&str> = out.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["tie-b", "tie-a", "old"]);
    }

    #[tokio::test]
    async fn test_failure_injection_counts_calls() {
        let store = MemoryDocumentStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.insert(Collection::Videos, &record("x", 1)).await,
            Err(StoreError::Unavailable)
        ));
        assert_eq!(store.calls(), 1);
        assert!(store.snapshot(Collection::Videos).is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryDocumentStore::new();
        assert!(matches!(
            store.delete(Collection::Articles, "mem-9").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_blob_round_trip() {
        let blobs = MemoryBlobStore::new();
        blobs.put("uploads/1-a.pdf", vec![1, 2]).await.unwrap();
        assert_eq!(
            blobs.public_url("uploads/1-a.pdf").await.unwrap(),
            "memory://blobs/uploads/1-a.pdf"
        );
        assert_eq!(blobs.get("uploads/1-a.pdf"), Some(vec![1, 2]));
        assert!(matches!(
            blobs.public_url("uploads/other.pdf").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
