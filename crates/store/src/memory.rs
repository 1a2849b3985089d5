//! In-memory store backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    error::{Result, StoreError},
    kv::{BATCH_WRITE_LIMIT, Condition, Key, KeyValueStore, Update, WriteRequest},
    record::Record,
};

/// In-process [`KeyValueStore`] backend.
///
/// All operations run under one mutex, which makes `conditional_update`
/// trivially atomic — this is the linearization point the workspace's
/// concurrency tests race real tasks against. Also useful for local
/// development with caching disabled.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<BTreeMap<(String, String), Record>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &Key) -> Result<Option<Record>> {
        let items = self.items.lock();
        Ok(items.get(&(key.partition.clone(), key.sort.clone())).cloned())
    }

    async fn put(&self, key: &Key, record: Record) -> Result<()> {
        let mut items = self.items.lock();
        items.insert((key.partition.clone(), key.sort.clone()), record);
        Ok(())
    }

    async fn conditional_update(
        &self,
        key: &Key,
        update: Update,
        condition: Condition,
    ) -> Result<Record> {
        let mut items = self.items.lock();
        let map_key = (key.partition.clone(), key.sort.clone());
        let current = items.get(&map_key);

        if !condition.holds(current) {
            return Err(StoreError::ConditionFailed { key: key.clone() });
        }

        let mut next = current.cloned().unwrap_or_default();
        update.apply(&mut next);
        items.insert(map_key, next.clone());
        Ok(next)
    }

    async fn delete(&self, key: &Key, condition: Option<Condition>) -> Result<()> {
        let mut items = self.items.lock();
        let map_key = (key.partition.clone(), key.sort.clone());

        if let Some(condition) = condition {
            if !condition.holds(items.get(&map_key)) {
                return Err(StoreError::ConditionFailed { key: key.clone() });
            }
        }

        items.remove(&map_key);
        Ok(())
    }

    async fn query_prefix(
        &self,
        partition: &str,
        sort_prefix: &str,
    ) -> Result<Vec<(Key, Record)>> {
        let items = self.items.lock();
        // BTreeMap iteration is already (partition, sort)-ordered.
        let results = items
            .iter()
            .filter(|((p, s), _)| p == partition && s.starts_with(sort_prefix))
            .map(|((p, s), record)| (Key::new(p.clone(), s.clone()), record.clone()))
            .collect();
        Ok(results)
    }

    async fn batch_write(&self, requests: Vec<WriteRequest>) -> Result<()> {
        if requests.len() > BATCH_WRITE_LIMIT {
            return Err(StoreError::BatchTooLarge {
                count: requests.len(),
                limit: BATCH_WRITE_LIMIT,
            });
        }

        let mut items = self.items.lock();
        for request in requests {
            match request {
                WriteRequest::Put { key, record } => {
                    items.insert((key.partition, key.sort), record);
                },
                WriteRequest::Delete { key } => {
                    items.remove(&(key.partition, key.sort));
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryStore::new();
        let key = Key::new("p", "s");
        store
            .put(&key, Record::new().with("value", 42))
            .await
            .unwrap();
        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.get_i64("value"), Some(42));
    }

    #[tokio::test]
    async fn conditional_update_creates_when_condition_permits_absence() {
        let store = MemoryStore::new();
        let key = Key::new("p", "s");
        let post = store
            .conditional_update(
                &key,
                Update::new().set("token", "abc"),
                Condition::Absent("token".to_string()),
            )
            .await
            .unwrap();
        assert_eq!(post.get_str("token"), Some("abc"));
    }

    #[tokio::test]
    async fn conditional_update_rejects_when_condition_fails() {
        let store = MemoryStore::new();
        let key = Key::new("p", "s");
        store
            .put(&key, Record::new().with("token", "abc"))
            .await
            .unwrap();

        let result = store
            .conditional_update(
                &key,
                Update::new().set("token", "other"),
                Condition::Absent("token".to_string()),
            )
            .await;
        assert!(matches!(result, Err(StoreError::ConditionFailed { .. })));

        // The record is untouched.
        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.get_str("token"), Some("abc"));
    }

    #[tokio::test]
    async fn conditional_update_preserves_unrelated_attributes() {
        let store = MemoryStore::new();
        let key = Key::new("p", "s");
        store
            .put(&key, Record::new().with("keep", "me").with("count", 1))
            .await
            .unwrap();
        let post = store
            .conditional_update(
                &key,
                Update::new().add("count", 1),
                Condition::Equals("keep".to_string(), json!("me")),
            )
            .await
            .unwrap();
        assert_eq!(post.get_str("keep"), Some("me"));
        assert_eq!(post.get_i64("count"), Some(2));
    }

    #[tokio::test]
    async fn delete_is_idempotent_without_condition() {
        let store = MemoryStore::new();
        let key = Key::new("p", "s");
        store.delete(&key, None).await.unwrap();
    }

    #[tokio::test]
    async fn conditional_delete_rejects_on_absent_record() {
        let store = MemoryStore::new();
        let key = Key::new("p", "s");
        let result = store
            .delete(&key, Some(Condition::Equals("token".to_string(), json!("abc"))))
            .await;
        assert!(matches!(result, Err(StoreError::ConditionFailed { .. })));
    }

    #[tokio::test]
    async fn query_prefix_returns_sorted_matches_only() {
        let store = MemoryStore::new();
        for sort in ["page#000002", "page#000001", "meta", "page#000003"] {
            store
                .put(&Key::new("roster", sort), Record::new().with("s", sort))
                .await
                .unwrap();
        }
        store
            .put(&Key::new("other", "page#000009"), Record::new())
            .await
            .unwrap();

        let pages = store.query_prefix("roster", "page#").await.unwrap();
        let sorts: Vec<&str> = pages.iter().map(|(k, _)| k.sort.as_str()).collect();
        assert_eq!(sorts, vec!["page#000001", "page#000002", "page#000003"]);
    }

    #[tokio::test]
    async fn batch_write_enforces_limit() {
        let store = MemoryStore::new();
        let requests: Vec<WriteRequest> = (0..26)
            .map(|i| WriteRequest::Put {
                key: Key::new("p", format!("s{i}")),
                record: Record::new(),
            })
            .collect();
        let result = store.batch_write(requests).await;
        assert!(matches!(result, Err(StoreError::BatchTooLarge { count: 26, .. })));
    }

    #[tokio::test]
    async fn batch_write_chunked_handles_large_sets() {
        let store = MemoryStore::new();
        let requests: Vec<WriteRequest> = (0..60)
            .map(|i| WriteRequest::Put {
                key: Key::new("p", format!("s{i:03}")),
                record: Record::new(),
            })
            .collect();
        store.batch_write_chunked(requests).await.unwrap();
        assert_eq!(store.len(), 60);
    }

    #[tokio::test]
    async fn concurrent_conditional_updates_serialize() {
        // Many tasks race an increment guarded by an upper bound; the final
        // count must equal the bound exactly.
        let store = Arc::new(MemoryStore::new());
        let key = Key::new("counter", "day");
        let bound = 10;

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                store
                    .conditional_update(
                        &key,
                        Update::new().add("count", 1),
                        Condition::Or(vec![
                            Condition::Absent("count".to_string()),
                            Condition::NumberLessThan("count".to_string(), bound),
                        ]),
                    )
                    .await
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, bound);

        let record = store.get(&key).await.unwrap().unwrap();
        assert_eq!(record.get_i64("count"), Some(bound));
    }
}
