//! File-backed store: one pretty-printed JSON array per collection.
//!
//! Writes are read-entire-file → mutate in memory → write-to-temp-file →
//! atomic rename, so a reader never observes a partially-written file. A
//! per-collection mutex serializes mutations within this process.
//!
//! Hazard: there is no cross-process mutual exclusion. Two processes racing
//! on the same file can both read the pre-mutation state and each rename a
//! version that silently drops the other's change (lost update). This is an
//! accepted limitation for a single-instance deployment; running multiple
//! writer processes against one data directory requires the relational
//! backend instead.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::CoreError;
use crate::store::{
    Collection, DurableStore, UpsertMutator, UpsertOutcome, doc_str, doc_str_opt,
};

pub struct FileStore {
    data_dir: PathBuf,
    locks: HashMap<Collection, Mutex<()>>,
}

impl FileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let locks = Collection::ALL
            .into_iter()
            .map(|c| (c, Mutex::new(())))
            .collect();
        Self {
            data_dir: data_dir.into(),
            locks,
        }
    }

    fn collection_path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(format!("{}.json", collection.as_str()))
    }

    async fn read_collection(&self, collection: Collection) -> Result<Vec<Value>, CoreError> {
        let path = self.collection_path(collection);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "collection read failed");
                return Err(CoreError::Storage(format!(
                    "failed to read collection {}",
                    collection.as_str()
                )));
            }
        };
        serde_json::from_slice(&bytes).map_err(|err| {
            tracing::error!(path = %path.display(), error = %err, "collection parse failed");
            CoreError::Storage(format!(
                "collection {} is not a valid JSON array",
                collection.as_str()
            ))
        })
    }

    async fn write_collection(
        &self,
        collection: Collection,
        records: &[Value],
    ) -> Result<(), CoreError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        let bytes = serde_json::to_vec_pretty(records)?;

        let path = self.collection_path(collection);
        let tmp = self.data_dir.join(format!(
            ".{}.json.tmp-{}",
            collection.as_str(),
            Uuid::now_v7()
        ));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    fn lock_for(&self, collection: Collection) -> &Mutex<()> {
        self.locks
            .get(&collection)
            .expect("every collection has a lock")
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, CoreError> {
        // Reads skip the mutex: the atomic rename guarantees a consistent file.
        let records = self.read_collection(collection).await?;
        Ok(records
            .into_iter()
            .find(|record| doc_str_opt(record, "id") == Some(id)))
    }

    async fn list_by_subject(
        &self,
        collection: Collection,
        subject_id: &str,
    ) -> Result<Vec<Value>, CoreError> {
        let records = self.read_collection(collection).await?;
        Ok(records
            .into_iter()
            .filter(|record| doc_str_opt(record, "subject_id") == Some(subject_id))
            .collect())
    }

    async fn list_by_recipient(
        &self,
        collection: Collection,
        recipient_handle: &str,
    ) -> Result<Vec<Value>, CoreError> {
        let records = self.read_collection(collection).await?;
        Ok(records
            .into_iter()
            .filter(|record| doc_str_opt(record, "recipient_handle") == Some(recipient_handle))
            .collect())
    }

    async fn append(&self, collection: Collection, record: Value) -> Result<Value, CoreError> {
        doc_str(&record, "id")?;

        let _guard = self.lock_for(collection).lock().await;
        let mut records = self.read_collection(collection).await?;
        records.push(record.clone());
        self.write_collection(collection, &records).await?;
        Ok(record)
    }

    async fn upsert(
        &self,
        collection: Collection,
        unique_key: &str,
        insert: Value,
        mutate: UpsertMutator,
    ) -> Result<UpsertOutcome, CoreError> {
        let _guard = self.lock_for(collection).lock().await;
        let mut records = self.read_collection(collection).await?;

        let existing = records
            .iter_mut()
            .find(|record| doc_str_opt(record, "unique_key") == Some(unique_key));

        let outcome = match existing {
            Some(record) => {
                mutate(record);
                UpsertOutcome {
                    record: record.clone(),
                    created: false,
                }
            }
            None => {
                let mut record = insert;
                if let Some(obj) = record.as_object_mut() {
                    obj.insert(
                        "unique_key".to_string(),
                        Value::String(unique_key.to_string()),
                    );
                }
                records.push(record.clone());
                UpsertOutcome {
                    record,
                    created: true,
                }
            }
        };

        self.write_collection(collection, &records).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn append_then_find_round_trips() {
        let (_dir, store) = store();
        let record = json!({"id": "c_1", "subject_id": "art_1", "raw_body": "hello"});

        store
            .append(Collection::Comments, record.clone())
            .await
            .unwrap();

        let found = store
            .find_by_id(Collection::Comments, "c_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, record);
        assert!(
            store
                .find_by_id(Collection::Comments, "c_2")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn missing_collection_file_reads_as_empty() {
        let (_dir, store) = store();
        let records = store
            .list_by_subject(Collection::Ratings, "art_1")
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn list_by_subject_filters_other_subjects() {
        let (_dir, store) = store();
        for (id, subject) in [("c_1", "art_1"), ("c_2", "art_2"), ("c_3", "art_1")] {
            store
                .append(Collection::Comments, json!({"id": id, "subject_id": subject}))
                .await
                .unwrap();
        }

        let records = store
            .list_by_subject(Collection::Comments, "art_1")
            .await
            .unwrap();
        assert_eq!(records.len(), 2);
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_in_place() {
        let (_dir, store) = store();

        let first = store
            .upsert(
                Collection::Ratings,
                "art_1#agt_1",
                json!({"id": "r_1", "subject_id": "art_1", "score": 5.0}),
                Box::new(|_| {}),
            )
            .await
            .unwrap();
        assert!(first.created);

        let second = store
            .upsert(
                Collection::Ratings,
                "art_1#agt_1",
                json!({"id": "r_2", "subject_id": "art_1", "score": 1.0}),
                Box::new(|record| {
                    record["score"] = json!(3.0);
                }),
            )
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.record["id"], "r_1", "update mutates the original");
        assert_eq!(second.record["score"], json!(3.0));

        let all = store
            .list_by_subject(Collection::Ratings, "art_1")
            .await
            .unwrap();
        assert_eq!(all.len(), 1, "one row per unique key");
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let (dir, store) = store();
        store
            .append(Collection::Comments, json!({"id": "c_1"}))
            .await
            .unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
