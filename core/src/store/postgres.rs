//! Relational store backend on Postgres.
//!
//! Documents live in a single `agora_documents` table with the logical
//! record as a `jsonb` column and the routing fields (`subject_id`,
//! `recipient_handle`, `unique_key`) promoted to indexed columns. Upsert
//! uniqueness is enforced by a partial unique index, so concurrent upserts
//! for the same key serialize at the database.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

use crate::error::CoreError;
use crate::store::{
    Collection, DurableStore, UpsertMutator, UpsertOutcome, doc_str, doc_str_opt,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the documents table and its indexes if absent. Called once at
    /// startup by [`crate::config::build_store`].
    pub async fn ensure_schema(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agora_documents (
                collection        TEXT NOT NULL,
                id                TEXT NOT NULL,
                subject_id        TEXT,
                recipient_handle  TEXT,
                unique_key        TEXT,
                doc               JSONB NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS agora_documents_unique_key_idx
            ON agora_documents (collection, unique_key)
            WHERE unique_key IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS agora_documents_subject_idx
            ON agora_documents (collection, subject_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS agora_documents_recipient_idx
            ON agora_documents (collection, recipient_handle)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        db_err.code().as_deref() == Some("23505")
    } else {
        false
    }
}

#[async_trait]
impl DurableStore for PgStore {
    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Value>, CoreError> {
        let doc = sqlx::query_scalar::<_, Value>(
            "SELECT doc FROM agora_documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    async fn list_by_subject(
        &self,
        collection: Collection,
        subject_id: &str,
    ) -> Result<Vec<Value>, CoreError> {
        let docs = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT doc FROM agora_documents
            WHERE collection = $1 AND subject_id = $2
            ORDER BY id
            "#,
        )
        .bind(collection.as_str())
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    async fn list_by_recipient(
        &self,
        collection: Collection,
        recipient_handle: &str,
    ) -> Result<Vec<Value>, CoreError> {
        let docs = sqlx::query_scalar::<_, Value>(
            r#"
            SELECT doc FROM agora_documents
            WHERE collection = $1 AND recipient_handle = $2
            ORDER BY id
            "#,
        )
        .bind(collection.as_str())
        .bind(recipient_handle)
        .fetch_all(&self.pool)
        .await?;
        Ok(docs)
    }

    async fn append(&self, collection: Collection, record: Value) -> Result<Value, CoreError> {
        let id = doc_str(&record, "id")?;
        let subject_id = doc_str_opt(&record, "subject_id").map(str::to_string);
        let recipient = doc_str_opt(&record, "recipient_handle").map(str::to_string);

        sqlx::query(
            r#"
            INSERT INTO agora_documents (collection, id, subject_id, recipient_handle, doc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(collection.as_str())
        .bind(&id)
        .bind(subject_id)
        .bind(recipient)
        .bind(&record)
        .execute(&self.pool)
        .await?;

        Ok(record)
    }

    async fn upsert(
        &self,
        collection: Collection,
        unique_key: &str,
        insert: Value,
        mutate: UpsertMutator,
    ) -> Result<UpsertOutcome, CoreError> {
        // Two attempts: losing the insert race to a concurrent creator hits
        // the unique index, after which the update path must win.
        for attempt in 0..2 {
            let mut tx = self.pool.begin().await?;

            let existing = sqlx::query_scalar::<_, Value>(
                r#"
                SELECT doc FROM agora_documents
                WHERE collection = $1 AND unique_key = $2
                FOR UPDATE
                "#,
            )
            .bind(collection.as_str())
            .bind(unique_key)
            .fetch_optional(&mut *tx)
            .await?;

            if let Some(mut doc) = existing {
                mutate(&mut doc);
                sqlx::query(
                    r#"
                    UPDATE agora_documents SET doc = $3
                    WHERE collection = $1 AND unique_key = $2
                    "#,
                )
                .bind(collection.as_str())
                .bind(unique_key)
                .bind(&doc)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                return Ok(UpsertOutcome {
                    record: doc,
                    created: false,
                });
            }

            let mut record = insert.clone();
            if let Some(obj) = record.as_object_mut() {
                obj.insert(
                    "unique_key".to_string(),
                    Value::String(unique_key.to_string()),
                );
            }
            let id = doc_str(&record, "id")?;
            let subject_id = doc_str_opt(&record, "subject_id").map(str::to_string);
            let recipient = doc_str_opt(&record, "recipient_handle").map(str::to_string);

            let inserted = sqlx::query(
                r#"
                INSERT INTO agora_documents
                    (collection, id, subject_id, recipient_handle, unique_key, doc)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(collection.as_str())
            .bind(&id)
            .bind(subject_id)
            .bind(recipient)
            .bind(unique_key)
            .bind(&record)
            .execute(&mut *tx)
            .await;

            match inserted {
                Ok(_) => {
                    tx.commit().await?;
                    return Ok(UpsertOutcome {
                        record,
                        created: true,
                    });
                }
                Err(err) if is_unique_violation(&err) && attempt == 0 => {
                    tracing::debug!(
                        collection = collection.as_str(),
                        unique_key,
                        "lost upsert insert race, retrying as update"
                    );
                    tx.rollback().await?;
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(CoreError::Conflict {
            message: format!("upsert for key `{unique_key}` could not be applied"),
        })
    }
}
