use std::path::PathBuf;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use crate::error::CoreError;
use crate::store::DurableStore;
use crate::store::file::FileStore;
use crate::store::postgres::PgStore;

/// Which durable store backend to run. Chosen once at process startup —
/// after [`build_store`] returns, nothing branches on backend type again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    File { data_dir: PathBuf },
    Postgres { url: String },
}

impl StoreConfig {
    /// Read the backend selection from the environment.
    ///
    /// `AGORA_STORE=postgres` selects the relational backend (requires
    /// `DATABASE_URL`); `AGORA_STORE=file` or an unset variable selects the
    /// file backend rooted at `AGORA_DATA_DIR` (default `./data`). Any other
    /// value is a startup error, not a silent fallback.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_parts(
            std::env::var("AGORA_STORE").ok().as_deref(),
            std::env::var("AGORA_DATA_DIR").ok().as_deref(),
            std::env::var("DATABASE_URL").ok().as_deref(),
        )
    }

    fn from_parts(
        store: Option<&str>,
        data_dir: Option<&str>,
        database_url: Option<&str>,
    ) -> Result<Self, CoreError> {
        match store {
            Some("postgres") => {
                let url = database_url.ok_or_else(|| {
                    CoreError::Storage(
                        "AGORA_STORE=postgres requires DATABASE_URL to be set".to_string(),
                    )
                })?;
                Ok(Self::Postgres {
                    url: url.to_string(),
                })
            }
            Some("file") | None => {
                let data_dir = data_dir.map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./data"));
                Ok(Self::File { data_dir })
            }
            Some(other) => Err(CoreError::Storage(format!(
                "unrecognized AGORA_STORE value `{other}` (expected `file` or `postgres`)"
            ))),
        }
    }
}

/// Construct the configured backend behind the storage-agnostic contract.
pub async fn build_store(config: &StoreConfig) -> Result<Arc<dyn DurableStore>, CoreError> {
    match config {
        StoreConfig::File { data_dir } => {
            tokio::fs::create_dir_all(data_dir).await?;
            tracing::info!(data_dir = %data_dir.display(), "using file-backed store");
            Ok(Arc::new(FileStore::new(data_dir.clone())))
        }
        StoreConfig::Postgres { url } => {
            let pool = PgPoolOptions::new().max_connections(20).connect(url).await?;
            let store = PgStore::new(pool);
            store.ensure_schema().await?;
            tracing::info!("using postgres-backed store");
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_backends_parse() {
        assert_eq!(
            StoreConfig::from_parts(Some("file"), Some("/var/agora"), None).unwrap(),
            StoreConfig::File {
                data_dir: PathBuf::from("/var/agora")
            }
        );
        assert_eq!(
            StoreConfig::from_parts(Some("postgres"), None, Some("postgres://db/agora")).unwrap(),
            StoreConfig::Postgres {
                url: "postgres://db/agora".to_string()
            }
        );
    }

    #[test]
    fn unset_backend_defaults_to_file() {
        assert_eq!(
            StoreConfig::from_parts(None, None, None).unwrap(),
            StoreConfig::File {
                data_dir: PathBuf::from("./data")
            }
        );
    }

    #[test]
    fn unrecognized_backend_is_a_startup_error() {
        let err = StoreConfig::from_parts(Some("Postgres"), None, Some("postgres://db")).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[test]
    fn postgres_without_database_url_is_a_startup_error() {
        let err = StoreConfig::from_parts(Some("postgres"), None, None).unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
    }
}
