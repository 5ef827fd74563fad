use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::error::CoreError;

/// A resolved agent identity, supplied per-request by the identity provider.
///
/// Immutable. The core never persists identities on their own — it embeds a
/// snapshot into authored records, so renaming a handle later does not
/// retroactively change historical comments or ratings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AgentIdentity {
    /// Stable agent identifier, unique across the deployment
    pub agent_id: String,
    /// Public @-handle used for mentions and inbox addressing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Display name for rendering authored records
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl AgentIdentity {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            handle: None,
            display_name: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }
}

/// Resolves a bearer credential to an identity.
///
/// Failures surface as `CoreError::Auth` and are never retried by the core.
/// The core trusts the returned identity verbatim.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, credential: &str) -> Result<AgentIdentity, CoreError>;
}

/// SHA-256 hex digest of a bearer token. Tokens are stored hashed, never raw.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// One entry in the token manifest consumed by [`StaticTokenProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    /// SHA-256 hex digest of the bearer token
    pub token_sha256: String,
    pub identity: AgentIdentity,
}

/// File-backed identity provider for deployments without a real IdP.
///
/// Loads a JSON manifest of hashed tokens at startup; `resolve` hashes the
/// presented credential and looks it up. Also the provider used in tests.
pub struct StaticTokenProvider {
    tokens: HashMap<String, AgentIdentity>,
}

impl StaticTokenProvider {
    pub fn new(entries: Vec<TokenEntry>) -> Self {
        let tokens = entries
            .into_iter()
            .map(|e| (e.token_sha256, e.identity))
            .collect();
        Self { tokens }
    }

    /// Convenience constructor from raw (token, identity) pairs.
    pub fn from_raw_tokens(pairs: Vec<(String, AgentIdentity)>) -> Self {
        let tokens = pairs
            .into_iter()
            .map(|(token, identity)| (hash_token(&token), identity))
            .collect();
        Self { tokens }
    }

    pub async fn from_manifest(path: &Path) -> Result<Self, CoreError> {
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            tracing::error!(path = %path.display(), error = %err, "failed to read token manifest");
            CoreError::Storage("failed to read token manifest".to_string())
        })?;
        let entries: Vec<TokenEntry> = serde_json::from_slice(&bytes)?;
        Ok(Self::new(entries))
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn resolve(&self, credential: &str) -> Result<AgentIdentity, CoreError> {
        self.tokens
            .get(&hash_token(credential))
            .cloned()
            .ok_or_else(|| CoreError::Auth("unknown credential".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_token_is_stable_hex() {
        let digest = hash_token("agora_at_test");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_token("agora_at_test"));
        assert_ne!(digest, hash_token("agora_at_other"));
    }

    #[tokio::test]
    async fn static_provider_resolves_known_token() {
        let identity = AgentIdentity::new("agt_1").with_handle("alice");
        let provider =
            StaticTokenProvider::from_raw_tokens(vec![("secret".to_string(), identity.clone())]);

        let resolved = provider.resolve("secret").await.unwrap();
        assert_eq!(resolved, identity);
    }

    #[tokio::test]
    async fn static_provider_rejects_unknown_token() {
        let provider = StaticTokenProvider::from_raw_tokens(vec![]);
        let err = provider.resolve("nope").await.unwrap_err();
        assert!(matches!(err, CoreError::Auth(_)));
    }
}
