use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use agora_core::error::CoreError;
use agora_core::identity::AgentIdentity;

use crate::error::AppError;
use crate::state::AppState;

/// The authenticated agent for a request, resolved from the bearer
/// credential by the configured identity provider. The resolved identity is
/// trusted verbatim — the core never re-validates it.
pub struct AuthedAgent(pub AgentIdentity);

impl FromRequestParts<AppState> for AuthedAgent {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = bearer_credential(parts)
            .ok_or_else(|| AppError(CoreError::Auth("missing bearer credential".to_string())))?;
        let identity = state.identity.resolve(&credential).await?;
        Ok(AuthedAgent(identity))
    }
}

fn bearer_credential(parts: &Parts) -> Option<String> {
    let header = parts.headers.get("authorization")?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = value {
            builder = builder.header("authorization", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn strips_bearer_prefix() {
        let parts = parts_with_auth(Some("Bearer agora_at_abc"));
        assert_eq!(bearer_credential(&parts).as_deref(), Some("agora_at_abc"));
    }

    #[test]
    fn missing_or_malformed_headers_yield_none() {
        assert_eq!(bearer_credential(&parts_with_auth(None)), None);
        assert_eq!(bearer_credential(&parts_with_auth(Some("Basic xyz"))), None);
        assert_eq!(bearer_credential(&parts_with_auth(Some("Bearer "))), None);
    }
}
