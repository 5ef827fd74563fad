use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// A single violated validation rule.
///
/// Write requests return every violation at once so an agent can fix the
/// whole request in one round trip instead of discovering rules one by one.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Violation {
    /// Which field caused the violation
    pub field: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// The value that was received (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<serde_json::Value>,
    /// Hint about what the correct usage looks like
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            received: None,
            docs_hint: None,
        }
    }

    pub fn with_received(mut self, received: serde_json::Value) -> Self {
        self.received = Some(received);
        self
    }

    pub fn with_docs_hint(mut self, hint: impl Into<String>) -> Self {
        self.docs_hint = Some(hint.into());
        self
    }
}

/// Error taxonomy for the feedback core.
///
/// Every variant maps to exactly one HTTP status at the boundary:
/// Validation → 400, NotFound → 404, Conflict → 409, RateLimited → 429,
/// Storage → 500, Auth → 401. The core itself never retries: storage
/// failures propagate unchanged and the caller decides retry policy.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input shape or range — always client-fixable. Carries the full
    /// list of violated rules, never just the first one.
    #[error("validation failed ({} violation(s))", .0.len())]
    Validation(Vec<Violation>),

    /// A referenced subject or record does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// Reserved for unique-constraint violations that are not absorbed by
    /// an upsert. Ratings never produce this.
    #[error("conflict: {message}")]
    Conflict { message: String },

    /// Too many requests for a rate-limit key within the current window.
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// I/O failure reading or writing the durable store. The detail string
    /// is for logs only — the HTTP boundary must not echo it to clients.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Identity resolution failed. Produced by the identity provider seam;
    /// the core just forwards it.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl CoreError {
    /// Shorthand for a single-violation validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![Violation::new(field, message)])
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(format!("document (de)serialization failed: {err}"))
    }
}

/// Machine-readable error codes used across the API.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFLICT: &str = "conflict";
    pub const RATE_LIMITED: &str = "rate_limited";
    pub const STORAGE_ERROR: &str = "storage_error";
    pub const UNAUTHORIZED: &str = "unauthorized";
}

/// Structured error response — designed for agents, not humans.
///
/// Every error contains enough information for an agent to understand what
/// went wrong and how to fix it. `details` carries the full violation list
/// for validation failures.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    /// Machine-readable error code (e.g. "validation_failed", "not_found")
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Violated rules, one entry per rule (validation errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<Violation>>,
    /// Seconds to wait before retrying (rate-limit errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
    /// Request ID for tracing and debugging
    pub request_id: String,
}
