pub mod comments;
pub mod health;
pub mod inbox;
pub mod ratings;

use agora_core::catalog::{SubjectKind, SubjectRef};
use agora_core::error::CoreError;

use crate::error::AppError;

/// Resolve the `{kind}/{subject_id}` path pair into a subject reference.
/// Unknown kind segments are a 404 — the route space only contains
/// `artifacts` and `skills`.
pub(crate) fn subject_from_path(kind: &str, subject_id: &str) -> Result<SubjectRef, AppError> {
    let kind = SubjectKind::from_path_segment(kind)
        .ok_or_else(|| AppError(CoreError::not_found(format!("route /v1/{kind}"))))?;
    Ok(SubjectRef::new(kind, subject_id))
}
