use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::CoreError;

/// What a comment or rating is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Artifact,
    Skill,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Artifact => "artifact",
            Self::Skill => "skill",
        }
    }

    /// Parse the plural path segment used in routes (`artifacts`, `skills`).
    pub fn from_path_segment(segment: &str) -> Option<Self> {
        match segment {
            "artifacts" => Some(Self::Artifact),
            "skills" => Some(Self::Skill),
            _ => None,
        }
    }
}

/// A reference to one subject in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: String,
}

impl SubjectRef {
    pub fn new(kind: SubjectKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// Existence checks against the artifact/skill catalog.
///
/// The core only ever needs a boolean answer; catalog contents live outside
/// this service.
#[async_trait]
pub trait SubjectCatalog: Send + Sync {
    async fn exists(&self, subject: &SubjectRef) -> Result<bool, CoreError>;
}

/// One entry in the subject manifest consumed by [`StaticCatalog`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectEntry {
    pub kind: SubjectKind,
    pub id: String,
    /// Handle notified when the subject receives a rating.
    #[serde(default)]
    pub owner_handle: Option<String>,
}

/// In-memory catalog loaded from a JSON manifest at startup. Also the
/// catalog used in tests.
pub struct StaticCatalog {
    subjects: HashSet<(SubjectKind, String)>,
}

impl StaticCatalog {
    pub fn new(entries: Vec<SubjectEntry>) -> Self {
        let subjects = entries.into_iter().map(|e| (e.kind, e.id)).collect();
        Self { subjects }
    }

    pub fn of(subjects: &[(SubjectKind, &str)]) -> Self {
        Self {
            subjects: subjects
                .iter()
                .map(|(kind, id)| (*kind, (*id).to_string()))
                .collect(),
        }
    }

    pub async fn from_manifest(path: &Path) -> Result<Self, CoreError> {
        let bytes = tokio::fs::read(path).await.map_err(|err| {
            tracing::error!(path = %path.display(), error = %err, "failed to read subject manifest");
            CoreError::Storage("failed to read subject manifest".to_string())
        })?;
        let entries: Vec<SubjectEntry> = serde_json::from_slice(&bytes)?;
        Ok(Self::new(entries))
    }
}

#[async_trait]
impl SubjectCatalog for StaticCatalog {
    async fn exists(&self, subject: &SubjectRef) -> Result<bool, CoreError> {
        Ok(self
            .subjects
            .contains(&(subject.kind, subject.id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_catalog_answers_existence() {
        let catalog = StaticCatalog::of(&[(SubjectKind::Artifact, "art_1")]);

        let hit = SubjectRef::new(SubjectKind::Artifact, "art_1");
        let miss = SubjectRef::new(SubjectKind::Skill, "art_1");
        assert!(catalog.exists(&hit).await.unwrap());
        assert!(!catalog.exists(&miss).await.unwrap());
    }

    #[test]
    fn path_segments_parse_to_kinds() {
        assert_eq!(
            SubjectKind::from_path_segment("artifacts"),
            Some(SubjectKind::Artifact)
        );
        assert_eq!(
            SubjectKind::from_path_segment("skills"),
            Some(SubjectKind::Skill)
        );
        assert_eq!(SubjectKind::from_path_segment("artifact"), None);
    }
}
