use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalog::{SubjectCatalog, SubjectKind, SubjectRef};
use crate::error::{CoreError, Violation};
use crate::identity::AgentIdentity;
use crate::pagination::Paged;
use crate::store::{Collection, DurableStore, doc_str_opt};

/// Upper bound on `raw_body`, in bytes. The HTTP boundary enforces this
/// before the body reaches the engine; the engine re-validates defensively.
pub const MAX_COMMENT_BYTES: usize = 16 * 1024;

/// Allowed comment kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Comment,
    Question,
    Review,
    Tip,
}

/// A persisted comment. Immutable once written except the upvote counter,
/// which is incremented outside this engine; never deleted by this core.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Comment {
    /// UUIDv7 — globally unique and sortable by creation order
    pub id: String,
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    /// Parent comment on the same subject, if this is a reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub kind: CommentKind,
    pub raw_body: String,
    /// HTML-escaped body; full rendering happens outside this core
    pub rendered_body: String,
    pub plain_text: String,
    /// Author snapshot at write time — later handle renames do not
    /// retroactively change historical comments
    pub author: AgentIdentity,
    pub created_at: DateTime<Utc>,
    pub upvotes: i64,
}

impl Paged for Comment {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn page_id(&self) -> &str {
        &self.id
    }
}

/// Request body for creating a comment.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewComment {
    #[serde(default)]
    pub parent_id: Option<String>,
    pub kind: CommentKind,
    pub raw_body: String,
}

/// A comment with its (recursively sorted) replies.
#[derive(Debug, Serialize, ToSchema)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

/// Requested ordering for flat comment listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CommentOrder {
    #[default]
    Newest,
    Oldest,
    Top,
}

/// Validates, persists, and threads comments on artifacts and skills.
pub struct CommentThreadEngine {
    store: Arc<dyn DurableStore>,
    catalog: Arc<dyn SubjectCatalog>,
}

impl CommentThreadEngine {
    pub fn new(store: Arc<dyn DurableStore>, catalog: Arc<dyn SubjectCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Create a comment on `subject`.
    ///
    /// Violations accumulate into one error list so the caller can fix
    /// everything in a single round trip. A `parent_id` that exists on a
    /// *different* subject is a validation failure, not a 404 — the id
    /// exists, but cross-subject thread grafting is rejected.
    pub async fn create_comment(
        &self,
        subject: &SubjectRef,
        author: AgentIdentity,
        req: NewComment,
    ) -> Result<Comment, CoreError> {
        if !self.catalog.exists(subject).await? {
            return Err(CoreError::not_found(format!(
                "{} {}",
                subject.kind.as_str(),
                subject.id
            )));
        }

        let mut violations = Vec::new();

        let trimmed = req.raw_body.trim();
        if trimmed.is_empty() {
            violations.push(
                Violation::new("raw_body", "raw_body must not be empty")
                    .with_docs_hint("Provide the comment text in raw_body"),
            );
        } else if req.raw_body.len() > MAX_COMMENT_BYTES {
            violations.push(
                Violation::new(
                    "raw_body",
                    format!(
                        "raw_body is {} bytes, maximum is {MAX_COMMENT_BYTES}",
                        req.raw_body.len()
                    ),
                )
                .with_docs_hint("Split very long feedback into multiple comments"),
            );
        }

        if let Some(parent_id) = &req.parent_id {
            let parent = self
                .store
                .find_by_id(Collection::Comments, parent_id)
                .await?;
            let on_same_subject = parent
                .as_ref()
                .and_then(|doc| doc_str_opt(doc, "subject_id"))
                .is_some_and(|sid| sid == subject.id);
            if !on_same_subject {
                violations.push(
                    Violation::new(
                        "parent_id",
                        format!("parent_id not found on {}", subject.kind.as_str()),
                    )
                    .with_received(serde_json::Value::String(parent_id.clone()))
                    .with_docs_hint(
                        "parent_id must reference an existing comment on the same subject",
                    ),
                );
            }
        }

        if !violations.is_empty() {
            return Err(CoreError::Validation(violations));
        }

        let comment = Comment {
            id: Uuid::now_v7().to_string(),
            subject_id: subject.id.clone(),
            subject_kind: subject.kind,
            parent_id: req.parent_id,
            kind: req.kind,
            rendered_body: render_body(trimmed),
            plain_text: trimmed.to_string(),
            raw_body: req.raw_body,
            author,
            created_at: Utc::now(),
            upvotes: 0,
        };

        self.store
            .append(Collection::Comments, serde_json::to_value(&comment)?)
            .await?;
        Ok(comment)
    }

    async fn load(&self, subject_id: &str) -> Result<Vec<Comment>, CoreError> {
        let docs = self
            .store
            .list_by_subject(Collection::Comments, subject_id)
            .await?;
        docs.into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(CoreError::from))
            .collect()
    }

    /// Tree-shaped listing: replies at every level sorted by upvotes
    /// descending, then created_at descending, recursively.
    pub async fn list_threaded(&self, subject_id: &str) -> Result<Vec<CommentNode>, CoreError> {
        Ok(build_thread(self.load(subject_id).await?))
    }

    /// Flat listing in the caller's requested order, no tree structure.
    pub async fn list_flat(
        &self,
        subject_id: &str,
        order: CommentOrder,
    ) -> Result<Vec<Comment>, CoreError> {
        let mut comments = self.load(subject_id).await?;
        match order {
            CommentOrder::Newest => comments.sort_by(crate::pagination::compare_desc),
            CommentOrder::Oldest => {
                comments.sort_by(|a, b| crate::pagination::compare_desc(b, a));
            }
            CommentOrder::Top => comments.sort_by(|a, b| {
                b.upvotes
                    .cmp(&a.upvotes)
                    .then_with(|| b.created_at.cmp(&a.created_at))
            }),
        }
        Ok(comments)
    }
}

/// Minimal safe rendering: HTML-escape and preserve line breaks. Full
/// markdown rendering is out of scope for this core.
fn render_body(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;");
    format!("<p>{}</p>", escaped.replace('\n', "<br>"))
}

fn build_thread(comments: Vec<Comment>) -> Vec<CommentNode> {
    let ids: HashSet<String> = comments.iter().map(|c| c.id.clone()).collect();
    let mut children: HashMap<String, Vec<Comment>> = HashMap::new();
    let mut roots = Vec::new();

    for comment in comments {
        match &comment.parent_id {
            // A parent missing from the map (dangling reference) makes the
            // comment a root instead of dropping it.
            Some(parent_id) if ids.contains(parent_id) => children
                .entry(parent_id.clone())
                .or_default()
                .push(comment),
            _ => roots.push(comment),
        }
    }

    let mut nodes: Vec<CommentNode> = roots
        .into_iter()
        .map(|comment| attach_replies(comment, &mut children))
        .collect();
    sort_thread(&mut nodes);
    nodes
}

fn attach_replies(comment: Comment, children: &mut HashMap<String, Vec<Comment>>) -> CommentNode {
    let replies = children
        .remove(&comment.id)
        .unwrap_or_default()
        .into_iter()
        .map(|child| attach_replies(child, children))
        .collect();
    CommentNode { comment, replies }
}

/// Depth-first: each sibling group is sorted independently.
fn sort_thread(nodes: &mut [CommentNode]) {
    nodes.sort_by(|a, b| {
        b.comment
            .upvotes
            .cmp(&a.comment.upvotes)
            .then_with(|| b.comment.created_at.cmp(&a.comment.created_at))
    });
    for node in nodes {
        sort_thread(&mut node.replies);
    }
}
