use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::comments::Comment;
use crate::error::CoreError;
use crate::mentions::extract_mentions;
use crate::pagination::{Cursor, Page, Paged, paginate};
use crate::ratings::Rating;
use crate::store::{Collection, DurableStore, doc_str_opt};

/// Recipient sentinel for `comment.created` events, which are addressed to
/// nobody specific — subject-watcher resolution happens outside this core.
/// Filtered out of per-recipient inbox reads by the empty-handle mismatch.
pub const WATCHERS_RECIPIENT: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum InboxEventType {
    #[serde(rename = "comment.created")]
    CommentCreated,
    #[serde(rename = "comment.replied")]
    CommentReplied,
    #[serde(rename = "comment.mentioned")]
    CommentMentioned,
    #[serde(rename = "rating.created_or_updated")]
    RatingCreatedOrUpdated,
}

/// Where in a comment a mention was found.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MentionRef {
    pub handle: String,
    pub in_comment_id: String,
}

/// One append-only inbox entry. Never mutated or deleted by this core.
///
/// Ids are UUIDv7 — globally unique across all recipients' streams, so
/// merges across storage shards cannot collide, and time-ordered so the
/// cursor tie-break stays consistent with insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InboxEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: InboxEventType,
    pub created_at: DateTime<Utc>,
    pub subject_id: String,
    pub recipient_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention: Option<MentionRef>,
}

impl Paged for InboxEvent {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn page_id(&self) -> &str {
        &self.id
    }
}

/// Converts comment and rating writes into recipient inbox events.
///
/// Fan-out is best-effort by design: it runs after the primary record is
/// already persisted, and a failed event write is logged and dropped rather
/// than surfaced — a missed notification is a minor degradation, a rejected
/// comment because notifications failed would be a correctness regression.
pub struct InboxFanoutEngine {
    store: Arc<dyn DurableStore>,
}

impl InboxFanoutEngine {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    fn event(
        &self,
        event_type: InboxEventType,
        subject_id: &str,
        recipient_handle: &str,
    ) -> InboxEvent {
        InboxEvent {
            id: Uuid::now_v7().to_string(),
            event_type,
            created_at: Utc::now(),
            subject_id: subject_id.to_string(),
            recipient_handle: recipient_handle.to_string(),
            comment: None,
            rating: None,
            mention: None,
        }
    }

    /// Derive and deliver events for a freshly created comment. Returns the
    /// events that were actually persisted.
    pub async fn fanout_comment(&self, comment: &Comment) -> Vec<InboxEvent> {
        let mut events = Vec::new();

        let mut created = self.event(
            InboxEventType::CommentCreated,
            &comment.subject_id,
            WATCHERS_RECIPIENT,
        );
        created.comment = Some(comment.clone());
        events.push(created);

        if let Some(parent_id) = &comment.parent_id {
            match self.parent_author_handle(parent_id).await {
                Ok(Some((author_id, handle))) => {
                    // No self-notification on replies to one's own comment.
                    if author_id != comment.author.agent_id {
                        let mut replied = self.event(
                            InboxEventType::CommentReplied,
                            &comment.subject_id,
                            &handle,
                        );
                        replied.comment = Some(comment.clone());
                        events.push(replied);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        comment_id = %comment.id,
                        parent_id = %parent_id,
                        error = %err,
                        "reply fan-out skipped: parent lookup failed"
                    );
                }
            }
        }

        let author_handle = comment.author.handle.as_deref();
        for handle in extract_mentions(&comment.plain_text) {
            if Some(handle.as_str()) == author_handle {
                continue;
            }
            let mut mentioned =
                self.event(InboxEventType::CommentMentioned, &comment.subject_id, &handle);
            mentioned.comment = Some(comment.clone());
            mentioned.mention = Some(MentionRef {
                handle: handle.clone(),
                in_comment_id: comment.id.clone(),
            });
            events.push(mentioned);
        }

        self.deliver(events).await
    }

    /// Derive and deliver the single event for a rating upsert, addressed to
    /// the subject owner (resolved externally by the caller).
    pub async fn fanout_rating(&self, rating: &Rating, owner_handle: &str) -> Vec<InboxEvent> {
        let mut event = self.event(
            InboxEventType::RatingCreatedOrUpdated,
            &rating.subject_id,
            owner_handle,
        );
        event.rating = Some(rating.clone());
        self.deliver(vec![event]).await
    }

    /// Page through one recipient's inbox, newest first.
    pub async fn list_inbox(
        &self,
        recipient_handle: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Page<InboxEvent>, CoreError> {
        let docs = self
            .store
            .list_by_recipient(Collection::InboxEvents, recipient_handle)
            .await?;
        let events: Vec<InboxEvent> = docs
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(CoreError::from))
            .collect::<Result<_, _>>()?;
        Ok(paginate(events, cursor, limit))
    }

    async fn parent_author_handle(
        &self,
        parent_id: &str,
    ) -> Result<Option<(String, String)>, CoreError> {
        let Some(doc) = self.store.find_by_id(Collection::Comments, parent_id).await? else {
            return Ok(None);
        };
        let author = doc.get("author");
        let agent_id = author
            .and_then(|a| doc_str_opt(a, "agent_id"))
            .map(str::to_string);
        let handle = author
            .and_then(|a| doc_str_opt(a, "handle"))
            .map(str::to_string);
        // A parent author without a handle cannot be addressed.
        Ok(agent_id.zip(handle))
    }

    async fn deliver(&self, events: Vec<InboxEvent>) -> Vec<InboxEvent> {
        let mut delivered = Vec::with_capacity(events.len());
        for event in events {
            let doc = match serde_json::to_value(&event) {
                Ok(doc) => doc,
                Err(err) => {
                    tracing::warn!(event_id = %event.id, error = %err, "inbox event serialization failed");
                    continue;
                }
            };
            match self.store.append(Collection::InboxEvents, doc).await {
                Ok(_) => delivered.push(event),
                Err(err) => {
                    tracing::warn!(
                        event_id = %event.id,
                        recipient = %event.recipient_handle,
                        error = %err,
                        "inbox event delivery failed, notification dropped"
                    );
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{StaticCatalog, SubjectKind, SubjectRef};
    use crate::comments::{CommentKind, CommentThreadEngine, NewComment};
    use crate::identity::AgentIdentity;
    use crate::pagination::decode_cursor;
    use crate::store::file::FileStore;

    struct Fixture {
        _dir: tempfile::TempDir,
        comments: CommentThreadEngine,
        fanout: InboxFanoutEngine,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DurableStore> = Arc::new(FileStore::new(dir.path()));
        let catalog = Arc::new(StaticCatalog::of(&[(SubjectKind::Artifact, "art_1")]));
        Fixture {
            _dir: dir,
            comments: CommentThreadEngine::new(store.clone(), catalog),
            fanout: InboxFanoutEngine::new(store),
        }
    }

    fn agent(id: &str, handle: &str) -> AgentIdentity {
        AgentIdentity::new(id).with_handle(handle)
    }

    fn subject() -> SubjectRef {
        SubjectRef::new(SubjectKind::Artifact, "art_1")
    }

    async fn post(fixture: &Fixture, author: AgentIdentity, body: &str, parent: Option<&str>) -> Comment {
        fixture
            .comments
            .create_comment(
                &subject(),
                author,
                NewComment {
                    parent_id: parent.map(str::to_string),
                    kind: CommentKind::Comment,
                    raw_body: body.to_string(),
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn mention_fans_out_to_mentioned_handle_but_never_author() {
        let fixture = fixture();
        let comment = post(&fixture, agent("agt_alice", "alice"), "hello @bob and @alice", None).await;
        let events = fixture.fanout.fanout_comment(&comment).await;

        let mentioned: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == InboxEventType::CommentMentioned)
            .collect();
        assert_eq!(mentioned.len(), 1, "exactly one mention event");
        assert_eq!(mentioned[0].recipient_handle, "bob");
        assert_eq!(
            mentioned[0].mention.as_ref().unwrap().in_comment_id,
            comment.id
        );

        let inbox = fixture.fanout.list_inbox("bob", None, 50).await.unwrap();
        assert_eq!(inbox.items.len(), 1);
        let alice_inbox = fixture.fanout.list_inbox("alice", None, 50).await.unwrap();
        assert!(alice_inbox.items.is_empty(), "no self-mention notification");
    }

    #[tokio::test]
    async fn reply_notifies_parent_author() {
        let fixture = fixture();
        let root = post(&fixture, agent("agt_bob", "bob"), "root", None).await;
        let reply = post(&fixture, agent("agt_alice", "alice"), "reply", Some(&root.id)).await;

        let events = fixture.fanout.fanout_comment(&reply).await;
        let replied: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == InboxEventType::CommentReplied)
            .collect();
        assert_eq!(replied.len(), 1);
        assert_eq!(replied[0].recipient_handle, "bob");
    }

    #[tokio::test]
    async fn self_reply_produces_no_reply_event() {
        let fixture = fixture();
        let root = post(&fixture, agent("agt_bob", "bob"), "root", None).await;
        let reply = post(&fixture, agent("agt_bob", "bob"), "following up", Some(&root.id)).await;

        let events = fixture.fanout.fanout_comment(&reply).await;
        assert!(
            events
                .iter()
                .all(|e| e.event_type != InboxEventType::CommentReplied),
            "no self-notification"
        );
    }

    #[tokio::test]
    async fn every_comment_emits_one_created_event_for_watchers() {
        let fixture = fixture();
        let comment = post(&fixture, agent("agt_alice", "alice"), "plain", None).await;
        let events = fixture.fanout.fanout_comment(&comment).await;

        let created: Vec<_> = events
            .iter()
            .filter(|e| e.event_type == InboxEventType::CommentCreated)
            .collect();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].recipient_handle, WATCHERS_RECIPIENT);
    }

    #[tokio::test]
    async fn rating_fanout_addresses_subject_owner() {
        let fixture = fixture();
        let rating = Rating {
            id: Uuid::now_v7().to_string(),
            subject_id: "art_1".to_string(),
            subject_kind: SubjectKind::Artifact,
            rater: agent("agt_alice", "alice"),
            score: 4.0,
            dims: Default::default(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let events = fixture.fanout.fanout_rating(&rating, "owner").await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, InboxEventType::RatingCreatedOrUpdated);
        assert_eq!(events[0].recipient_handle, "owner");
        assert!(events[0].rating.is_some());
    }

    #[tokio::test]
    async fn inbox_pagination_walks_all_events_without_gaps() {
        let fixture = fixture();
        for i in 0..7 {
            let comment = post(
                &fixture,
                agent("agt_alice", "alice"),
                &format!("ping {i} @bob"),
                None,
            )
            .await;
            fixture.fanout.fanout_comment(&comment).await;
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = fixture
                .fanout
                .list_inbox("bob", cursor.as_ref(), 3)
                .await
                .unwrap();
            seen.extend(page.items.iter().map(|e| e.id.clone()));
            match page.next_cursor {
                Some(token) => cursor = Some(decode_cursor(&token).unwrap()),
                None => break,
            }
        }

        assert_eq!(seen.len(), 7);
        let mut deduped = seen.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 7);
    }
}
