use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::catalog::{SubjectCatalog, SubjectKind, SubjectRef};
use crate::error::{CoreError, Violation};
use crate::identity::AgentIdentity;
use crate::store::{Collection, DurableStore};

/// Upper bound on rating notes, in bytes.
pub const MAX_NOTES_BYTES: usize = 4 * 1024;

/// One rating per `(subject_id, rater.agent_id)` — enforced by the store's
/// upsert key, so a re-submission overwrites in place instead of adding a
/// row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rating {
    /// UUIDv7 assigned on first submission and kept across updates
    pub id: String,
    pub subject_id: String,
    pub subject_kind: SubjectKind,
    /// Rater snapshot at first write — not refreshed on update
    pub rater: AgentIdentity,
    pub score: f64,
    /// Per-dimension scores (artifact ratings only)
    #[serde(default)]
    pub dims: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Immutable once set; preserved across updates
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for submitting a rating.
#[derive(Debug, Deserialize, ToSchema)]
pub struct NewRating {
    pub score: f64,
    #[serde(default)]
    pub dims: BTreeMap<String, f64>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Result of an upsert: `created` distinguishes first submission (201) from
/// overwrite (200) at the boundary.
#[derive(Debug)]
pub struct RatingOutcome {
    pub rating: Rating,
    pub created: bool,
}

/// Aggregate over all ratings for one subject.
#[derive(Debug, Serialize, ToSchema)]
pub struct RatingSummary {
    /// Distinct raters — equals the row count by the upsert invariant
    pub count: u64,
    /// Arithmetic mean of `score`; `null` when there are no ratings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    /// Per-dimension means over only the ratings that supplied that key —
    /// missing keys are excluded from the denominator, not counted as zero
    pub dims_avg: BTreeMap<String, f64>,
}

/// Validates and upserts one rating per (subject, rater).
pub struct RatingUpsertEngine {
    store: Arc<dyn DurableStore>,
    catalog: Arc<dyn SubjectCatalog>,
}

impl RatingUpsertEngine {
    pub fn new(store: Arc<dyn DurableStore>, catalog: Arc<dyn SubjectCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Submit a rating. First submission creates; later submissions from the
    /// same rater for the same subject overwrite score, dims, notes and
    /// `updated_at` while preserving the original `created_at`.
    pub async fn upsert_rating(
        &self,
        subject: &SubjectRef,
        rater: AgentIdentity,
        req: NewRating,
    ) -> Result<RatingOutcome, CoreError> {
        if !self.catalog.exists(subject).await? {
            return Err(CoreError::not_found(format!(
                "{} {}",
                subject.kind.as_str(),
                subject.id
            )));
        }

        let violations = validate_scores(subject.kind, &req);
        if !violations.is_empty() {
            return Err(CoreError::Validation(violations));
        }

        let now = Utc::now();
        let rating = Rating {
            id: Uuid::now_v7().to_string(),
            subject_id: subject.id.clone(),
            subject_kind: subject.kind,
            rater: rater.clone(),
            score: req.score,
            dims: req.dims.clone(),
            notes: req.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        let unique_key = rating_key(subject, &rater.agent_id);
        let score = req.score;
        let dims = req.dims;
        let notes = req.notes;
        let mutate = Box::new(move |doc: &mut serde_json::Value| {
            doc["score"] = json!(score);
            doc["dims"] = json!(dims);
            match &notes {
                Some(notes) => doc["notes"] = json!(notes),
                None => {
                    if let Some(obj) = doc.as_object_mut() {
                        obj.remove("notes");
                    }
                }
            }
            doc["updated_at"] = json!(Utc::now());
        });

        let outcome = self
            .store
            .upsert(
                Collection::Ratings,
                &unique_key,
                serde_json::to_value(&rating)?,
                mutate,
            )
            .await?;

        Ok(RatingOutcome {
            rating: serde_json::from_value(outcome.record)?,
            created: outcome.created,
        })
    }

    /// Aggregate all ratings for a subject.
    pub async fn summarize(&self, subject_id: &str) -> Result<RatingSummary, CoreError> {
        let docs = self
            .store
            .list_by_subject(Collection::Ratings, subject_id)
            .await?;
        let ratings: Vec<Rating> = docs
            .into_iter()
            .map(|doc| serde_json::from_value(doc).map_err(CoreError::from))
            .collect::<Result<_, _>>()?;

        let count = ratings.len() as u64;
        let avg = if ratings.is_empty() {
            None
        } else {
            Some(ratings.iter().map(|r| r.score).sum::<f64>() / ratings.len() as f64)
        };

        let mut sums: BTreeMap<String, (f64, u64)> = BTreeMap::new();
        for rating in &ratings {
            for (key, value) in &rating.dims {
                let entry = sums.entry(key.clone()).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }
        let dims_avg = sums
            .into_iter()
            .map(|(key, (sum, n))| (key, sum / n as f64))
            .collect();

        Ok(RatingSummary {
            count,
            avg,
            dims_avg,
        })
    }
}

fn rating_key(subject: &SubjectRef, agent_id: &str) -> String {
    format!("{}:{}#{agent_id}", subject.kind.as_str(), subject.id)
}

/// Skills and artifacts deliberately keep distinct score shapes: skills take
/// a bare integer 1–5, artifacts take 0–5 with optional per-dimension
/// scores. Unifying them would silently change accepted input ranges.
fn validate_scores(kind: SubjectKind, req: &NewRating) -> Vec<Violation> {
    let mut violations = Vec::new();

    match kind {
        SubjectKind::Skill => {
            if req.score.fract() != 0.0 || !(1.0..=5.0).contains(&req.score) {
                violations.push(
                    Violation::new("score", "skill score must be an integer between 1 and 5")
                        .with_received(json!(req.score)),
                );
            }
            if !req.dims.is_empty() {
                violations.push(
                    Violation::new("dims", "skill ratings do not take per-dimension scores")
                        .with_docs_hint("Submit a bare integer score for skills"),
                );
            }
        }
        SubjectKind::Artifact => {
            if !(0.0..=5.0).contains(&req.score) || !req.score.is_finite() {
                violations.push(
                    Violation::new("score", "artifact score must be between 0 and 5")
                        .with_received(json!(req.score)),
                );
            }
            for (key, value) in &req.dims {
                if !(0.0..=5.0).contains(value) || !value.is_finite() {
                    violations.push(
                        Violation::new(
                            format!("dims.{key}"),
                            "dimension scores must be between 0 and 5",
                        )
                        .with_received(json!(value)),
                    );
                }
            }
        }
    }

    if let Some(notes) = &req.notes
        && notes.len() > MAX_NOTES_BYTES
    {
        violations.push(Violation::new(
            "notes",
            format!("notes is {} bytes, maximum is {MAX_NOTES_BYTES}", notes.len()),
        ));
    }

    violations
}
