use std::collections::HashMap;
use std::sync::Arc;

use agora_core::catalog::{SubjectCatalog, SubjectKind};
use agora_core::comments::CommentThreadEngine;
use agora_core::identity::IdentityProvider;
use agora_core::inbox::InboxFanoutEngine;
use agora_core::rate_limit::RateLimiter;
use agora_core::ratings::RatingUpsertEngine;
use agora_core::store::DurableStore;

/// Owner handles per subject, loaded from the subject manifest. Rating
/// fan-out needs a recipient; subjects without a known owner simply produce
/// no rating notification.
pub type SubjectOwners = HashMap<(SubjectKind, String), String>;

#[derive(Clone)]
pub struct AppState {
    pub identity: Arc<dyn IdentityProvider>,
    pub limiter: Arc<RateLimiter>,
    pub comments: Arc<CommentThreadEngine>,
    pub ratings: Arc<RatingUpsertEngine>,
    pub inbox: Arc<InboxFanoutEngine>,
    pub owners: Arc<SubjectOwners>,
    pub store: Arc<dyn DurableStore>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn DurableStore>,
        catalog: Arc<dyn SubjectCatalog>,
        identity: Arc<dyn IdentityProvider>,
        owners: SubjectOwners,
    ) -> Self {
        Self {
            identity,
            limiter: Arc::new(RateLimiter::new()),
            comments: Arc::new(CommentThreadEngine::new(store.clone(), catalog.clone())),
            ratings: Arc::new(RatingUpsertEngine::new(store.clone(), catalog)),
            inbox: Arc::new(InboxFanoutEngine::new(store.clone())),
            owners: Arc::new(owners),
            store,
        }
    }
}
