//! Agora core: the feedback and notification engine.
//!
//! Accepts comments and ratings on artifacts/skills from resolved agent
//! identities, keeps one rating per (subject, rater), derives @-mention and
//! reply notifications into per-recipient inboxes, serves stable
//! cursor-paginated reads, and rate-limits everything with a fixed-window
//! counter. Storage goes through the backend-agnostic [`store::DurableStore`]
//! contract; identity resolution and subject existence are external seams
//! ([`identity::IdentityProvider`], [`catalog::SubjectCatalog`]).

pub mod catalog;
pub mod comments;
pub mod config;
pub mod error;
pub mod identity;
pub mod inbox;
pub mod mentions;
pub mod pagination;
pub mod rate_limit;
pub mod ratings;
pub mod store;
